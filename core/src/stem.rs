//! Stemmed TF-IDF retrieval over a token file, with an exact-match bonus.
//!
//! Two inverted maps are built side by side: one keyed by the normalized
//! term, one by its stem. Candidates and scores come from the stemmed map;
//! documents that also contain a query term in its exact surface form get a
//! flat bonus on top. Stemming picks the Snowball stemmer by script: ASCII
//! words are stemmed as English, words with Cyrillic letters as Russian.

use std::collections::{HashMap, HashSet};
use std::io::BufRead;

use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::UnicodeNormalization;

use crate::builder::parse_token_line;
use crate::index::DocId;
use crate::Result;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STEM_EN: Stemmer = Stemmer::create(Algorithm::English);
    static ref STEM_RU: Stemmer = Stemmer::create(Algorithm::Russian);
}

const MIN_TERM_BYTES: usize = 2;
const MAX_TERM_BYTES: usize = 64;

/// Normalize a raw token: NFKC, lowercase, first word run kept. Terms
/// outside the 2..=64 byte band (after normalization) are dropped.
pub fn normalize_term(raw: &str) -> Option<String> {
    let folded: String = raw.nfkc().collect::<String>().to_lowercase();
    let word = WORD.find(&folded)?.as_str();
    if word.len() < MIN_TERM_BYTES || word.len() > MAX_TERM_BYTES {
        return None;
    }
    Some(word.to_string())
}

fn has_cyrillic(word: &str) -> bool {
    word.chars()
        .any(|c| ('\u{0400}'..='\u{052F}').contains(&c))
}

/// Stem one normalized term, choosing the stemmer by script.
pub fn stem_term(term: &str) -> String {
    if term.is_ascii() {
        STEM_EN.stem(term).into_owned()
    } else if has_cyrillic(term) {
        STEM_RU.stem(term).into_owned()
    } else {
        term.to_string()
    }
}

fn tf_weight(tf: u32) -> f64 {
    1.0 + f64::from(tf).ln()
}

fn idf_weight(n: usize, df: usize) -> f64 {
    ((n as f64 + 1.0) / (df as f64 + 1.0)).ln() + 1.0
}

/// Search knobs: result count, exact-match bonus, query-side stemming.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub topk: usize,
    pub exact_bonus: f64,
    pub stem: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            topk: 10,
            exact_bonus: 0.5,
            stem: true,
        }
    }
}

/// One scored result.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub doc: DocId,
    pub score: f64,
}

type TfMap = HashMap<DocId, u32>;

/// Exact and stemmed inverted maps over one token file.
#[derive(Default)]
pub struct StemIndex {
    exact: HashMap<String, TfMap>,
    stemmed: HashMap<String, TfMap>,
    docs: HashSet<DocId>,
    lines: u64,
    kept: u64,
}

impl StemIndex {
    /// Build from `docId\tterm` lines. Malformed lines and terms that
    /// normalize to nothing are skipped.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut index = StemIndex::default();
        for line in reader.lines() {
            let line = line?;
            index.lines += 1;
            let Some((doc, token)) = parse_token_line(&line) else {
                continue;
            };
            let Some(exact) = normalize_term(token) else {
                continue;
            };
            let stem = stem_term(&exact);
            index.docs.insert(doc);
            *index.exact.entry(exact).or_default().entry(doc).or_insert(0) += 1;
            *index
                .stemmed
                .entry(stem)
                .or_default()
                .entry(doc)
                .or_insert(0) += 1;
            index.kept += 1;
        }
        Ok(index)
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn kept(&self) -> u64 {
        self.kept
    }

    pub fn exact_terms(&self) -> usize {
        self.exact.len()
    }

    pub fn stem_terms(&self) -> usize {
        self.stemmed.len()
    }

    /// Score the query against the index. With `opts.stem` off only the
    /// query side skips stemming; the index is built once, stemmed.
    pub fn search(&self, query: &str, opts: &SearchOptions) -> Vec<Hit> {
        let n = self.docs.len();
        if n == 0 {
            return Vec::new();
        }

        let mut q_exact = Vec::new();
        let mut q_stem = Vec::new();
        for raw in query.split_whitespace() {
            let Some(exact) = normalize_term(raw) else {
                continue;
            };
            q_stem.push(if opts.stem {
                stem_term(&exact)
            } else {
                exact.clone()
            });
            q_exact.push(exact);
        }

        let mut score: HashMap<DocId, f64> = HashMap::new();
        for stem in &q_stem {
            let Some(postings) = self.stemmed.get(stem) else {
                continue;
            };
            let idf = idf_weight(n, postings.len());
            for (&doc, &tf) in postings {
                *score.entry(doc).or_insert(0.0) += tf_weight(tf) * idf;
            }
        }

        // The bonus only boosts documents already matched by a stem.
        if opts.exact_bonus != 0.0 {
            for exact in &q_exact {
                let Some(postings) = self.exact.get(exact) else {
                    continue;
                };
                for doc in postings.keys() {
                    if let Some(s) = score.get_mut(doc) {
                        *s += opts.exact_bonus;
                    }
                }
            }
        }

        let mut hits: Vec<Hit> = score
            .into_iter()
            .map(|(doc, score)| Hit { doc, score })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.doc.cmp(&b.doc))
        });
        hits.truncate(opts.topk);
        hits
    }
}
