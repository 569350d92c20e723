//! Index construction from a docid-prefixed token file.
//!
//! The builder collects (term, docId) pairs, sorts them by raw term bytes
//! with docId as the secondary key, and assembles the sorted dictionary and
//! packed postings blob in a single grouping pass. The forward table is
//! filled from `url_norm` values recovered positionally from the source
//! JSON, falling back to `Document <id>` placeholders.

use crate::index::{DictEntry, DocId, DocInfo, Index, IndexMeta};
use crate::{Error, Result};

/// Parse one token-file line into `(docId, term)`.
///
/// A valid line is optional ASCII whitespace, a decimal docId, at least one
/// ASCII whitespace byte, and a non-empty run of non-whitespace bytes.
/// Further whitespace-separated columns are ignored. Returns `None` for
/// malformed lines and for docIds that overflow (u64 accumulation or the
/// u32 docId range).
pub fn parse_token_line(line: &str) -> Option<(DocId, &str)> {
    let bytes = line.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }

    let mut value: u64 = 0;
    let mut any = false;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        any = true;
        let d = u64::from(bytes[i] - b'0');
        if value > (u64::MAX - d) / 10 {
            return None;
        }
        value = value * 10 + d;
        i += 1;
    }
    if !any {
        return None;
    }

    if i >= bytes.len() || !bytes[i].is_ascii_whitespace() {
        return None;
    }
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return None;
    }

    let start = i;
    while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
        i += 1;
    }

    let doc = DocId::try_from(value).ok()?;
    Some((doc, &line[start..i]))
}

fn hexval(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decode `%HH` sequences and `+` into bytes; invalid sequences stay
/// literal. Decoded bytes that do not form valid UTF-8 are replaced.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b'%' && i + 2 < bytes.len() {
            if let (Some(h1), Some(h2)) = (hexval(bytes[i + 1]), hexval(bytes[i + 2])) {
                out.push((h1 << 4) | h2);
                i += 3;
                continue;
            }
        }
        if c == b'+' {
            out.push(b' ');
            i += 1;
            continue;
        }
        out.push(c);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Derive a display title from a normalized URL: the part after the last
/// `/wiki/` (or the basename), underscores to spaces, percent-decoded.
pub fn title_from_url(url: &str) -> String {
    let tail = if let Some(p) = url.find("/wiki/") {
        &url[p + "/wiki/".len()..]
    } else {
        match url.rfind('/') {
            Some(s) if s + 1 < url.len() => &url[s + 1..],
            _ => url,
        }
    };
    percent_decode(&tail.replace('_', " "))
}

fn find_from(hay: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= hay.len() {
        return None;
    }
    hay[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Scan raw JSON bytes for string values keyed `"url_norm"`, in order of
/// appearance. The scan is relaxed (no JSON tree) with a restricted escape
/// set; unknown escapes keep their backslash literally.
pub fn extract_url_norms(json: &[u8]) -> Vec<String> {
    const NEEDLE: &[u8] = b"\"url_norm\"";

    let mut urls = Vec::new();
    let mut pos = 0usize;
    while let Some(k) = find_from(json, NEEDLE, pos) {
        let Some(colon) = find_from(json, b":", k + NEEDLE.len()) else {
            break;
        };
        let Some(q1) = find_from(json, b"\"", colon + 1) else {
            break;
        };

        let mut value = Vec::with_capacity(128);
        let mut i = q1 + 1;
        while i < json.len() {
            let ch = json[i];
            if ch == b'\\' && i + 1 < json.len() {
                let nxt = json[i + 1];
                match nxt {
                    b'"' | b'\\' | b'/' => {
                        value.push(nxt);
                        i += 2;
                    }
                    b'n' => {
                        value.push(b'\n');
                        i += 2;
                    }
                    b't' => {
                        value.push(b'\t');
                        i += 2;
                    }
                    b'r' => {
                        value.push(b'\r');
                        i += 2;
                    }
                    _ => {
                        value.push(ch);
                        i += 1;
                    }
                }
                continue;
            }
            if ch == b'"' {
                break;
            }
            value.push(ch);
            i += 1;
        }
        urls.push(String::from_utf8_lossy(&value).into_owned());
        pos = i + 1;
    }
    urls
}

/// Accumulates (term, docId) pairs from token-file lines and assembles the
/// final index.
#[derive(Default)]
pub struct IndexBuilder {
    pairs: Vec<(String, DocId)>,
    max_doc: DocId,
    total_tokens: u64,
    sum_term_len: u64,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one token-file line. Malformed lines are skipped; returns
    /// whether the line was accepted. Terms are ASCII-lowercased.
    pub fn add_line(&mut self, line: &str) -> bool {
        let Some((doc, term)) = parse_token_line(line) else {
            return false;
        };
        let term = term.to_ascii_lowercase();
        self.sum_term_len += term.len() as u64;
        self.total_tokens += 1;
        if doc > self.max_doc {
            self.max_doc = doc;
        }
        self.pairs.push((term, doc));
        true
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Sort, group and assemble the index. `urls` are assigned positionally
    /// to docIds; missing tail entries get an empty url and a placeholder
    /// title. `meta.build_ms` is left at zero for the caller to fill in.
    pub fn build(mut self, urls: Vec<String>) -> Result<Index> {
        if self.pairs.is_empty() {
            return Err(Error::Data("no tokens parsed from input".into()));
        }

        let docs_count = self.max_doc + 1;

        let mut docs = Vec::with_capacity(docs_count as usize);
        for d in 0..docs_count {
            match urls.get(d as usize) {
                Some(url) => {
                    let mut title = title_from_url(url);
                    if title.is_empty() {
                        title = format!("Document {d}");
                    }
                    docs.push(DocInfo {
                        url: url.clone(),
                        title,
                    });
                }
                None => docs.push(DocInfo {
                    url: String::new(),
                    title: format!("Document {d}"),
                }),
            }
        }

        // Raw-byte order on the term, docId ascending within a term.
        self.pairs.sort_unstable();

        let mut dict: Vec<DictEntry> = Vec::new();
        let mut postings: Vec<DocId> = Vec::with_capacity(self.pairs.len());

        let mut i = 0usize;
        while i < self.pairs.len() {
            let group = i;
            let postings_off = (postings.len() * 4) as u64;
            let mut last_doc = None;
            let mut df = 0u32;
            while i < self.pairs.len() && self.pairs[i].0 == self.pairs[group].0 {
                let d = self.pairs[i].1;
                if last_doc != Some(d) {
                    postings.push(d);
                    last_doc = Some(d);
                    df += 1;
                }
                i += 1;
            }
            dict.push(DictEntry {
                term: std::mem::take(&mut self.pairs[group].0),
                df,
                postings_off,
            });
        }

        let unique_terms = dict.len() as u32;
        let avg_term_len = if unique_terms > 0 {
            self.sum_term_len as f64 / self.total_tokens as f64
        } else {
            0.0
        };

        Ok(Index {
            meta: IndexMeta {
                docs_count,
                total_tokens: self.total_tokens,
                unique_terms,
                avg_term_len,
                build_ms: 0.0,
            },
            dict,
            postings,
            docs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_line_parsing() {
        assert_eq!(parse_token_line("0\tfoo"), Some((0, "foo")));
        assert_eq!(parse_token_line("  12   bar  extra"), Some((12, "bar")));
        assert_eq!(parse_token_line("7\tпривет"), Some((7, "привет")));
        assert_eq!(parse_token_line(""), None);
        assert_eq!(parse_token_line("foo"), None);
        assert_eq!(parse_token_line("12"), None);
        assert_eq!(parse_token_line("12\t"), None);
        // u64 overflow and u32 overflow are both skipped.
        assert_eq!(parse_token_line("99999999999999999999999999\tfoo"), None);
        assert_eq!(parse_token_line("4294967296\tfoo"), None);
        assert_eq!(parse_token_line("4294967295\tfoo"), Some((u32::MAX, "foo")));
    }

    #[test]
    fn titles_from_urls() {
        assert_eq!(
            title_from_url("https://ru.wikipedia.org/wiki/Hello_world"),
            "Hello world"
        );
        assert_eq!(
            title_from_url("https://ru.wikipedia.org/wiki/%D0%9C%D0%B8%D1%80"),
            "Мир"
        );
        assert_eq!(title_from_url("https://example.org/pages/last"), "last");
        assert_eq!(title_from_url("plain"), "plain");
        // Invalid %HH stays literal, '+' becomes a space.
        assert_eq!(title_from_url("/wiki/a%2Gb+c"), "a%2Gb c");
    }

    #[test]
    fn url_norm_extraction() {
        let json = br#"[
            {"url_norm": "https://a/wiki/One", "parsed_text": "x"},
            {"url_norm":"https://b/wiki/Two\nLine","other":1}
        ]"#;
        let urls = extract_url_norms(json);
        assert_eq!(urls, vec!["https://a/wiki/One", "https://b/wiki/Two\nLine"]);
    }

    #[test]
    fn builder_rejects_empty_input() {
        let builder = IndexBuilder::new();
        assert!(builder.build(Vec::new()).is_err());
    }
}
