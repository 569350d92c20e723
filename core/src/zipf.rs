//! Rank-frequency (Zipf) fit over a token stream.
//!
//! Token frequencies sorted in descending order give `f(r)` for ranks
//! `1..=V`. The fit `f(r) ~= C / r^s` comes from a log-log least-squares
//! regression over a mid-rank window, which avoids both the noisy head and
//! the long flat tail. The constant is the median of `f(r) * r^s` over the
//! same window.

use std::collections::HashMap;
use std::io::BufRead;

use crate::{Error, Result};

/// Token frequencies in descending order, plus the total token count.
#[derive(Debug, Clone)]
pub struct RankFreqs {
    pub freqs: Vec<u64>,
    pub total_tokens: u64,
}

/// Fitted parameters of `f(r) ~= C / r^s`.
#[derive(Debug, Clone, Copy)]
pub struct ZipfFit {
    pub exponent: f64,
    pub constant: f64,
    /// First rank of the regression window.
    pub fit_lo: usize,
    /// Last rank of the regression window (may exceed the vocabulary; the
    /// regression itself stops at rank V).
    pub fit_hi: usize,
}

/// True when the line starts with a `<digits>\t` docId column.
fn strip_docid(token: &str) -> &str {
    if let Some((head, rest)) = token.split_once('\t') {
        if !head.is_empty() && head.bytes().all(|b| b.is_ascii_digit()) {
            return rest.trim_start();
        }
    }
    token
}

/// Count token frequencies from a token file. Both tokenizer output modes
/// are accepted: bare tokens and `docId\ttoken` lines. Tokens are
/// ASCII-lowercased; blank lines are skipped.
pub fn count_tokens<R: BufRead>(reader: R) -> Result<RankFreqs> {
    let mut freq: HashMap<String, u64> = HashMap::new();
    let mut total_tokens = 0u64;

    for line in reader.lines() {
        let line = line?;
        let token = strip_docid(line.trim());
        if token.is_empty() {
            continue;
        }
        *freq.entry(token.to_ascii_lowercase()).or_insert(0) += 1;
        total_tokens += 1;
    }

    let mut freqs: Vec<u64> = freq.into_values().collect();
    freqs.sort_unstable_by(|a, b| b.cmp(a));
    Ok(RankFreqs {
        freqs,
        total_tokens,
    })
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

/// Fit the Zipf law to descending frequencies. Exponents outside the
/// plausible (0.1, 3.0) band are reset to 1.0.
pub fn fit(freqs: &[u64]) -> Result<ZipfFit> {
    if freqs.is_empty() {
        return Err(Error::Data("empty vocabulary: no tokens".into()));
    }

    let v = freqs.len();
    let fit_lo = std::cmp::max(10, v / 100);
    let fit_hi = std::cmp::max(fit_lo + 10, v / 2);

    let (mut sum_x, mut sum_y, mut sum_xx, mut sum_xy) = (0f64, 0f64, 0f64, 0f64);
    let mut n = 0u64;
    for r in fit_lo..=fit_hi.min(v) {
        let fr = freqs[r - 1];
        if fr == 0 {
            continue;
        }
        let x = (r as f64).ln();
        let y = (fr as f64).ln();
        sum_x += x;
        sum_y += y;
        sum_xx += x * x;
        sum_xy += x * y;
        n += 1;
    }

    let mut slope = 0.0;
    if n >= 2 {
        let nf = n as f64;
        let denom = nf * sum_xx - sum_x * sum_x;
        if denom.abs() > 1e-12 {
            slope = (nf * sum_xy - sum_x * sum_y) / denom;
        }
    }
    let mut exponent = -slope;
    if !(exponent > 0.1 && exponent < 3.0) {
        exponent = 1.0;
    }

    let mut candidates = Vec::with_capacity(fit_hi.min(v).saturating_sub(fit_lo) + 1);
    for r in fit_lo..=fit_hi.min(v) {
        let fr = freqs[r - 1];
        if fr == 0 {
            continue;
        }
        candidates.push(fr as f64 * (r as f64).powf(exponent));
    }
    let constant = if candidates.is_empty() {
        freqs[0] as f64
    } else {
        median(candidates)
    };

    Ok(ZipfFit {
        exponent,
        constant,
        fit_lo,
        fit_hi,
    })
}

/// Fitted frequency for one rank.
pub fn expected(fit: &ZipfFit, rank: usize) -> f64 {
    fit.constant / (rank as f64).powf(fit.exponent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn docid_column_is_stripped() {
        assert_eq!(strip_docid("0\tfoo"), "foo");
        assert_eq!(strip_docid("123\t bar"), "bar");
        assert_eq!(strip_docid("foo"), "foo");
        assert_eq!(strip_docid("x\tfoo"), "x\tfoo");
    }

    #[test]
    fn counts_lowercased_tokens() {
        let input = "0\tFoo\n1\tfoo\n\n1\tbar\n";
        let ranked = count_tokens(Cursor::new(input)).unwrap();
        assert_eq!(ranked.total_tokens, 3);
        assert_eq!(ranked.freqs, vec![2, 1]);
    }

    #[test]
    fn median_of_even_and_odd() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(vec![4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(Vec::new()), 0.0);
    }

    #[test]
    fn recovers_power_law_exponent() {
        // Exact f(r) = 100000 / r^1.0 over a 500-term vocabulary.
        let freqs: Vec<u64> = (1..=500u64).map(|r| 100_000 / r).collect();
        let fit = fit(&freqs).unwrap();
        assert!((fit.exponent - 1.0).abs() < 0.1, "s = {}", fit.exponent);
        assert!(fit.constant > 50_000.0);
    }

    #[test]
    fn tiny_vocabulary_falls_back() {
        // Fit window lies outside a 3-term vocabulary; defaults kick in.
        let fit = fit(&[30, 20, 10]).unwrap();
        assert_eq!(fit.exponent, 1.0);
        assert_eq!(fit.constant, 30.0);
    }

    #[test]
    fn empty_vocabulary_is_error() {
        assert!(fit(&[]).is_err());
    }
}
