//! Relaxed JSON scanning and Unicode-aware tokenization.
//!
//! The scanner does not build a JSON tree. It walks the raw bytes looking
//! for string keys; when a key equal to the configured field name is
//! followed by a string value, that value is decoded and tokenized. A
//! failed string attempt makes the scanner restart one byte after the
//! opening quote, which keeps tokenization going over truncated or
//! otherwise damaged corpora.
//!
//! Tokens are runs of base characters (ASCII digits and letters, Cyrillic
//! letters) optionally extended by combining marks and by single interior
//! hyphens. Everything else separates tokens.

use std::io::Write;
use std::time::Instant;

use serde::Serialize;

use crate::Result;

const REPLACEMENT: u32 = 0xFFFD;

/// Counters maintained over one tokenization run.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct TokenStats {
    /// Number of successful field matches (one per emitted docId).
    pub docs_with_field: u64,
    /// Emitted tokens.
    pub tokens: u64,
    /// Sum of base-character counts across emitted tokens. Combining marks
    /// are preserved in the payload but not counted here.
    pub token_chars: u64,
    /// Sum of matched field values' lengths in UTF-8 bytes.
    pub text_bytes: u64,
}

/// Configured tokenizer for one corpus field.
pub struct Tokenizer {
    field: Vec<u8>,
    with_docid: bool,
    log_every: u64,
}

impl Tokenizer {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.as_bytes().to_vec(),
            with_docid: false,
            log_every: 0,
        }
    }

    /// Prefix every emitted token with `<docId>\t`.
    pub fn with_docid(mut self, yes: bool) -> Self {
        self.with_docid = yes;
        self
    }

    /// Emit a progress log record every `n` matched documents (0 disables).
    pub fn log_every(mut self, n: u64) -> Self {
        self.log_every = n;
        self
    }

    /// Scan `json` and write one line per token to `out` (when given).
    ///
    /// Document ids count successful field matches, starting at 0.
    pub fn run(&self, json: &[u8], out: Option<&mut dyn Write>) -> Result<TokenStats> {
        let started = Instant::now();
        let mut out = out;
        let mut stats = TokenStats::default();
        let mut docid: u64 = 0;

        let mut i = 0usize;
        while i < json.len() {
            if json[i] != b'"' {
                i += 1;
                continue;
            }

            let save = i;
            let key = match read_json_string(json, &mut i) {
                Some(key) => key,
                None => {
                    i = save + 1;
                    continue;
                }
            };

            while i < json.len() && is_json_ws(json[i]) {
                i += 1;
            }
            if i >= json.len() || json[i] != b':' {
                continue;
            }
            i += 1;
            while i < json.len() && is_json_ws(json[i]) {
                i += 1;
            }

            if key == self.field && i < json.len() && json[i] == b'"' {
                let vpos = i;
                let value = match read_json_string(json, &mut i) {
                    Some(value) => value,
                    None => {
                        i = vpos + 1;
                        continue;
                    }
                };

                stats.docs_with_field += 1;
                tokenize_value(&value, docid, self.with_docid, &mut out, &mut stats)?;
                docid += 1;

                if self.log_every > 0 && stats.docs_with_field % self.log_every == 0 {
                    let time_ms = started.elapsed().as_secs_f64() * 1e3;
                    let kb = stats.text_bytes as f64 / 1024.0;
                    let kbps = if time_ms > 0.0 { kb / (time_ms / 1e3) } else { 0.0 };
                    let avg_len = if stats.tokens > 0 {
                        stats.token_chars as f64 / stats.tokens as f64
                    } else {
                        0.0
                    };
                    tracing::info!(
                        docs = stats.docs_with_field,
                        kb,
                        time_ms,
                        kbps,
                        tokens = stats.tokens,
                        avg_len,
                        "tokenize progress"
                    );
                }
            }
        }

        Ok(stats)
    }
}

fn is_json_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\n' | b'\r' | b'\t')
}

fn hexval(b: u8) -> Option<u32> {
    match b {
        b'0'..=b'9' => Some(u32::from(b - b'0')),
        b'a'..=b'f' => Some(u32::from(b - b'a') + 10),
        b'A'..=b'F' => Some(u32::from(b - b'A') + 10),
        _ => None,
    }
}

fn hex4(s: &[u8], at: usize) -> Option<u32> {
    let v1 = hexval(s[at])?;
    let v2 = hexval(s[at + 1])?;
    let v3 = hexval(s[at + 2])?;
    let v4 = hexval(s[at + 3])?;
    Some((v1 << 12) | (v2 << 8) | (v3 << 4) | v4)
}

fn append_utf8(out: &mut Vec<u8>, cp: u32) {
    if cp <= 0x7F {
        out.push(cp as u8);
    } else if cp <= 0x7FF {
        out.push(0xC0 | (cp >> 6) as u8);
        out.push(0x80 | (cp & 0x3F) as u8);
    } else if cp <= 0xFFFF {
        out.push(0xE0 | (cp >> 12) as u8);
        out.push(0x80 | ((cp >> 6) & 0x3F) as u8);
        out.push(0x80 | (cp & 0x3F) as u8);
    } else {
        out.push(0xF0 | (cp >> 18) as u8);
        out.push(0x80 | ((cp >> 12) & 0x3F) as u8);
        out.push(0x80 | ((cp >> 6) & 0x3F) as u8);
        out.push(0x80 | (cp & 0x3F) as u8);
    }
}

/// Read one JSON string starting at the `"` at `*i`, decoding escapes into
/// raw bytes. On success `*i` points past the closing quote. Unknown escapes
/// and end of input fail the attempt; the caller rewinds and rescans.
///
/// `\uXXXX` surrogate pairs are combined; ill-formed surrogate sequences
/// decode to U+FFFD. The result is not guaranteed to be valid UTF-8, since
/// unescaped bytes pass through untouched.
fn read_json_string(s: &[u8], i: &mut usize) -> Option<Vec<u8>> {
    if *i >= s.len() || s[*i] != b'"' {
        return None;
    }
    *i += 1;

    let mut out = Vec::new();
    while *i < s.len() {
        let c = s[*i];
        *i += 1;
        if c == b'"' {
            return Some(out);
        }
        if c != b'\\' {
            out.push(c);
            continue;
        }

        if *i >= s.len() {
            return None;
        }
        let e = s[*i];
        *i += 1;
        match e {
            b'"' => out.push(b'"'),
            b'\\' => out.push(b'\\'),
            b'/' => out.push(b'/'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'u' => {
                if *i + 3 >= s.len() {
                    return None;
                }
                let u = hex4(s, *i)?;
                *i += 4;

                if (0xD800..=0xDBFF).contains(&u) {
                    // High surrogate: needs a `\uYYYY` low surrogate next.
                    if *i + 5 < s.len() && s[*i] == b'\\' && s[*i + 1] == b'u' {
                        *i += 2;
                        match hex4(s, *i) {
                            None => {
                                append_utf8(&mut out, REPLACEMENT);
                                *i += 4;
                            }
                            Some(l) => {
                                *i += 4;
                                if (0xDC00..=0xDFFF).contains(&l) {
                                    let cp = 0x10000 + (((u - 0xD800) << 10) | (l - 0xDC00));
                                    append_utf8(&mut out, cp);
                                } else {
                                    append_utf8(&mut out, REPLACEMENT);
                                }
                            }
                        }
                    } else {
                        append_utf8(&mut out, REPLACEMENT);
                    }
                } else if (0xDC00..=0xDFFF).contains(&u) {
                    append_utf8(&mut out, REPLACEMENT);
                } else {
                    append_utf8(&mut out, u);
                }
            }
            _ => return None,
        }
    }
    None
}

fn is_cont(b: u8) -> bool {
    b & 0xC0 == 0x80
}

/// Strict UTF-8 decode of the code point at `*pos`, advancing past it.
/// Overlong forms, surrogates, bad continuation bytes and truncated tails
/// all yield U+FFFD; the offending bytes are consumed.
fn decode_utf8(s: &[u8], pos: &mut usize) -> u32 {
    if *pos >= s.len() {
        return 0;
    }
    let b0 = s[*pos];
    *pos += 1;

    if b0 < 0x80 {
        return u32::from(b0);
    }

    if b0 & 0xE0 == 0xC0 {
        if *pos >= s.len() {
            return REPLACEMENT;
        }
        let b1 = s[*pos];
        *pos += 1;
        if !is_cont(b1) {
            return REPLACEMENT;
        }
        let cp = (u32::from(b0 & 0x1F) << 6) | u32::from(b1 & 0x3F);
        if cp < 0x80 {
            return REPLACEMENT;
        }
        return cp;
    }

    if b0 & 0xF0 == 0xE0 {
        if *pos + 1 >= s.len() {
            *pos = s.len();
            return REPLACEMENT;
        }
        let b1 = s[*pos];
        let b2 = s[*pos + 1];
        *pos += 2;
        if !is_cont(b1) || !is_cont(b2) {
            return REPLACEMENT;
        }
        let cp = (u32::from(b0 & 0x0F) << 12) | (u32::from(b1 & 0x3F) << 6) | u32::from(b2 & 0x3F);
        if cp < 0x800 || (0xD800..=0xDFFF).contains(&cp) {
            return REPLACEMENT;
        }
        return cp;
    }

    if b0 & 0xF8 == 0xF0 {
        if *pos + 2 >= s.len() {
            *pos = s.len();
            return REPLACEMENT;
        }
        let b1 = s[*pos];
        let b2 = s[*pos + 1];
        let b3 = s[*pos + 2];
        *pos += 3;
        if !is_cont(b1) || !is_cont(b2) || !is_cont(b3) {
            return REPLACEMENT;
        }
        let cp = (u32::from(b0 & 0x07) << 18)
            | (u32::from(b1 & 0x3F) << 12)
            | (u32::from(b2 & 0x3F) << 6)
            | u32::from(b3 & 0x3F);
        if !(0x10000..=0x10FFFF).contains(&cp) {
            return REPLACEMENT;
        }
        return cp;
    }

    REPLACEMENT
}

fn is_digit(cp: u32) -> bool {
    (u32::from(b'0')..=u32::from(b'9')).contains(&cp)
}

fn is_latin(cp: u32) -> bool {
    (u32::from(b'A')..=u32::from(b'Z')).contains(&cp)
        || (u32::from(b'a')..=u32::from(b'z')).contains(&cp)
}

fn is_cyrillic(cp: u32) -> bool {
    (0x0400..=0x04FF).contains(&cp) || (0x0500..=0x052F).contains(&cp)
}

/// A code point that may begin or extend a token.
fn is_token_base(cp: u32) -> bool {
    is_digit(cp) || is_latin(cp) || is_cyrillic(cp)
}

/// Non-spacing marks that extend but never start a token.
fn is_combining_mark(cp: u32) -> bool {
    (0x0300..=0x036F).contains(&cp)
        || (0x1AB0..=0x1AFF).contains(&cp)
        || (0x1DC0..=0x1DFF).contains(&cp)
        || (0x20D0..=0x20FF).contains(&cp)
        || (0xFE20..=0xFE2F).contains(&cp)
}

fn flush_token(
    token: &[u8],
    base_len: u64,
    docid: u64,
    with_docid: bool,
    out: &mut Option<&mut dyn Write>,
    stats: &mut TokenStats,
) -> Result<()> {
    stats.tokens += 1;
    stats.token_chars += base_len;
    if let Some(w) = out.as_mut() {
        if with_docid {
            write!(w, "{docid}\t")?;
        }
        w.write_all(token)?;
        w.write_all(b"\n")?;
    }
    Ok(())
}

/// Run the token state machine over one decoded field value.
///
/// A hyphen joins two base characters at most once in a row; it is only
/// appended when the lookahead code point is a base character, so no token
/// ever ends with `-` or contains `--`.
fn tokenize_value(
    text: &[u8],
    docid: u64,
    with_docid: bool,
    out: &mut Option<&mut dyn Write>,
    stats: &mut TokenStats,
) -> Result<()> {
    stats.text_bytes += text.len() as u64;

    let mut in_tok = false;
    let mut last_was_hyphen = false;
    let mut base_len: u64 = 0;
    let mut token: Vec<u8> = Vec::with_capacity(32);

    let mut pos = 0usize;
    while pos < text.len() {
        let start = pos;
        let cp = decode_utf8(text, &mut pos);

        if is_token_base(cp) {
            if !in_tok {
                in_tok = true;
                last_was_hyphen = false;
                base_len = 0;
                token.clear();
            }
            token.extend_from_slice(&text[start..pos]);
            base_len += 1;
            last_was_hyphen = false;
            continue;
        }

        if in_tok && is_combining_mark(cp) {
            token.extend_from_slice(&text[start..pos]);
            continue;
        }

        if cp == u32::from(b'-') && in_tok && !last_was_hyphen {
            let mut ahead = pos;
            if ahead < text.len() && is_token_base(decode_utf8(text, &mut ahead)) {
                token.push(b'-');
                last_was_hyphen = true;
                continue;
            }
        }

        if in_tok {
            flush_token(&token, base_len, docid, with_docid, out, stats)?;
            in_tok = false;
            last_was_hyphen = false;
            base_len = 0;
            token.clear();
        }
    }

    if in_tok {
        flush_token(&token, base_len, docid, with_docid, out, stats)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<u32> {
        let mut pos = 0;
        let mut cps = Vec::new();
        while pos < bytes.len() {
            cps.push(decode_utf8(bytes, &mut pos));
        }
        cps
    }

    #[test]
    fn utf8_rejects_overlong_and_surrogates() {
        // Overlong encoding of '/' (0x2F).
        assert_eq!(decode_all(&[0xC0, 0xAF]), vec![REPLACEMENT]);
        // Overlong 3-byte NUL.
        assert_eq!(decode_all(&[0xE0, 0x80, 0x80]), vec![REPLACEMENT]);
        // UTF-8-encoded surrogate U+D800.
        assert_eq!(decode_all(&[0xED, 0xA0, 0x80]), vec![REPLACEMENT]);
        // Truncated 2-byte sequence at end of input.
        assert_eq!(decode_all(&[0xD0]), vec![REPLACEMENT]);
        // Valid Cyrillic letter.
        assert_eq!(decode_all("б".as_bytes()), vec![0x0431]);
    }

    #[test]
    fn json_string_escapes() {
        let mut i = 0;
        let out = read_json_string(br#""a\tb\u0414\n""#, &mut i).unwrap();
        assert_eq!(out, "a\tb\u{0414}\n".as_bytes());
    }

    #[test]
    fn json_string_surrogate_pair() {
        let mut i = 0;
        let out = read_json_string(br#""\uD834\uDD1E""#, &mut i).unwrap();
        assert_eq!(out, "\u{1D11E}".as_bytes());
    }

    #[test]
    fn json_string_lone_surrogate_is_replaced() {
        let mut i = 0;
        let out = read_json_string(br#""x\uD800y""#, &mut i).unwrap();
        assert_eq!(out, "x\u{FFFD}y".as_bytes());

        let mut i = 0;
        let out = read_json_string(br#""\uDC00""#, &mut i).unwrap();
        assert_eq!(out, "\u{FFFD}".as_bytes());
    }

    #[test]
    fn json_string_unknown_escape_fails() {
        let mut i = 0;
        assert!(read_json_string(br#""a\qb""#, &mut i).is_none());
    }

    #[test]
    fn json_string_unterminated_fails() {
        let mut i = 0;
        assert!(read_json_string(br#""never ends"#, &mut i).is_none());
    }
}
