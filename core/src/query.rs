//! Boolean query compilation and evaluation.
//!
//! Queries are a single line of terms and operators: `&&`/`&` (AND),
//! `||`/`|` (OR), `!` (NOT), parentheses for grouping. An AND is inserted
//! implicitly between adjacent operands, so `foo bar` means `foo && bar`.
//! Compilation is the shunting-yard algorithm into RPN; evaluation keeps a
//! stack of sorted docId vectors and combines them with linear ordered
//! merges, so every intermediate result stays sorted and duplicate free.

use crate::index::{DocId, Index};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryToken {
    Term(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn is_term_byte(b: u8) -> bool {
    !b.is_ascii_whitespace() && !matches!(b, b'&' | b'|' | b'!' | b'(' | b')')
}

/// Split a raw query line into tokens. Terms are ASCII-lowercased;
/// single `&` and `|` are accepted as synonyms of `&&` and `||`.
pub fn lex_query(line: &str) -> Vec<QueryToken> {
    let bytes = line.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        match c {
            b'(' => {
                tokens.push(QueryToken::LParen);
                i += 1;
            }
            b')' => {
                tokens.push(QueryToken::RParen);
                i += 1;
            }
            b'!' => {
                tokens.push(QueryToken::Not);
                i += 1;
            }
            b'&' => {
                i += if bytes.get(i + 1) == Some(&b'&') { 2 } else { 1 };
                tokens.push(QueryToken::And);
            }
            b'|' => {
                i += if bytes.get(i + 1) == Some(&b'|') { 2 } else { 1 };
                tokens.push(QueryToken::Or);
            }
            _ => {
                let start = i;
                while i < bytes.len() && is_term_byte(bytes[i]) {
                    i += 1;
                }
                tokens.push(QueryToken::Term(line[start..i].to_ascii_lowercase()));
            }
        }
    }
    tokens
}

/// Insert an AND between every adjacent (operand-like, operand-starting)
/// pair: prev in {TERM, `)`}, cur in {TERM, `(`, `!`}.
pub fn insert_implicit_and(input: Vec<QueryToken>) -> Vec<QueryToken> {
    let mut out: Vec<QueryToken> = Vec::with_capacity(input.len() * 2);
    for token in input {
        if let Some(prev) = out.last() {
            let operand_like = matches!(prev, QueryToken::Term(_) | QueryToken::RParen);
            let starts_operand = matches!(
                token,
                QueryToken::Term(_) | QueryToken::LParen | QueryToken::Not
            );
            if operand_like && starts_operand {
                out.push(QueryToken::And);
            }
        }
        out.push(token);
    }
    out
}

fn precedence(token: &QueryToken) -> u8 {
    match token {
        QueryToken::Not => 3,
        QueryToken::And => 2,
        QueryToken::Or => 1,
        _ => 0,
    }
}

fn is_right_assoc(token: &QueryToken) -> bool {
    matches!(token, QueryToken::Not)
}

/// Shunting-yard compilation to RPN. NOT binds tightest and is
/// right-associative; AND and OR are left-associative.
pub fn to_rpn(tokens: Vec<QueryToken>) -> Result<Vec<QueryToken>> {
    let mut rpn = Vec::with_capacity(tokens.len());
    let mut ops: Vec<QueryToken> = Vec::new();
    let mut depth = 0i64;

    for token in tokens {
        match token {
            QueryToken::Term(_) => rpn.push(token),
            QueryToken::LParen => {
                ops.push(token);
                depth += 1;
            }
            QueryToken::RParen => {
                depth -= 1;
                if depth < 0 {
                    return Err(Error::Query("Unmatched ')'".into()));
                }
                loop {
                    match ops.pop() {
                        Some(QueryToken::LParen) => break,
                        Some(op) => rpn.push(op),
                        None => return Err(Error::Query("Unmatched ')'".into())),
                    }
                }
            }
            QueryToken::Not | QueryToken::And | QueryToken::Or => {
                let p = precedence(&token);
                loop {
                    match ops.last() {
                        Some(QueryToken::LParen) | None => break,
                        Some(top) => {
                            let p2 = precedence(top);
                            if p2 > p || (p2 == p && !is_right_assoc(&token)) {
                                if let Some(op) = ops.pop() {
                                    rpn.push(op);
                                }
                            } else {
                                break;
                            }
                        }
                    }
                }
                ops.push(token);
            }
        }
    }

    if depth != 0 {
        return Err(Error::Query("Unmatched '('".into()));
    }
    while let Some(op) = ops.pop() {
        if op == QueryToken::LParen {
            return Err(Error::Query("Unmatched '('".into()));
        }
        rpn.push(op);
    }
    Ok(rpn)
}

/// `a ∩ b` for sorted duplicate-free inputs.
pub fn intersect(a: &[DocId], b: &[DocId]) -> Vec<DocId> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0usize, 0usize);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
        }
    }
    out
}

/// `a ∪ b` for sorted duplicate-free inputs.
pub fn union(a: &[DocId], b: &[DocId]) -> Vec<DocId> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0usize, 0usize);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// `universe \ a` for sorted duplicate-free inputs.
pub fn difference(universe: &[DocId], a: &[DocId]) -> Vec<DocId> {
    let mut out = Vec::with_capacity(universe.len().saturating_sub(a.len()));
    let (mut i, mut j) = (0usize, 0usize);
    while i < universe.len() && j < a.len() {
        match universe[i].cmp(&a[j]) {
            std::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                out.push(universe[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => j += 1,
        }
    }
    out.extend_from_slice(&universe[i..]);
    out
}

/// Evaluate an RPN token sequence against the index.
pub fn eval_rpn(index: &Index, universe: &[DocId], rpn: &[QueryToken]) -> Result<Vec<DocId>> {
    let mut stack: Vec<Vec<DocId>> = Vec::new();

    for token in rpn {
        match token {
            QueryToken::Term(term) => stack.push(index.postings_for_term(term).to_vec()),
            QueryToken::Not => {
                let a = stack
                    .pop()
                    .ok_or_else(|| Error::Query("NOT without operand".into()))?;
                stack.push(difference(universe, &a));
            }
            QueryToken::And | QueryToken::Or => {
                let (Some(b), Some(a)) = (stack.pop(), stack.pop()) else {
                    return Err(Error::Query("Binary operator without 2 operands".into()));
                };
                stack.push(if matches!(token, QueryToken::And) {
                    intersect(&a, &b)
                } else {
                    union(&a, &b)
                });
            }
            QueryToken::LParen | QueryToken::RParen => {
                return Err(Error::Query("Unexpected token in RPN".into()));
            }
        }
    }

    if stack.len() != 1 {
        return Err(Error::Query("Bad expression".into()));
    }
    Ok(stack.pop().unwrap_or_default())
}

/// Run one query line end to end: lex, insert implicit ANDs, compile,
/// evaluate. A line without any term yields an empty result, not an error.
pub fn run_query(index: &Index, universe: &[DocId], line: &str) -> Result<Vec<DocId>> {
    let tokens = insert_implicit_and(lex_query(line));
    if !tokens.iter().any(|t| matches!(t, QueryToken::Term(_))) {
        return Ok(Vec::new());
    }
    let rpn = to_rpn(tokens)?;
    eval_rpn(index, universe, &rpn)
}

#[cfg(test)]
mod tests {
    use super::QueryToken::*;
    use super::*;

    fn term(s: &str) -> QueryToken {
        Term(s.to_string())
    }

    #[test]
    fn lexes_operators_and_synonyms() {
        assert_eq!(
            lex_query("foo && !bar"),
            vec![term("foo"), And, Not, term("bar")]
        );
        assert_eq!(lex_query("a & b | c"), vec![term("a"), And, term("b"), Or, term("c")]);
        assert_eq!(lex_query("(X)"), vec![LParen, term("x"), RParen]);
    }

    #[test]
    fn implicit_and_between_operands() {
        let tokens = insert_implicit_and(lex_query("(a || b) c"));
        assert_eq!(
            tokens,
            vec![LParen, term("a"), Or, term("b"), RParen, And, term("c")]
        );
        let tokens = insert_implicit_and(lex_query("a !b"));
        assert_eq!(tokens, vec![term("a"), And, Not, term("b")]);
    }

    #[test]
    fn rpn_respects_precedence() {
        let rpn = to_rpn(insert_implicit_and(lex_query("foo && !bar"))).unwrap();
        assert_eq!(rpn, vec![term("foo"), term("bar"), Not, And]);

        let rpn = to_rpn(insert_implicit_and(lex_query("(a || b) c"))).unwrap();
        assert_eq!(rpn, vec![term("a"), term("b"), Or, term("c"), And]);

        let rpn = to_rpn(insert_implicit_and(lex_query("a || b && c"))).unwrap();
        assert_eq!(rpn, vec![term("a"), term("b"), term("c"), And, Or]);
    }

    #[test]
    fn unmatched_parens_are_errors() {
        assert!(to_rpn(lex_query("(a")).is_err());
        assert!(to_rpn(lex_query("a)")).is_err());
    }

    #[test]
    fn merge_ops() {
        assert_eq!(intersect(&[0, 1, 2], &[1, 2, 3]), vec![1, 2]);
        assert_eq!(union(&[0, 2], &[1, 2, 4]), vec![0, 1, 2, 4]);
        assert_eq!(difference(&[0, 1, 2, 3], &[1, 3]), vec![0, 2]);
        assert_eq!(difference(&[0, 1], &[]), vec![0, 1]);
    }
}
