use irix::builder::IndexBuilder;
use irix::index::Index;
use irix::query::{difference, intersect, run_query, union};
use irix::Error;

fn index_from_lines(lines: &[&str]) -> Index {
    let mut builder = IndexBuilder::new();
    for line in lines {
        builder.add_line(line);
    }
    builder.build(Vec::new()).expect("build")
}

/// foo -> {0,1,2}, bar -> {0,1}, docs_count = 3.
fn foobar_index() -> Index {
    index_from_lines(&["0\tfoo", "1\tfoo", "1\tbar", "0\tbar", "2\tfoo"])
}

/// a -> {0,2}, b -> {1,2}, c -> {2,3}, docs_count = 4.
fn abc_index() -> Index {
    index_from_lines(&["0\ta", "2\ta", "1\tb", "2\tb", "2\tc", "3\tc"])
}

fn eval(index: &Index, line: &str) -> Vec<u32> {
    run_query(index, &index.universe(), line).expect("query")
}

fn eval_err(index: &Index, line: &str) -> String {
    match run_query(index, &index.universe(), line) {
        Err(Error::Query(msg)) => msg,
        other => panic!("expected query error, got {other:?}"),
    }
}

#[test]
fn and_not_combination() {
    let index = foobar_index();
    assert_eq!(eval(&index, "foo && !bar"), vec![2]);
}

#[test]
fn implicit_and_with_parens() {
    let index = abc_index();
    assert_eq!(eval(&index, "(a || b) c"), vec![2]);
}

#[test]
fn plain_terms_and_case_folding() {
    let index = foobar_index();
    assert_eq!(eval(&index, "foo"), vec![0, 1, 2]);
    assert_eq!(eval(&index, "FOO"), vec![0, 1, 2]);
    assert_eq!(eval(&index, "foo bar"), vec![0, 1]);
    assert_eq!(eval(&index, "missing"), Vec::<u32>::new());
}

#[test]
fn single_character_synonyms() {
    let index = foobar_index();
    assert_eq!(eval(&index, "foo & bar"), eval(&index, "foo && bar"));
    assert_eq!(eval(&index, "foo | bar"), eval(&index, "foo || bar"));
}

#[test]
fn not_precedence_over_and_over_or() {
    let index = abc_index();
    // !a && b || c parses as ((!a) && b) || c.
    let not_a_and_b_or_c = eval(&index, "!a && b || c");
    assert_eq!(not_a_and_b_or_c, vec![1, 2, 3]);
    // a || b && c parses as a || (b && c).
    assert_eq!(eval(&index, "a || b && c"), vec![0, 2]);
}

#[test]
fn double_negation_is_identity_on_universe() {
    let index = abc_index();
    assert_eq!(eval(&index, "!!a"), eval(&index, "a"));
}

#[test]
fn queries_without_terms_are_empty_not_errors() {
    let index = foobar_index();
    assert_eq!(eval(&index, "   "), Vec::<u32>::new());
    assert_eq!(eval(&index, "&& ||"), Vec::<u32>::new());
    assert_eq!(eval(&index, "!()"), Vec::<u32>::new());
}

#[test]
fn parse_and_eval_errors() {
    let index = foobar_index();
    assert_eq!(eval_err(&index, "(foo"), "Unmatched '('");
    assert_eq!(eval_err(&index, "foo)"), "Unmatched ')'");
    assert_eq!(eval_err(&index, "foo &&"), "Binary operator without 2 operands");
    assert_eq!(eval_err(&index, "&& foo"), "Binary operator without 2 operands");
    // The implicit AND turns a trailing NOT into a missing binary operand.
    assert_eq!(eval_err(&index, "foo !"), "Binary operator without 2 operands");
    assert_eq!(eval_err(&index, "! && foo"), "NOT without operand");
}

#[test]
fn results_are_sorted_and_in_range() {
    let index = abc_index();
    for query in ["a || b || c", "!a", "!b || a", "(a b) || (b c) || !c"] {
        let result = eval(&index, query);
        for pair in result.windows(2) {
            assert!(pair[0] < pair[1], "unsorted result for {query}");
        }
        for &doc in &result {
            assert!(doc < index.meta.docs_count);
        }
    }
}

#[test]
fn operator_algebra() {
    let a: Vec<u32> = vec![1, 3, 5, 7, 9];
    let b: Vec<u32> = vec![2, 3, 5, 8];
    let c: Vec<u32> = vec![0, 5, 9];
    let universe: Vec<u32> = (0..10).collect();

    assert_eq!(intersect(&a, &b), intersect(&b, &a));
    assert_eq!(union(&a, &b), union(&b, &a));
    // AND distributes over OR.
    assert_eq!(
        intersect(&a, &union(&b, &c)),
        union(&intersect(&a, &b), &intersect(&a, &c))
    );
    // NOT(NOT(A)) = A within the universe.
    assert_eq!(difference(&universe, &difference(&universe, &a)), a);
    // A AND universe = A; A OR universe = universe.
    assert_eq!(intersect(&a, &universe), a);
    assert_eq!(union(&a, &universe), universe);
}

#[test]
fn not_of_unknown_term_is_whole_universe() {
    let index = foobar_index();
    assert_eq!(eval(&index, "!missing"), vec![0, 1, 2]);
}
