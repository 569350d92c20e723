use irix::tokenizer::{TokenStats, Tokenizer};

fn run(json: &[u8], with_docid: bool) -> (String, TokenStats) {
    let mut out = Vec::new();
    let stats = Tokenizer::new("parsed_text")
        .with_docid(with_docid)
        .run(json, Some(&mut out))
        .expect("tokenize");
    (String::from_utf8(out).expect("token stream is UTF-8"), stats)
}

#[test]
fn hello_world_with_docid() {
    let (out, stats) = run(br#"[{"parsed_text":"Hello, world!"}]"#, true);
    assert_eq!(out, "0\tHello\n0\tworld\n");
    assert_eq!(stats.docs_with_field, 1);
    assert_eq!(stats.tokens, 2);
    assert_eq!(stats.token_chars, 10);
    assert_eq!(stats.text_bytes, 13);
}

#[test]
fn without_docid_no_prefix() {
    let (out, _) = run(br#"{"parsed_text":"Hello, world!"}"#, false);
    assert_eq!(out, "Hello\nworld\n");
}

#[test]
fn hyphen_rules() {
    // Single interior hyphens join; a double hyphen and a trailing hyphen
    // both separate.
    let (out, _) = run(br#"{"parsed_text":"state-of-the-art co--op x-"}"#, false);
    assert_eq!(out, "state-of-the-art\nco\nop\nx\n");
}

#[test]
fn hyphen_needs_base_on_both_sides() {
    let (out, _) = run(br#"{"parsed_text":"-lead a-b- mid-, tail-"}"#, false);
    assert_eq!(out, "lead\na-b\nmid\ntail\n");
}

#[test]
fn cyrillic_base_lengths() {
    let json = r#"{"parsed_text":"Привет, мир!"}"#.as_bytes().to_vec();
    let (out, stats) = run(&json, true);
    assert_eq!(out, "0\tПривет\n0\tмир\n");
    assert_eq!(stats.tokens, 2);
    assert_eq!(stats.token_chars, 9);
}

#[test]
fn combining_marks_extend_but_do_not_count() {
    // 'e' + U+0301 inside a token: kept in the payload, excluded from
    // token_chars, and unable to start a token on its own.
    let json = "{\"parsed_text\":\"cafe\u{0301} \u{0301}tail\"}".as_bytes().to_vec();
    let (out, stats) = run(&json, false);
    assert_eq!(out, "cafe\u{0301}\ntail\n");
    assert_eq!(stats.token_chars, 8);
}

#[test]
fn docids_count_field_matches() {
    let json = br#"[
        {"parsed_text":"one two", "other":"ignored"},
        {"noise":"something else"},
        {"parsed_text":"three"}
    ]"#;
    let (out, stats) = run(json, true);
    assert_eq!(out, "0\tone\n0\ttwo\n1\tthree\n");
    assert_eq!(stats.docs_with_field, 2);
}

#[test]
fn escapes_and_surrogate_pairs() {
    let (out, _) = run(br#"{"parsed_text":"a\tb \u0414\u043e\u043c \uD834\uDD1Ec"}"#, false);
    // The decoded G-clef is outside every base range, so it separates.
    assert_eq!(out, "a\nb\n\u{0414}\u{043e}\u{043c}\nc\n");
}

#[test]
fn lone_surrogate_becomes_separator() {
    let (out, stats) = run(br#"{"parsed_text":"x\uD800y"}"#, false);
    assert_eq!(out, "x\ny\n");
    assert_eq!(stats.docs_with_field, 1);
}

#[test]
fn invalid_utf8_is_replaced_not_fatal() {
    let mut json = Vec::new();
    json.extend_from_slice(b"{\"parsed_text\":\"a");
    json.push(0xFF);
    json.extend_from_slice(b"b\"}");
    let (out, stats) = run(&json, false);
    assert_eq!(out, "a\nb\n");
    assert_eq!(stats.tokens, 2);
}

#[test]
fn failed_value_attempt_is_skipped() {
    // The value contains an unknown escape, so the string attempt fails and
    // no document is counted.
    let (out, stats) = run(br#"{"parsed_text":"bad \q value"}"#, false);
    assert_eq!(out, "");
    assert_eq!(stats.docs_with_field, 0);
}

#[test]
fn scanner_recovers_after_damage() {
    // The first value dies on an unknown escape and never closes its quote;
    // rescanning from one byte after the opening quote finds the next
    // well-formed object.
    let json = br#"{"parsed_text":"broken \q oops {"parsed_text":"good one"}"#;
    let (out, stats) = run(json, true);
    assert_eq!(stats.docs_with_field, 1);
    assert_eq!(out, "0\tgood\n0\tone\n");
}

#[test]
fn custom_field_name() {
    let mut out = Vec::new();
    let stats = Tokenizer::new("body")
        .run(br#"{"body":"alpha beta","parsed_text":"ignored"}"#, Some(&mut out))
        .expect("tokenize");
    assert_eq!(String::from_utf8(out).unwrap(), "alpha\nbeta\n");
    assert_eq!(stats.docs_with_field, 1);
}

#[test]
fn agrees_with_serde_json_escaping() {
    // A well-formed document produced by a real JSON writer scans the same
    // as hand-written input.
    let value = serde_json::json!([
        {"parsed_text": "tab\tnewline\nа также ёлки"},
        {"parsed_text": "quote \" backslash \\ done"},
    ]);
    let json = serde_json::to_vec(&value).unwrap();
    let (out, stats) = run(&json, true);
    assert_eq!(stats.docs_with_field, 2);
    assert_eq!(
        out,
        "0\ttab\n0\tnewline\n0\tа\n0\tтакже\n0\tёлки\n1\tquote\n1\tbackslash\n1\tdone\n"
    );
}

#[test]
fn digits_are_base_characters() {
    let (out, stats) = run(br#"{"parsed_text":"top10 2024 a1-b2"}"#, false);
    assert_eq!(out, "top10\n2024\na1-b2\n");
    assert_eq!(stats.token_chars, 5 + 4 + 4);
}
