//! Lexer behavior: literal formats, spans, escapes, raw-string merging, and
//! the universal properties of the token stream.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use quill::{DiagKind, Diags, IntTy, Keyword, Token, TokenKind, lex};

/// Lexes `source` and strips the trailing synthesized newline tokens away
/// from the comparison when the test only cares about payloads.
fn lex_kinds(source: &str) -> (Vec<Token>, Diags) {
    let diags = Diags::new();
    let tokens = lex("test.ql", source, &diags);
    (tokens, diags)
}

fn payloads(source: &str) -> Vec<TokenKind> {
    let (tokens, diags) = lex_kinds(source);
    assert_eq!(diags.error_count(), 0, "unexpected lex errors for {source:?}");
    tokens
        .into_iter()
        .filter(|t| !t.kind.is_newline())
        .map(|t| t.kind)
        .collect()
}

fn int_kind(value: i64, width: i8, signed: bool) -> TokenKind {
    TokenKind::Int {
        value: value.into(),
        ty: IntTy { width, signed },
    }
}

// --- integer literals ---

#[test]
fn hex_literal_with_width_and_sign_suffix() {
    let (tokens, diags) = lex_kinds("0xFFuL");
    assert_eq!(diags.error_count(), 0);
    assert_eq!(tokens[0].kind, int_kind(255, 64, true));
    assert_eq!(tokens[0].loc.pos, 0);
    assert_eq!(tokens[0].len, 6);
}

#[test]
fn base_prefixes_select_the_radix() {
    assert_eq!(
        payloads("0b1010 0o17 0x2A 42"),
        vec![int_kind(10, 32, true), int_kind(15, 32, true), int_kind(42, 32, true), int_kind(42, 32, true)]
    );
}

#[test]
fn underscores_are_stripped_from_digits() {
    assert_eq!(payloads("1_000_000"), vec![int_kind(1_000_000, 32, true)]);
}

#[test]
fn big_suffix_marks_arbitrary_precision() {
    let kinds = payloads("42N");
    let TokenKind::Int { value, ty } = &kinds[0] else {
        panic!("expected an int token, got {kinds:?}")
    };
    assert_eq!(value.to_string(), "42");
    assert!(ty.is_big());
}

#[test]
fn width_and_sign_suffixes_keep_the_literal_signed() {
    assert_eq!(payloads("7L"), vec![int_kind(7, 64, true)]);
    assert_eq!(payloads("7u"), vec![int_kind(7, 32, true)]);
    assert_eq!(payloads("7uL"), vec![int_kind(7, 64, true)]);
}

#[test]
fn invalid_digit_under_base_is_reported() {
    let (_, diags) = lex_kinds("0b12");
    assert_eq!(diags.error_count(), 1);
    diags.with(|sink| assert_eq!(sink.diagnostics()[0].kind, DiagKind::InvalidIntLiteral));
}

#[test]
fn missing_digits_after_base_prefix_is_reported() {
    let (_, diags) = lex_kinds("0x");
    assert_eq!(diags.error_count(), 1);
}

// --- floating literals ---

#[test]
fn decimal_exponent_makes_a_double() {
    assert_eq!(payloads("1_000e3"), vec![TokenKind::Double(1e6)]);
    assert_eq!(payloads("2.5"), vec![TokenKind::Double(2.5)]);
    assert_eq!(payloads("1e-2"), vec![TokenKind::Double(0.01)]);
}

#[test]
fn hex_float_with_binary_exponent() {
    let (tokens, diags) = lex_kinds("0x1.8p2F");
    assert_eq!(diags.error_count(), 0);
    assert_eq!(tokens[0].kind, TokenKind::Float(6.0));
    assert_eq!(tokens[0].len, 8);
}

#[test]
fn float_suffix_without_fraction() {
    assert_eq!(payloads("3f"), vec![TokenKind::Float(3.0)]);
}

#[test]
fn range_after_digits_terminates_the_integer() {
    assert_eq!(
        payloads("1..10"),
        vec![int_kind(1, 32, true), TokenKind::DotDot, int_kind(10, 32, true)]
    );
    assert_eq!(
        payloads("1..=10"),
        vec![int_kind(1, 32, true), TokenKind::DotDotEq, int_kind(10, 32, true)]
    );
    assert_eq!(
        payloads("0..<n"),
        vec![int_kind(0, 32, true), TokenKind::DotDotLt, TokenKind::Ident("n".to_owned())]
    );
}

// --- char / byte / string literals ---

#[test]
fn char_literals_resolve_escapes() {
    assert_eq!(
        payloads(r"'a' '\n' '\u{48}' '\x41'"),
        vec![
            TokenKind::Char('a'),
            TokenKind::Char('\n'),
            TokenKind::Char('H'),
            TokenKind::Char('A'),
        ]
    );
}

#[test]
fn string_payload_keeps_escapes_unresolved() {
    assert_eq!(payloads(r#""a\nb""#), vec![TokenKind::Str(r"a\nb".to_owned())]);
}

#[test]
fn escaped_quote_does_not_close_the_string() {
    assert_eq!(payloads(r#""a\"b""#), vec![TokenKind::Str(r#"a\"b"#.to_owned())]);
    // An even number of backslashes leaves the quote unescaped.
    assert_eq!(
        payloads(r#""a\\" 1"#),
        vec![TokenKind::Str(r"a\\".to_owned()), int_kind(1, 32, true)]
    );
}

#[test]
fn unterminated_string_is_reported_at_end_of_line() {
    let (_, diags) = lex_kinds("\"abc\nlet");
    assert_eq!(diags.error_count(), 1);
    diags.with(|sink| assert_eq!(sink.diagnostics()[0].kind, DiagKind::UnterminatedString));
}

#[test]
fn byte_string_is_utf8_encoded() {
    let (tokens, diags) = lex_kinds("b\"我\"");
    assert_eq!(diags.error_count(), 0);
    assert_eq!(tokens[0].kind, TokenKind::ByteStr(vec![0xE6, 0x88, 0x91]));
    assert_eq!(tokens[0].len, 6);
}

#[test]
fn byte_string_resolves_escapes() {
    assert_eq!(payloads(r#"b"a\n""#), vec![TokenKind::ByteStr(vec![b'a', b'\n'])]);
}

#[test]
fn byte_literal_in_range() {
    assert_eq!(payloads("b'a'"), vec![TokenKind::Byte(97)]);
}

#[test]
fn byte_literal_out_of_range_is_reported() {
    let (tokens, diags) = lex_kinds("b'我'");
    assert_eq!(diags.error_count(), 1);
    diags.with(|sink| assert_eq!(sink.diagnostics()[0].kind, DiagKind::ByteOutOfRange));
    assert_eq!(tokens[0].kind, TokenKind::Byte(0));
}

// --- raw strings ---

#[test]
fn adjacent_raw_string_fragments_merge() {
    let (tokens, diags) = lex_kinds("#|a\n#|b\n#|c\n");
    assert_eq!(diags.error_count(), 0);
    let without_newlines: Vec<&Token> = tokens.iter().filter(|t| !t.kind.is_newline()).collect();
    assert_eq!(without_newlines.len(), 1);
    assert_eq!(without_newlines[0].kind, TokenKind::RawStr("a\nb\nc\n".to_owned()));
    assert_eq!(without_newlines[0].len, 12);
    assert_eq!(without_newlines[0].loc.pos, 0);
}

#[test]
fn separated_raw_string_fragments_stay_separate() {
    let kinds = payloads("#|a\nlet\n#|b\n");
    assert_eq!(
        kinds,
        vec![
            TokenKind::RawStr("a\n".to_owned()),
            TokenKind::Kw(Keyword::Let),
            TokenKind::RawStr("b\n".to_owned()),
        ]
    );
}

// --- identifiers, keywords, names ---

#[test]
fn identifier_case_selects_the_kind() {
    assert_eq!(
        payloads("count Buffer _tmp"),
        vec![
            TokenKind::Ident("count".to_owned()),
            TokenKind::Typename("Buffer".to_owned()),
            TokenKind::Ident("_tmp".to_owned()),
        ]
    );
}

#[test]
fn keywords_are_recognized() {
    assert_eq!(
        payloads("let mut fn match"),
        vec![
            TokenKind::Kw(Keyword::Let),
            TokenKind::Kw(Keyword::Mut),
            TokenKind::Kw(Keyword::Fn),
            TokenKind::Kw(Keyword::Match),
        ]
    );
}

#[test]
fn pub_absorbs_visibility_qualifiers() {
    assert_eq!(
        payloads("pub pub(all) pub(open)"),
        vec![TokenKind::Kw(Keyword::Pub), TokenKind::Puball, TokenKind::Pubopen]
    );
}

#[test]
fn packnames_and_attributes() {
    assert_eq!(
        payloads("@collections #deprecated #target.js"),
        vec![
            TokenKind::Packname("collections".to_owned()),
            TokenKind::Attribute("deprecated".to_owned()),
            TokenKind::Attribute("target.js".to_owned()),
        ]
    );
}

// --- operators, comments, newlines ---

#[test]
fn maximal_munch_on_operators() {
    assert_eq!(
        payloads("..= ..< .. :: -> => == <= >= != << >> += && || |> |"),
        vec![
            TokenKind::DotDotEq,
            TokenKind::DotDotLt,
            TokenKind::DotDot,
            TokenKind::ColonColon,
            TokenKind::Arrow,
            TokenKind::FatArrow,
            TokenKind::EqEq,
            TokenKind::Le,
            TokenKind::Ge,
            TokenKind::Ne,
            TokenKind::Shl,
            TokenKind::Shr,
            TokenKind::PlusEq,
            TokenKind::AmpAmp,
            TokenKind::PipePipe,
            TokenKind::PipeGt,
            TokenKind::Pipe,
        ]
    );
}

#[test]
fn comments_are_skipped_but_newlines_survive() {
    let (tokens, diags) = lex_kinds("let // trailing comment\nmut");
    assert_eq!(diags.error_count(), 0);
    let kinds: Vec<TokenKind> = tokens.into_iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Kw(Keyword::Let),
            TokenKind::Newline,
            TokenKind::Kw(Keyword::Mut),
            TokenKind::Newline,
        ]
    );
}

#[test]
fn unrecognized_character_is_reported_and_skipped() {
    let (tokens, diags) = lex_kinds("let ~ mut");
    assert_eq!(diags.error_count(), 1);
    diags.with(|sink| assert_eq!(sink.diagnostics()[0].kind, DiagKind::UnrecognizedChar));
    let kinds: Vec<TokenKind> = tokens.into_iter().filter(|t| !t.kind.is_newline()).map(|t| t.kind).collect();
    assert_eq!(kinds, vec![TokenKind::Kw(Keyword::Let), TokenKind::Kw(Keyword::Mut)]);
}

#[test]
fn token_spans_slice_back_to_their_lexemes() {
    let source = "let total = 0xFF + count";
    let (tokens, diags) = lex_kinds(source);
    assert_eq!(diags.error_count(), 0);
    let expected = ["let", "total", "=", "0xFF", "+", "count"];
    let lexemes: Vec<&str> = tokens
        .iter()
        .filter(|t| !t.kind.is_newline())
        .map(|t| &source[t.loc.pos as usize..(t.loc.pos + t.len) as usize])
        .collect();
    assert_eq!(lexemes, expected);
}

// --- universal properties ---

fn atom_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z_][a-z0-9_]{0,8}".prop_map(|s| s),
        (0u64..u64::MAX).prop_map(|n| n.to_string()),
        (0u64..u64::MAX).prop_map(|n| format!("{n:#x}")),
        Just("..=".to_owned()),
        Just("->".to_owned()),
        Just("==".to_owned()),
        Just("|>".to_owned()),
        Just("(".to_owned()),
        Just(")".to_owned()),
    ]
}

proptest! {
    /// Every emitted token's span slices back to exactly its lexeme.
    #[test]
    fn lexeme_width_round_trip(atoms in proptest::collection::vec(atom_strategy(), 1..24)) {
        let source = atoms.join(" ");
        let diags = Diags::new();
        let tokens = lex("prop.ql", &source, &diags);
        let lexemes: Vec<&str> = tokens
            .iter()
            .filter(|t| !t.kind.is_newline())
            .map(|t| &source[t.loc.pos as usize..(t.loc.pos + t.len) as usize])
            .collect();
        prop_assert_eq!(lexemes, atoms.iter().map(String::as_str).collect::<Vec<_>>());
    }

    /// A digit sequence accepted under base `b` reparses to the positional
    /// sum of its digits.
    #[test]
    fn integer_parse_closure(digits in proptest::collection::vec(0u32..16, 1..12), base_idx in 0usize..4) {
        let bases: [(u32, &str); 4] = [(2, "0b"), (8, "0o"), (10, ""), (16, "0x")];
        let (base, prefix) = bases[base_idx];
        let digits: Vec<u32> = digits.into_iter().map(|d| d % base).collect();
        let literal: String = digits
            .iter()
            .map(|d| char::from_digit(*d, base).expect("digit in range"))
            .collect();
        let source = format!("{prefix}{literal}");
        let diags = Diags::new();
        let tokens = lex("prop.ql", &source, &diags);
        prop_assert_eq!(diags.error_count(), 0);
        match &tokens[0].kind {
            TokenKind::Int { value, .. } => {
                let expected = digits.iter().fold(0u128, |acc, d| acc * u128::from(base) + u128::from(*d));
                prop_assert_eq!(value.to_string(), expected.to_string());
            }
            other => prop_assert!(false, "expected int token for {}, got {:?}", source, other),
        }
    }
}
