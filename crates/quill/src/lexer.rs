//! The lexical analyzer.
//!
//! [`lex`] turns source text into a token stream with exact byte spans. The
//! lexer never aborts: every malformed literal is reported through the shared
//! [`Diags`] handle and scanning continues with a placeholder payload.
//!
//! Escape sequences are validated here but resolved later by the parser,
//! except inside byte-strings where the resolved UTF-8 bytes are the payload;
//! [`unescape`] is the shared resolver both use.

use num_bigint::BigInt;
use num_traits::Zero;

use crate::{
    diag::{DiagKind, Diags, FileId, Loc},
    token::{IntTy, Keyword, Token, TokenKind},
};

/// Lexes `source` (registered with the sink under `filename`) into tokens.
///
/// Newlines are emitted as explicit [`TokenKind::Newline`] tokens and a final
/// newline is synthesized, so the last statement of a file always ends with
/// one. Adjacent raw-string fragments are merged into a single token.
pub fn lex(filename: &str, source: &str, diags: &Diags) -> Vec<Token> {
    Lexer::new(filename, source, diags.clone()).run()
}

/// Resolves the escape sequences of a raw literal payload.
///
/// `raw` is the text between the quotes exactly as it appeared in source;
/// `loc` is the location of its first byte, used to position diagnostics for
/// unknown escapes and invalid unicode scalars. Unknown escapes resolve to
/// the escaped character itself so downstream phases see *something*.
pub fn unescape(raw: &str, loc: Loc, diags: &Diags) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let at = loc.advance(u32::try_from(i).unwrap_or(0));
        let Some((_, esc)) = chars.next() else {
            diags.error(DiagKind::UnknownEscape, "incomplete escape sequence", at, at.advance(1));
            break;
        };
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            '0' => out.push('\0'),
            '\\' | '"' | '\'' => out.push(esc),
            'u' => {
                let mut hex = String::new();
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    while let Some(&(_, h)) = chars.peek() {
                        if h == '}' {
                            chars.next();
                            break;
                        }
                        hex.push(h);
                        chars.next();
                    }
                } else {
                    for _ in 0..4 {
                        if let Some(&(_, h)) = chars.peek() {
                            hex.push(h);
                            chars.next();
                        }
                    }
                }
                match decode_scalar(&hex) {
                    Some(ch) => out.push(ch),
                    None => diags.error(
                        DiagKind::InvalidUnicodeEscape,
                        format!("invalid unicode scalar in escape: \\u{{{hex}}}"),
                        at,
                        at.advance(u32::try_from(hex.len() + 2).unwrap_or(2)),
                    ),
                }
            }
            'x' => {
                let mut hex = String::new();
                for _ in 0..2 {
                    if let Some(&(_, h)) = chars.peek() {
                        hex.push(h);
                        chars.next();
                    }
                }
                match decode_scalar(&hex) {
                    Some(ch) => out.push(ch),
                    None => diags.error(
                        DiagKind::InvalidUnicodeEscape,
                        format!("invalid byte escape: \\x{hex}"),
                        at,
                        at.advance(4),
                    ),
                }
            }
            other => {
                diags.error(
                    DiagKind::UnknownEscape,
                    format!("unknown escape sequence: \\{other}"),
                    at,
                    at.advance(2),
                );
                out.push(other);
            }
        }
    }
    out
}

fn decode_scalar(hex: &str) -> Option<char> {
    if hex.is_empty() {
        return None;
    }
    let code = u32::from_str_radix(hex, 16).ok()?;
    char::from_u32(code)
}

/// Character cursor over the source text plus the `"\n\0"` sentinel.
///
/// The sentinel's newline terminates the last line; its NUL stops the scan
/// loop without bounds checks on every peek.
struct Lexer {
    /// `(byte offset, char)` for every char of source + sentinel.
    chars: Vec<(u32, char)>,
    /// Byte offset one past the last sentinel char.
    end: u32,
    idx: usize,
    file: FileId,
    diags: Diags,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(filename: &str, source: &str, diags: Diags) -> Self {
        let file = diags.register_file(filename, source);
        let text = format!("{source}\n\0");
        let chars: Vec<(u32, char)> = text
            .char_indices()
            .map(|(i, c)| (u32::try_from(i).expect("source exceeds u32 offsets"), c))
            .collect();
        Self {
            chars,
            end: u32::try_from(text.len()).expect("source exceeds u32 offsets"),
            idx: 0,
            file,
            diags,
            tokens: Vec::new(),
        }
    }

    fn peek(&self, ahead: usize) -> char {
        self.chars.get(self.idx + ahead).map_or('\0', |&(_, c)| c)
    }

    /// Byte offset of the current char.
    fn pos(&self) -> u32 {
        self.chars.get(self.idx).map_or(self.end, |&(off, _)| off)
    }

    fn bump(&mut self) -> char {
        let c = self.peek(0);
        self.idx += 1;
        c
    }

    fn loc(&self, pos: u32) -> Loc {
        Loc::new(self.file, pos)
    }

    /// Emits a token spanning from byte offset `start` to the current char.
    fn push(&mut self, kind: TokenKind, start: u32) {
        let len = self.pos() - start;
        self.tokens.push(Token::new(kind, self.loc(start), len));
    }

    fn error(&self, kind: DiagKind, message: impl Into<String>, start: u32) {
        self.diags.error(kind, message, self.loc(start), self.loc(self.pos()));
    }

    /// Consumes the literal chars of `seq` if they all match, peeking first.
    fn eat_seq(&mut self, seq: &str) -> bool {
        for (i, c) in seq.chars().enumerate() {
            if self.peek(i) != c {
                return false;
            }
        }
        self.idx += seq.chars().count();
        true
    }

    fn run(mut self) -> Vec<Token> {
        loop {
            let c = self.peek(0);
            if c == '\0' {
                break;
            }
            let start = self.pos();
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\n' => {
                    // Loc points at the newline itself, before advancing past it.
                    self.bump();
                    self.push(TokenKind::Newline, start);
                }
                '/' if self.peek(1) == '/' => {
                    while !matches!(self.peek(0), '\n' | '\0') {
                        self.bump();
                    }
                }
                '0'..='9' => self.number(start),
                'b' if self.peek(1) == '\'' => self.byte_literal(start),
                'b' if self.peek(1) == '"' => self.byte_string(start),
                'a'..='z' | '_' => self.ident(start),
                'A'..='Z' => self.typename(start),
                '@' => self.packname(start),
                '#' if self.peek(1) == '|' => self.raw_string(start),
                '#' => self.attribute(start),
                '\'' => self.char_literal(start),
                '"' => self.string_literal(start),
                _ => self.operator(c, start),
            }
        }
        merge_raw_strings(self.tokens)
    }

    // --- identifiers, keywords, names ---

    fn scan_word(&mut self) -> String {
        let mut word = String::new();
        while matches!(self.peek(0), 'a'..='z' | 'A'..='Z' | '0'..='9' | '_') {
            word.push(self.bump());
        }
        word
    }

    fn ident(&mut self, start: u32) {
        let word = self.scan_word();
        match word.parse::<Keyword>() {
            Ok(Keyword::Pub) if self.eat_seq("(all)") => self.push(TokenKind::Puball, start),
            Ok(Keyword::Pub) if self.eat_seq("(open)") => self.push(TokenKind::Pubopen, start),
            Ok(kw) => self.push(TokenKind::Kw(kw), start),
            Err(_) => self.push(TokenKind::Ident(word), start),
        }
    }

    fn typename(&mut self, start: u32) {
        let word = self.scan_word();
        self.push(TokenKind::Typename(word), start);
    }

    fn packname(&mut self, start: u32) {
        self.bump();
        let mut name = String::new();
        while matches!(self.peek(0), 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '/') {
            name.push(self.bump());
        }
        if name.is_empty() {
            self.error(DiagKind::UnrecognizedChar, "unrecognized character: @", start);
        } else {
            self.push(TokenKind::Packname(name), start);
        }
    }

    fn attribute(&mut self, start: u32) {
        self.bump();
        let mut name = String::new();
        while matches!(self.peek(0), 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.') {
            name.push(self.bump());
        }
        if name.is_empty() {
            self.error(DiagKind::UnrecognizedChar, "unrecognized character: #", start);
        } else {
            self.push(TokenKind::Attribute(name), start);
        }
    }

    // --- numeric literals ---

    fn number(&mut self, start: u32) {
        let base: u32 = if self.peek(0) == '0' {
            match self.peek(1) {
                'x' | 'X' => {
                    self.idx += 2;
                    16
                }
                'o' => {
                    self.idx += 2;
                    8
                }
                'b' => {
                    self.idx += 2;
                    2
                }
                _ => 10,
            }
        } else {
            10
        };

        let digits = self.scan_digits(base);
        if digits.is_empty() {
            self.error(DiagKind::InvalidIntLiteral, format!("missing digits in base-{base} literal"), start);
        }

        // A `.` starts a fraction only when a digit of the base follows, so
        // `1..10`, `1..=10` and `1.abs()` all terminate the integer.
        let mut fraction = String::new();
        if matches!(base, 10 | 16) && self.peek(0) == '.' && self.peek(1).is_digit(base) {
            self.bump();
            fraction = self.scan_digits(base);
        }

        let exp_marker = if base == 16 { ['p', 'P'] } else { ['e', 'E'] };
        let mut exponent = None;
        if exp_marker.contains(&self.peek(0)) {
            let sign_len = usize::from(matches!(self.peek(1), '+' | '-'));
            if self.peek(1 + sign_len).is_ascii_digit() {
                self.bump();
                let negative = match self.peek(0) {
                    '-' => {
                        self.bump();
                        true
                    }
                    '+' => {
                        self.bump();
                        false
                    }
                    _ => false,
                };
                let digits = self.scan_digits(10);
                let magnitude: i32 = digits.parse().unwrap_or(0);
                exponent = Some(if negative { -magnitude } else { magnitude });
            }
        }

        let mut suffix = String::new();
        while self.peek(0).is_ascii_alphanumeric() {
            suffix.push(self.bump());
        }

        let is_float = !fraction.is_empty() || exponent.is_some();
        let float_suffix = matches!(suffix.as_str(), "f" | "F");
        if is_float || float_suffix {
            if !suffix.is_empty() && !float_suffix {
                self.error(
                    DiagKind::InvalidIntLiteral,
                    format!("invalid suffix on floating literal: {suffix}"),
                    start,
                );
            }
            let value = float_value(base, &digits, &fraction, exponent.unwrap_or(0));
            if float_suffix {
                self.push(TokenKind::Float(value as f32), start);
            } else {
                self.push(TokenKind::Double(value), start);
            }
            return;
        }

        let ty = match suffix.as_str() {
            "" => IntTy::default(),
            "n" | "N" => IntTy::big(),
            s if s.chars().all(|c| matches!(c, 'u' | 'U' | 'l' | 'L')) => {
                let mut ty = IntTy::default();
                for c in s.chars() {
                    match c {
                        // An explicit signedness marker; the literal stays in
                        // the signed domain (`0xFFuL` carries width 64,
                        // signed).
                        'u' | 'U' => ty.signed = true,
                        _ => ty.width = 64,
                    }
                }
                ty
            }
            s => {
                self.error(
                    DiagKind::InvalidIntLiteral,
                    format!("invalid digit or suffix in base-{base} literal: {s}"),
                    start,
                );
                IntTy::default()
            }
        };
        self.push(
            TokenKind::Int {
                value: int_value(base, &digits),
                ty,
            },
            start,
        );
    }

    /// Consumes digits valid under `base`, skipping `_` separators.
    fn scan_digits(&mut self, base: u32) -> String {
        let mut digits = String::new();
        loop {
            let c = self.peek(0);
            if c == '_' {
                self.bump();
            } else if c.is_digit(base) {
                digits.push(self.bump());
            } else {
                return digits;
            }
        }
    }

    // --- char / string / byte literals ---

    /// Scans the raw payload between `open` quotes, handling backslash parity
    /// so an escaped quote does not close the literal. Returns `None` when
    /// the literal hits end-of-line or end-of-input unterminated.
    fn scan_quoted_raw(&mut self, open: char) -> Option<String> {
        self.bump();
        let mut raw = String::new();
        let mut escaped = false;
        loop {
            let c = self.peek(0);
            if matches!(c, '\n' | '\0') {
                return None;
            }
            self.bump();
            if escaped {
                raw.push(c);
                escaped = false;
            } else if c == '\\' {
                raw.push(c);
                escaped = true;
            } else if c == open {
                return Some(raw);
            } else {
                raw.push(c);
            }
        }
    }

    /// Scans a char literal body (after any `b` prefix has been consumed) and
    /// returns the resolved character.
    fn scan_char(&mut self, start: u32) -> char {
        let Some(raw) = self.scan_quoted_raw('\'') else {
            self.error(DiagKind::UnterminatedChar, "unterminated character literal", start);
            return '\0';
        };
        let content_loc = self.loc(start).advance(1);
        let resolved = unescape(&raw, content_loc, &self.diags);
        let mut chars = resolved.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => {
                self.error(
                    DiagKind::UnterminatedChar,
                    "character literal must contain exactly one character",
                    start,
                );
                '\0'
            }
        }
    }

    fn char_literal(&mut self, start: u32) {
        let c = self.scan_char(start);
        self.push(TokenKind::Char(c), start);
    }

    fn byte_literal(&mut self, start: u32) {
        self.bump();
        let c = self.scan_char(start);
        let code = c as u32;
        let byte = if code > 0xFF {
            self.error(DiagKind::ByteOutOfRange, format!("byte literal out of range: {c:?}"), start);
            0
        } else {
            code as u8
        };
        self.push(TokenKind::Byte(byte), start);
    }

    fn string_literal(&mut self, start: u32) {
        match self.scan_quoted_raw('"') {
            Some(raw) => self.push(TokenKind::Str(raw), start),
            None => {
                self.error(DiagKind::UnterminatedString, "unterminated string literal", start);
                self.push(TokenKind::Str(String::new()), start);
            }
        }
    }

    fn byte_string(&mut self, start: u32) {
        self.bump();
        match self.scan_quoted_raw('"') {
            Some(raw) => {
                let content_loc = self.loc(start).advance(2);
                let resolved = unescape(&raw, content_loc, &self.diags);
                self.push(TokenKind::ByteStr(resolved.into_bytes()), start);
            }
            None => {
                self.error(DiagKind::UnterminatedString, "unterminated byte-string literal", start);
                self.push(TokenKind::ByteStr(Vec::new()), start);
            }
        }
    }

    /// One `#|…` fragment, consumed through its newline. Adjacent fragments
    /// are merged after the scan loop.
    fn raw_string(&mut self, start: u32) {
        self.idx += 2;
        let mut content = String::new();
        loop {
            let c = self.peek(0);
            if c == '\0' {
                break;
            }
            self.bump();
            content.push(c);
            if c == '\n' {
                break;
            }
        }
        self.push(TokenKind::RawStr(content), start);
    }

    // --- operators ---

    fn operator(&mut self, c: char, start: u32) {
        use TokenKind::*;
        self.bump();
        let kind = match c {
            '.' => match (self.peek(0), self.peek(1)) {
                ('.', '=') => {
                    self.idx += 2;
                    DotDotEq
                }
                ('.', '<') => {
                    self.idx += 2;
                    DotDotLt
                }
                ('.', _) => {
                    self.bump();
                    DotDot
                }
                _ => Dot,
            },
            ':' => self.one_or_two(':', ColonColon, Colon),
            '-' => match self.peek(0) {
                '>' => {
                    self.bump();
                    Arrow
                }
                '=' => {
                    self.bump();
                    MinusEq
                }
                _ => Minus,
            },
            '=' => match self.peek(0) {
                '>' => {
                    self.bump();
                    FatArrow
                }
                '=' => {
                    self.bump();
                    EqEq
                }
                _ => Eq,
            },
            '<' => match self.peek(0) {
                '=' => {
                    self.bump();
                    Le
                }
                '<' => {
                    self.bump();
                    Shl
                }
                _ => Lt,
            },
            '>' => match self.peek(0) {
                '=' => {
                    self.bump();
                    Ge
                }
                '>' => {
                    self.bump();
                    Shr
                }
                _ => Gt,
            },
            '!' => self.one_or_two('=', Ne, Bang),
            '+' => self.one_or_two('=', PlusEq, Plus),
            '*' => self.one_or_two('=', StarEq, Star),
            '/' => self.one_or_two('=', SlashEq, Slash),
            '%' => self.one_or_two('=', PercentEq, Percent),
            '&' => match self.peek(0) {
                '&' => {
                    self.bump();
                    AmpAmp
                }
                '=' => {
                    self.bump();
                    AmpEq
                }
                _ => Amp,
            },
            '|' => match self.peek(0) {
                '|' => {
                    self.bump();
                    PipePipe
                }
                '=' => {
                    self.bump();
                    PipeEq
                }
                '>' => {
                    self.bump();
                    PipeGt
                }
                _ => Pipe,
            },
            '^' => self.one_or_two('=', CaretEq, Caret),
            '(' => LParen,
            ')' => RParen,
            '{' => LBrace,
            '}' => RBrace,
            '[' => LBracket,
            ']' => RBracket,
            ',' => Comma,
            ';' => Semi,
            '?' => Question,
            other => {
                self.error(DiagKind::UnrecognizedChar, format!("unrecognized character: {other:?}"), start);
                return;
            }
        };
        self.push(kind, start);
    }

    fn one_or_two(&mut self, second: char, two: TokenKind, one: TokenKind) -> TokenKind {
        if self.peek(0) == second {
            self.bump();
            two
        } else {
            one
        }
    }
}

/// Computes a big-integer value from base-`base` digits (property: the value
/// equals the positional sum of the digits).
fn int_value(base: u32, digits: &str) -> BigInt {
    let mut value = BigInt::zero();
    for d in digits.chars() {
        let digit = d.to_digit(base).unwrap_or(0);
        value = value * base + digit;
    }
    value
}

/// Computes a floating value from mantissa digits, fraction digits and an
/// exponent. Decimal exponents scale by powers of ten, hex (`p`) exponents by
/// powers of two.
fn float_value(base: u32, digits: &str, fraction: &str, exponent: i32) -> f64 {
    if base == 16 {
        let mut mantissa = 0f64;
        for d in digits.chars() {
            mantissa = mantissa * 16.0 + f64::from(d.to_digit(16).unwrap_or(0));
        }
        let mut scale = 1.0 / 16.0;
        for d in fraction.chars() {
            mantissa += f64::from(d.to_digit(16).unwrap_or(0)) * scale;
            scale /= 16.0;
        }
        mantissa * 2f64.powi(exponent)
    } else {
        let fraction = if fraction.is_empty() { "0" } else { fraction };
        format!("{digits}.{fraction}e{exponent}").parse().unwrap_or(0.0)
    }
}

/// Merges runs of adjacent raw-string fragments into a single token.
///
/// Every fragment carries its own terminating newline (the scan loop
/// guarantees it via the sentinel), so the merged payload preserves line
/// boundaries and the merged length is the sum of the fragment lengths.
fn merge_raw_strings(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if let TokenKind::RawStr(frag) = &token.kind
            && let Some(last) = out.last_mut()
            && let TokenKind::RawStr(acc) = &mut last.kind
        {
            debug_assert!(acc.ends_with('\n'), "raw-string fragment must end with a newline");
            acc.push_str(frag);
            last.len += token.len;
            continue;
        }
        out.push(token);
    }
    out
}
