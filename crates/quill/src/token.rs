//! The token model produced by the lexer.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::diag::Loc;

/// Width and signedness of an integer literal, derived from its suffix.
///
/// `width` is 32 or 64, or -1 for arbitrary precision (`N` suffix). The
/// default with no suffix is signed 32-bit; `l`/`L` selects 64-bit width and
/// `u`/`U` is an explicit signedness marker that keeps the literal signed
/// (`0xFFuL` carries `width: 64, signed: true`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntTy {
    pub width: i8,
    pub signed: bool,
}

impl IntTy {
    /// Arbitrary-precision marker width.
    pub const BIG_WIDTH: i8 = -1;

    /// Signed 32-bit, the default for unsuffixed literals.
    #[must_use]
    pub const fn i32() -> Self {
        Self {
            width: 32,
            signed: true,
        }
    }

    /// Signed 64-bit (`l` suffix).
    #[must_use]
    pub const fn i64() -> Self {
        Self {
            width: 64,
            signed: true,
        }
    }

    /// Arbitrary precision (`N` suffix).
    #[must_use]
    pub const fn big() -> Self {
        Self {
            width: Self::BIG_WIDTH,
            signed: true,
        }
    }

    /// True for the `N`-suffixed arbitrary-precision form.
    #[must_use]
    pub const fn is_big(self) -> bool {
        self.width == Self::BIG_WIDTH
    }
}

impl Default for IntTy {
    fn default() -> Self {
        Self::i32()
    }
}

/// Reserved words of the language.
///
/// The strum derives give the lowercase source spelling both ways: the lexer
/// recognizes keywords with `Keyword::from_str` after scanning an identifier,
/// and `Display` renders the source form for messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    As,
    Break,
    Continue,
    Else,
    Enum,
    Extern,
    False,
    Fn,
    Fnalias,
    For,
    Guard,
    If,
    Impl,
    In,
    Is,
    Let,
    Match,
    Mut,
    Pub,
    Return,
    Struct,
    Test,
    Trait,
    True,
    Type,
    Typealias,
    While,
}

/// A lexical token: its kind with payload, the location of its first byte,
/// and the byte length of the lexeme it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: Loc,
    pub len: u32,
}

impl Token {
    #[must_use]
    pub const fn new(kind: TokenKind, loc: Loc, len: u32) -> Self {
        Self { kind, loc, len }
    }
}

/// Token kinds with their payloads.
///
/// Multi-character operators are distinct kinds (maximal munch in the lexer);
/// everything the downstream parser needs to know about a literal is carried
/// on the token, including the full-precision integer value and its
/// suffix-derived [`IntTy`].
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Lowercase identifier, e.g. `count`.
    Ident(String),
    /// Capitalized identifier, e.g. `Buffer`.
    Typename(String),
    /// `@pkg` or `@org/pkg` package reference (payload without the `@`).
    Packname(String),
    /// `#deprecated` or `#target.js` attribute (payload without the `#`).
    Attribute(String),
    /// A reserved word.
    Kw(Keyword),
    /// `pub(all)`.
    Puball,
    /// `pub(open)`.
    Pubopen,

    /// Integer literal with its full-precision value and suffix metadata.
    Int { value: BigInt, ty: IntTy },
    /// Floating literal, default 64-bit.
    Double(f64),
    /// `f`-suffixed 32-bit floating literal.
    Float(f32),
    /// Character literal with escapes resolved.
    Char(char),
    /// `b'…'` byte literal, range-checked to `[0, 255]`.
    Byte(u8),
    /// String literal; the payload is the raw source text between the quotes
    /// with escape sequences left unresolved (the parser resolves them).
    Str(String),
    /// One or more merged `#|…` raw-string fragments, each fragment keeping
    /// its terminating newline.
    RawStr(String),
    /// `b"…"` byte-string literal, escape-resolved and UTF-8 encoded.
    ByteStr(Vec<u8>),

    /// Explicit end-of-line marker so the parser can honor line-oriented
    /// statement rules.
    Newline,

    // --- multi-character operators ---
    /// `..=`
    DotDotEq,
    /// `..<`
    DotDotLt,
    /// `..`
    DotDot,
    /// `::`
    ColonColon,
    /// `->`
    Arrow,
    /// `=>`
    FatArrow,
    /// `==`
    EqEq,
    /// `!=`
    Ne,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `+=`
    PlusEq,
    /// `-=`
    MinusEq,
    /// `*=`
    StarEq,
    /// `/=`
    SlashEq,
    /// `%=`
    PercentEq,
    /// `&=`
    AmpEq,
    /// `|=`
    PipeEq,
    /// `^=`
    CaretEq,
    /// `&&`
    AmpAmp,
    /// `||`
    PipePipe,
    /// `|>`
    PipeGt,

    // --- single-character tokens ---
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Colon,
    Dot,
    Eq,
    Lt,
    Gt,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Bang,
    Question,
}

impl TokenKind {
    /// True for tokens that only structure the stream and never carry a
    /// lexeme the parser inspects.
    #[must_use]
    pub fn is_newline(&self) -> bool {
        matches!(self, Self::Newline)
    }
}
