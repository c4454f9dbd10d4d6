//! Diagnostic collection and source locations.
//!
//! The [`DiagSink`] is the compilation-wide store for registered source files
//! and accumulated diagnostics. Every stage (lexer, environment, unifier,
//! inference) reports through a shared [`Diags`] handle and keeps going;
//! nothing in the front-end aborts on the first error.

use std::{cell::RefCell, fmt, rc::Rc};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

/// Identifies a source file registered with a [`DiagSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(u32);

impl FileId {
    /// Placeholder for locations that do not point into any registered file.
    pub const UNKNOWN: Self = Self(u32::MAX);

    pub(crate) fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("file id exceeds u32"))
    }

    /// Returns the raw index into the sink's file table.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A position in a registered source file.
///
/// `pos` is a byte offset into the file's text. A token's lexeme is exactly
/// `text[loc.pos .. loc.pos + len]`. The `unknown` flag marks synthesized
/// locations (desugared nodes, loaded signatures) that should not be rendered
/// as a file position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loc {
    pub file: FileId,
    pub pos: u32,
    pub unknown: bool,
}

impl Loc {
    /// A location at byte offset `pos` of `file`.
    #[must_use]
    pub const fn new(file: FileId, pos: u32) -> Self {
        Self {
            file,
            pos,
            unknown: false,
        }
    }

    /// A location that points nowhere.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            file: FileId::UNKNOWN,
            pos: 0,
            unknown: true,
        }
    }

    /// Returns a copy shifted forward by `n` bytes.
    #[must_use]
    pub const fn advance(self, n: u32) -> Self {
        Self {
            file: self.file,
            pos: self.pos + n,
            unknown: self.unknown,
        }
    }
}

/// How severe a diagnostic is. Errors block downstream phases, warnings
/// do not; the driver makes that call from the sink's tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

/// Machine-readable classification of a diagnostic.
///
/// Uses strum derives so the kind renders as its variant name. The message on
/// the diagnostic carries the human-readable detail; the kind is what tests
/// and tooling match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize, Deserialize)]
pub enum DiagKind {
    // --- lexical ---
    UnterminatedString,
    UnterminatedChar,
    InvalidIntLiteral,
    UnknownEscape,
    InvalidUnicodeEscape,
    ByteOutOfRange,
    UnrecognizedChar,

    // --- resolution ---
    UnknownType,
    UnknownIdent,
    UnknownInductionVar,
    UnknownField,
    UnknownVariant,
    UnknownMethod,

    // --- unification ---
    CannotUnify,
    ArityMismatch,
    NameMismatch,
    UnknownTypevar,
    UnmetTraitBound,

    // --- structural ---
    CallNonFunction,
    ReturnOutsideFn,
    BreakOutsideLoop,
    ContinueOutsideLoop,
    TooManyContinueValues,
    TooManyLoopVars,
    NotIterable,
    NotAStruct,
    NotATuple,
    MissingField,
    UnknownKwarg,
    MissingKwarg,

    // --- unsupported ---
    NonIntegralRange,
}

/// One reported problem with its source range.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagKind,
    pub message: String,
    pub from: Loc,
    pub to: Loc,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.kind, self.message)
    }
}

/// One registered source file: its name, original text, and the byte offset
/// of each line start (always starting with 0).
#[derive(Debug)]
struct SourceFile {
    name: String,
    text: String,
    line_starts: Vec<u32>,
}

impl SourceFile {
    fn new(name: &str, text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(u32::try_from(i + 1).expect("source file exceeds u32 offsets"));
            }
        }
        Self {
            name: name.to_owned(),
            text: text.to_owned(),
            line_starts,
        }
    }
}

/// The compilation-wide diagnostic collector.
///
/// Owns the file-contents registry (used to turn byte offsets into
/// `file:line:col` positions) and the accumulated diagnostics with separate
/// error and warning tallies.
#[derive(Debug, Default)]
pub struct DiagSink {
    files: Vec<SourceFile>,
    by_name: AHashMap<String, FileId>,
    diags: Vec<Diagnostic>,
    errors: usize,
    warnings: usize,
}

impl DiagSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `text` under `name` and returns the file's id.
    ///
    /// Re-registering the same name replaces the stored text (a fresh lex of
    /// an edited file) and keeps the id stable.
    pub fn register_file(&mut self, name: &str, text: &str) -> FileId {
        if let Some(&id) = self.by_name.get(name) {
            self.files[id.index()] = SourceFile::new(name, text);
            return id;
        }
        let id = FileId::new(self.files.len());
        self.files.push(SourceFile::new(name, text));
        self.by_name.insert(name.to_owned(), id);
        id
    }

    /// The registered name of `file`.
    ///
    /// # Panics
    /// Panics if `file` was not issued by this sink.
    #[must_use]
    pub fn file_name(&self, file: FileId) -> &str {
        &self.files[file.index()].name
    }

    /// The registered text of `file`.
    ///
    /// # Panics
    /// Panics if `file` was not issued by this sink.
    #[must_use]
    pub fn file_text(&self, file: FileId) -> &str {
        &self.files[file.index()].text
    }

    /// 1-based line and column for `loc`, or `None` for unknown locations.
    #[must_use]
    pub fn line_col(&self, loc: Loc) -> Option<(u32, u32)> {
        if loc.unknown || loc.file.index() >= self.files.len() {
            return None;
        }
        let starts = &self.files[loc.file.index()].line_starts;
        let line = match starts.binary_search(&loc.pos) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        Some((
            u32::try_from(line).expect("line exceeds u32") + 1,
            loc.pos - starts[line] + 1,
        ))
    }

    /// Printable `file:line:col` form of `loc`.
    #[must_use]
    pub fn render(&self, loc: Loc) -> String {
        match self.line_col(loc) {
            Some((line, col)) => format!("{}:{line}:{col}", self.file_name(loc.file)),
            None => "<unknown>".to_owned(),
        }
    }

    pub fn error(&mut self, kind: DiagKind, message: impl Into<String>, from: Loc, to: Loc) {
        self.errors += 1;
        self.diags.push(Diagnostic {
            severity: Severity::Error,
            kind,
            message: message.into(),
            from,
            to,
        });
    }

    pub fn warning(&mut self, kind: DiagKind, message: impl Into<String>, from: Loc, to: Loc) {
        self.warnings += 1;
        self.diags.push(Diagnostic {
            severity: Severity::Warning,
            kind,
            message: message.into(),
            from,
            to,
        });
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diags
    }
}

/// Cloneable handle to the shared [`DiagSink`].
///
/// The front-end is single-threaded; the handle is deliberately `!Send` and
/// every stage holds a clone of the same sink. Short-lived borrows only: no
/// method hands out a reference that outlives the call.
#[derive(Debug, Clone, Default)]
pub struct Diags(Rc<RefCell<DiagSink>>);

impl Diags {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_file(&self, name: &str, text: &str) -> FileId {
        self.0.borrow_mut().register_file(name, text)
    }

    pub fn error(&self, kind: DiagKind, message: impl Into<String>, from: Loc, to: Loc) {
        self.0.borrow_mut().error(kind, message, from, to);
    }

    pub fn warning(&self, kind: DiagKind, message: impl Into<String>, from: Loc, to: Loc) {
        self.0.borrow_mut().warning(kind, message, from, to);
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.0.borrow().error_count()
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.0.borrow().warning_count()
    }

    /// Printable `file:line:col` form of `loc`.
    #[must_use]
    pub fn render(&self, loc: Loc) -> String {
        self.0.borrow().render(loc)
    }

    /// Read access to the underlying sink.
    pub fn with<R>(&self, f: impl FnOnce(&DiagSink) -> R) -> R {
        f(&self.0.borrow())
    }
}
