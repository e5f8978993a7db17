//! The token definition for the JQL language.

use std::borrow::Cow;
use std::fmt;

use crate::error::Position;

/// A token is a single unit of the language, with a specific kind and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    /// The raw source text of the token, quotes and escapes included.
    pub text: &'a str,
    pub span: Span,
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // Keywords
    And,     // "AND", "&", "&&"
    Or,      // "OR", "|", "||"
    Not,     // "NOT", "!"
    In,      // "IN"
    Is,      // "IS"
    Empty,   // "EMPTY", "NULL"
    Order,   // "ORDER"
    By,      // "BY"
    Asc,     // "ASC"
    Desc,    // "DESC"
    Was,     // "WAS"
    Changed, // "CHANGED"
    Cf,      // "CF"
    On,      // "ON"
    Before,  // "BEFORE"
    After,   // "AFTER"
    From,    // "FROM"
    To,      // "TO"

    // Literals
    /// An unquoted word, escapes already decoded.
    Word(Cow<'a, str>),
    /// A quoted string, quotes stripped and escapes decoded.
    Quoted(Cow<'a, str>),
    Number(i64),

    // Punctuation
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    Comma,    // ,

    // Operators
    Eq,      // =
    NotEq,   // !=
    Like,    // ~
    NotLike, // !~
    Gt,      // >
    Lt,      // <
    Gte,     // >=
    Lte,     // <=
}

impl<'a> TokenKind<'a> {
    /// The string content of a word, quoted string or number token.
    pub fn as_value(&self) -> Option<Cow<'a, str>> {
        match self {
            TokenKind::Word(s) | TokenKind::Quoted(s) => Some(s.clone()),
            TokenKind::Number(n) => Some(Cow::Owned(n.to_string())),
            _ => None,
        }
    }
}

impl<'a> Token<'a> {
    /// Text used when the token is quoted back in an error message.
    pub fn display_text(&self) -> Cow<'a, str> {
        match &self.kind {
            TokenKind::Quoted(s) => s.clone(),
            _ => Cow::Borrowed(self.text),
        }
    }

    pub fn position(&self) -> Position {
        self.span.position()
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_text())
    }
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset.
    pub end: usize,
    /// Zero-based line of the first character.
    pub line: usize,
    /// Zero-based character (not byte) column of the first character.
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end, line: 0, column: 0 }
    }

    pub fn located(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self { start, end, line, column }
    }

    /// 1-based position used in user facing messages.
    pub fn position(&self) -> Position {
        Position::new(self.line + 1, self.column + 1)
    }
}
