//! Token types produced by the [`super::Lexer`].

use super::Span;

/// The kind of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Run of whitespace.
    Whitespace,
    /// Bare word, possibly a dotted path such as `author.email` or `t0.id`.
    Word(String),
    /// Numeric literal.
    Number,
    /// Single-quoted string literal. Never rewritten.
    StringLiteral,
    /// Double-quoted token. Never rewritten.
    DoubleQuoted,
    /// Backtick-quoted identifier, holding the unescaped name.
    Backtick(String),
    /// `{name}` parameter placeholder, holding the name.
    Placeholder(String),
    /// `&&`
    And,
    /// `||`
    Or,
    /// Any other single character (operators, punctuation).
    Symbol(char),
}

/// A token with its location in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The kind of token.
    pub kind: TokenKind,
    /// The source location.
    pub span: Span,
}

impl Token {
    /// Creates a new token.
    #[must_use]
    pub const fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Returns the original text of this token.
    #[must_use]
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        self.span.slice(source)
    }

    /// Returns the word if this token is a bare word.
    #[must_use]
    pub fn as_word(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Word(word) => Some(word),
            _ => None,
        }
    }
}
