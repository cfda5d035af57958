//! Tokenizer implementation.

use super::{Span, Token, TokenKind};
use crate::dialect::Engine;

/// A lexer that splits SQL text into a lossless token stream.
pub struct Lexer<'a> {
    /// The input text.
    input: &'a str,
    /// The current byte position.
    pos: usize,
    /// The byte position of the start of the current token.
    start: usize,
    /// Whether a backslash escapes the next character in string literals.
    backslash_escapes: bool,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    ///
    /// String literals follow MySQL rules, where a backslash escapes the
    /// next character.
    #[must_use]
    pub const fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            start: 0,
            backslash_escapes: true,
        }
    }

    /// Creates a lexer reading string literals the way `engine` does.
    ///
    /// SQLite strings have no backslash escapes: `'\'` is a complete
    /// one-character literal.
    #[must_use]
    pub const fn for_engine(input: &'a str, engine: Engine) -> Self {
        Self {
            input,
            pos: 0,
            start: 0,
            backslash_escapes: matches!(engine, Engine::MySql),
        }
    }

    /// Returns the current character without advancing.
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    /// Returns the character after the current one without advancing.
    fn peek_next(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    /// Advances to the next character and returns it.
    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, Span::new(self.start, self.pos))
    }

    fn is_word_start(c: char) -> bool {
        c.is_ascii_alphabetic() || c == '_'
    }

    fn is_word_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_'
    }

    /// Scans a word, following `.` separators into a dotted path.
    fn scan_word(&mut self) -> Token {
        loop {
            while self.peek().is_some_and(Self::is_word_char) {
                self.advance();
            }
            if self.peek() == Some('.') && self.peek_next().is_some_and(Self::is_word_start) {
                self.advance();
                continue;
            }
            break;
        }
        let word = self.input[self.start..self.pos].to_string();
        self.make_token(TokenKind::Word(word))
    }

    fn scan_number(&mut self) -> Token {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        self.make_token(TokenKind::Number)
    }

    /// Consumes a quoted run up to and including the closing quote.
    ///
    /// A doubled quote escapes itself. When `backslash_escapes` is set, a
    /// backslash escapes the next character. An unterminated run extends to the end of input.
    fn consume_quoted(&mut self, quote: char, backslash_escapes: bool) -> String {
        let mut content = String::new();
        while let Some(c) = self.advance() {
            if c == quote {
                if self.peek() == Some(quote) {
                    self.advance();
                    content.push(quote);
                    continue;
                }
                break;
            }
            if backslash_escapes && c == '\\' {
                content.push(c);
                if let Some(escaped) = self.advance() {
                    content.push(escaped);
                }
                continue;
            }
            content.push(c);
        }
        content
    }

    /// Scans `{name}`; falls back to a plain symbol for anything else.
    fn scan_placeholder(&mut self) -> Token {
        let rest = &self.input[self.pos..];
        let name_len = rest
            .find(|c: char| !Self::is_word_char(c))
            .unwrap_or(rest.len());
        if name_len > 0 && rest[name_len..].starts_with('}') {
            let name = rest[..name_len].to_string();
            self.pos += name_len + 1;
            return self.make_token(TokenKind::Placeholder(name));
        }
        self.make_token(TokenKind::Symbol('{'))
    }

    /// Scans the next token, or returns `None` at end of input.
    pub fn next_token(&mut self) -> Option<Token> {
        self.start = self.pos;
        let c = self.advance()?;

        let token = match c {
            c if c.is_whitespace() => {
                while self.peek().is_some_and(char::is_whitespace) {
                    self.advance();
                }
                self.make_token(TokenKind::Whitespace)
            }
            '\'' => {
                self.consume_quoted('\'', self.backslash_escapes);
                self.make_token(TokenKind::StringLiteral)
            }
            '"' => {
                self.consume_quoted('"', false);
                self.make_token(TokenKind::DoubleQuoted)
            }
            '`' => {
                let name = self.consume_quoted('`', false);
                self.make_token(TokenKind::Backtick(name))
            }
            '{' => self.scan_placeholder(),
            '&' if self.peek() == Some('&') => {
                self.advance();
                self.make_token(TokenKind::And)
            }
            '|' if self.peek() == Some('|') => {
                self.advance();
                self.make_token(TokenKind::Or)
            }
            c if c.is_ascii_digit() => self.scan_number(),
            c if Self::is_word_start(c) => self.scan_word(),
            other => self.make_token(TokenKind::Symbol(other)),
        };
        Some(token)
    }

    /// Tokenizes the entire input.
    #[must_use]
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token() {
            tokens.push(token);
        }
        tokens
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}
