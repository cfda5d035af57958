//! Lossless tokenizer for condition strings and raw statements.
//!
//! Every byte of the input belongs to exactly one token, so a statement can
//! be rewritten token by token and reassembled without disturbing string
//! literals or quoted identifiers.

mod span;
mod token;
mod tokenizer;

pub use span::Span;
pub use token::{Token, TokenKind};
pub use tokenizer::Lexer;
