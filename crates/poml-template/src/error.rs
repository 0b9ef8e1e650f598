//! Error types for expression parsing.

use thiserror::Error;

/// Errors produced while lexing or parsing a template expression.
///
/// These never escape [`substitute`](crate::substitute) or
/// [`safe_substitute`](crate::safe_substitute): an expression that fails to
/// parse simply leaves its `{{ }}` token in place. They are surfaced by
/// [`parse_expression`](crate::parse_expression) for callers that want to
/// validate expressions up front.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    /// The expression contained nothing but whitespace.
    #[error("empty expression")]
    Empty,

    /// A string literal was opened but never closed.
    #[error("unterminated string literal starting at offset {pos}")]
    UnterminatedString { pos: usize },

    /// A character that cannot begin any token.
    #[error("unexpected character '{found}' at offset {pos}")]
    UnexpectedChar { pos: usize, found: char },

    /// A token that is valid on its own but not where it appeared.
    #[error("unexpected {found} at offset {pos}")]
    UnexpectedToken { pos: usize, found: String },

    /// The expression ended while more input was required.
    #[error("unexpected end of expression, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    /// A complete expression was parsed but input remained.
    #[error("trailing input at offset {pos}")]
    TrailingInput { pos: usize },

    /// A numeric literal that does not fit the supported numeric types.
    #[error("invalid number literal '{literal}'")]
    InvalidNumber { literal: String },
}

/// Result type for expression operations.
pub type Result<T> = std::result::Result<T, ExprError>;
