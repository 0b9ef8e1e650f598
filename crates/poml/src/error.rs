//! Error types for POML processing.
//!
//! Only caller-level contract violations are errors. Problems inside a
//! document (bad markup, invalid JSON payloads, unresolved variables, missing
//! include files) degrade into text and never reach this type.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by [`process`](crate::process) and the encoder.
#[derive(Debug, Error)]
pub enum PomlError {
    /// The requested output format name is not recognized.
    #[error("unknown output format '{0}' (expected one of: raw, dict, message_dict, openai_chat, langchain, pydantic)")]
    UnknownFormat(String),

    /// A document registered more than one response schema.
    #[error("a response schema is already registered for this document")]
    DuplicateSchema,

    /// The markup argument was neither text nor a path.
    #[error("invalid markup input: {0}")]
    InvalidMarkup(String),

    /// Reading markup or writing the output file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serializing the payload failed.
    #[error("JSON serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PomlError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PomlError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for POML operations.
pub type Result<T> = std::result::Result<T, PomlError>;
