//! Error types for the companion core.

use crate::llm::error::InferenceError;
use crate::store::StoreError;

/// Top-level error type for the chat companion.
#[derive(Debug, thiserror::Error)]
pub enum CompanionError {
    /// Language model loading or inference error.
    #[error("LLM error: {0}")]
    Llm(#[from] InferenceError),

    /// Message or settings persistence error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Conversation export or import error.
    #[error("export error: {0}")]
    Export(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CompanionError>;
