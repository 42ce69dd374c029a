//! Error types for the inference layer.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) that is
//! included in the Display output and accessible via [`InferenceError::code()`].

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// The model handle is absent or failed to load.
    pub const MODEL_NOT_READY: &str = "MODEL_NOT_READY";

    /// Loading the model file failed.
    pub const LOAD_FAILED: &str = "LOAD_FAILED";

    /// The prompt does not fit the model's context window.
    pub const CONTEXT_OVERFLOW: &str = "CONTEXT_OVERFLOW";

    /// The runtime failed while generating.
    pub const GENERATION_FAILED: &str = "GENERATION_FAILED";

    /// A streaming response broke off.
    pub const STREAM_FAILED: &str = "STREAM_FAILED";
}

/// Errors produced by inference backends.
///
/// The Display impl formats as `[CODE] message`. Use [`message()`](Self::message)
/// for the bare text shown to users.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferenceError {
    /// The model is not loaded.
    #[error("[{}] {}", error_codes::MODEL_NOT_READY, .0)]
    NotReady(String),

    /// Loading the model file failed.
    #[error("[{}] {}", error_codes::LOAD_FAILED, .0)]
    LoadFailed(String),

    /// The prompt plus output budget exceeds the context window.
    #[error("[{}] {}", error_codes::CONTEXT_OVERFLOW, .0)]
    ContextOverflow(String),

    /// The runtime reported an error during generation.
    #[error("[{}] {}", error_codes::GENERATION_FAILED, .0)]
    GenerationFailed(String),

    /// The token stream reported an error.
    #[error("[{}] {}", error_codes::STREAM_FAILED, .0)]
    StreamFailed(String),
}

impl InferenceError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotReady(_) => error_codes::MODEL_NOT_READY,
            Self::LoadFailed(_) => error_codes::LOAD_FAILED,
            Self::ContextOverflow(_) => error_codes::CONTEXT_OVERFLOW,
            Self::GenerationFailed(_) => error_codes::GENERATION_FAILED,
            Self::StreamFailed(_) => error_codes::STREAM_FAILED,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::NotReady(m)
            | Self::LoadFailed(m)
            | Self::ContextOverflow(m)
            | Self::GenerationFailed(m)
            | Self::StreamFailed(m) => m,
        }
    }

    /// Returns true when the failure means the context window was exceeded.
    pub fn is_context_overflow(&self) -> bool {
        matches!(self, Self::ContextOverflow(_))
    }
}

/// Convenience alias for inference results.
pub type Result<T> = std::result::Result<T, InferenceError>;
