//! Request and result types for the inference layer.
//!
//! - [`ChatTurn`]: one role-tagged entry of a generation request
//! - [`GenerationOptions`]: sampling parameters
//! - [`Generation`]: tagged outcome of a single-shot generation

use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

/// A role-tagged entry of a generation request.
///
/// Requests are ephemeral and never persisted, so turns carry only what
/// the model sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Who is speaking.
    pub role: Role,
    /// What was said.
    pub content: String,
}

impl ChatTurn {
    /// Create a turn with the given role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

impl From<&Message> for ChatTurn {
    fn from(msg: &Message) -> Self {
        Self::new(msg.role, msg.content.clone())
    }
}

/// Options controlling generation.
///
/// # Examples
///
/// ```
/// use companion::llm::GenerationOptions;
///
/// let opts = GenerationOptions::default().with_max_tokens(128);
/// assert_eq!(opts.max_tokens, 128);
/// assert!((opts.temperature - 0.7).abs() < f64::EPSILON);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum tokens to generate.
    pub max_tokens: usize,
    /// Nucleus sampling threshold.
    pub top_p: f64,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 512,
            top_p: 0.95,
        }
    }
}

impl GenerationOptions {
    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the maximum number of tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the nucleus sampling threshold.
    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }
}

/// Outcome of a single-shot generation.
///
/// The adapter never returns a Rust error from `generate`; failures are
/// folded into [`Generation::Error`] with user-facing text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    /// The model produced a reply.
    Reply(String),
    /// The request did not fit the model's context window.
    ContextLimitExceeded,
    /// Generation failed; the text is ready to show (`"Error: …"`).
    Error(String),
}

impl Generation {
    /// Text to display for this outcome, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Reply(t) | Self::Error(t) => Some(t),
            Self::ContextLimitExceeded => None,
        }
    }

    /// Returns true for [`Generation::Reply`].
    pub fn is_reply(&self) -> bool {
        matches!(self, Self::Reply(_))
    }
}
