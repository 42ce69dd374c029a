//! Language model inference.
//!
//! [`InferenceAdapter`] shapes chat history into requests and folds every
//! failure into display text. The model itself runs behind
//! [`InferenceBackend`]:
//! - **Local** (default): GGUF models via `mistralrs`, with Metal GPU on Apple Silicon.
//! - **Scripted**: canned replies for tests and offline runs.

pub mod adapter;
pub mod backend;
pub mod context;
pub mod error;
pub mod local;
pub mod prompt;
pub mod scripted;
mod think;
pub mod types;

pub use adapter::{InferenceAdapter, NOT_LOADED_FRAGMENT, NOT_LOADED_REPLY, ReplyStream};
pub use backend::{InferenceBackend, TextStream};
pub use error::InferenceError;
pub use local::MistralrsBackend;
pub use scripted::{RecordedRequest, ScriptedBackend};
pub use types::{ChatTurn, Generation, GenerationOptions};
