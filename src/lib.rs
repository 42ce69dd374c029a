//! Companion: a chat front-end core for a locally hosted language model.
//!
//! # Architecture
//!
//! - **Inference adapter** ([`llm`]): loads a GGUF model via `mistralrs`
//!   and shapes chat history into requests
//! - **Conversation controller** ([`chat`]): sequences turns, restarts the
//!   context from a summary when it overflows, extends the last answer
//! - **Collaborators**: [`store`] (SQLite or in-memory), [`notify`],
//!   [`i18n`] and the shared [`state`]

// Fail early with a clear message when the metal feature is enabled but the
// Metal Toolchain is not installed. Without this, mistralrs panics deep in a
// build script with an opaque error.
#[cfg(missing_metal_toolchain)]
compile_error!(
    "The `metal` feature requires Apple's Metal Toolchain. Install it with:\n\n    \
     xcodebuild -downloadComponent MetalToolchain\n\n\
     This is a one-time ~700 MB download."
);

pub mod chat;
pub mod companion_dirs;
pub mod config;
pub mod error;
pub mod i18n;
pub mod llm;
pub mod message;
pub mod notify;
pub mod state;
pub mod store;

pub use chat::{ChatEvent, ContinueOutcome, ConversationController, TurnOutcome};
pub use config::CompanionConfig;
pub use error::{CompanionError, Result};
pub use llm::{Generation, InferenceAdapter};
pub use message::{Message, Role};
pub use state::{AppState, Status};
pub use store::{MemoryStore, MessageStore, SqliteStore};
