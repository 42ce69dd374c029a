//! Conversation sequencing.
//!
//! [`ConversationController`] drives one conversation: it persists turns,
//! asks the [`InferenceAdapter`](crate::llm::InferenceAdapter) for replies,
//! restarts the context from a summary when the model runs out of room,
//! and extends the last answer on request.

mod controller;
mod events;

pub use controller::{
    ContinueOutcome, ConversationController, Phase, TurnOutcome, concat_continuation,
};
pub use events::ChatEvent;
