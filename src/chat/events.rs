//! Events emitted by the conversation controller for front-ends.

use crate::message::Message;

/// Something the chat view should render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A user message was persisted and appended.
    UserMessage(Message),
    /// The model started working; show the thinking indicator.
    Thinking,
    /// The model finished; hide the thinking indicator.
    ThinkingDone,
    /// An assistant reply was persisted and appended.
    AssistantMessage(Message),
    /// An assistant message was extended in place by "continue".
    AssistantUpdated(Message),
    /// The user message was dropped from the conversation while the
    /// context was being summarized.
    UserMessageDiscarded(Message),
    /// The conversation was replaced by this summary message.
    ContextReset(Message),
    /// Transient error bubble. Never persisted.
    Error(String),
}
