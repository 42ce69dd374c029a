//! Chat message types.
//!
//! A [`Message`] is one entry in a conversation's chronological history.
//! The id is `None` until the message has been persisted by a
//! [`MessageStore`](crate::store::MessageStore).
//!
//! # Examples
//!
//! ```
//! use companion::message::{Message, Role};
//!
//! let msg = Message::user(1, "What is Rust?");
//! assert_eq!(msg.role, Role::User);
//! assert!(msg.id.is_none());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a conversation.
pub type ConversationId = i64;

/// Identifier assigned to a message by the store.
pub type MessageId = i64;

/// The role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant (model) output.
    Assistant,
}

impl Role {
    /// Returns the lowercase wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse a lowercase role name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned identifier (`None` before persistence).
    pub id: Option<MessageId>,
    /// Conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// Who sent this message.
    pub role: Role,
    /// The message text.
    pub content: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create an unsaved message with the given role.
    pub fn new(conversation_id: ConversationId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: None,
            conversation_id,
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Create a user message.
    pub fn user(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::Assistant, content)
    }

    /// Create a system message.
    pub fn system(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::System, content)
    }

    /// Return a copy carrying the given store id.
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }
}
