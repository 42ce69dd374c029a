//! Persistence of messages and settings.
//!
//! [`MessageStore`] is the async storage contract the chat controller and
//! settings flow depend on. Two backends are provided:
//!
//! - [`MemoryStore`]: in-process, for tests and ephemeral sessions
//! - [`SqliteStore`]: a single SQLite file under the data directory

pub mod export;
pub mod memory;
mod schema;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::message::{ConversationId, Message, MessageId};

pub use export::{ConversationExport, ExportedMessage, read_export, write_export};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors produced by message stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite failure.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// No message with this id exists.
    #[error("message not found: {0}")]
    NotFound(MessageId),

    /// A stored value could not be decoded.
    #[error("invalid stored data: {0}")]
    InvalidData(String),

    /// The connection mutex was poisoned.
    #[error("lock poisoned: {0}")]
    Lock(String),
}

/// UI colour scheme preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Always light.
    Light,
    /// Always dark.
    Dark,
    /// Follow the operating system.
    #[default]
    System,
}

impl Theme {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        }
    }

    /// Parse a theme name. Unknown names map to `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language value meaning "use the system language".
pub const AUTO_LANGUAGE: &str = "auto";

/// User settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Two-letter language code, or [`AUTO_LANGUAGE`].
    pub language: String,
    /// Colour scheme.
    pub theme: Theme,
    /// Instruction applied to every generation.
    pub system_prompt: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: AUTO_LANGUAGE.to_owned(),
            theme: Theme::System,
            system_prompt: "You are a friendly, helpful AI companion.".to_owned(),
        }
    }
}

/// Async storage backend for messages and settings.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// All messages of a conversation in insertion order.
    async fn get_messages(&self, conversation_id: ConversationId)
    -> Result<Vec<Message>, StoreError>;

    /// Persist a message and return it with its assigned id.
    async fn add_message(&self, message: Message) -> Result<Message, StoreError>;

    /// Replace the content of an existing message.
    ///
    /// Returns `NotFound` if no message has this id.
    async fn update_message(&self, id: MessageId, content: &str) -> Result<(), StoreError>;

    /// Delete every message of one conversation.
    async fn clear_conversation_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<(), StoreError>;

    /// Delete every message of every conversation.
    async fn clear_all_messages(&self) -> Result<(), StoreError>;

    /// Current settings, or defaults if none were saved.
    async fn get_settings(&self) -> Result<Settings, StoreError>;

    /// Overwrite the saved settings.
    async fn update_settings(&self, settings: &Settings) -> Result<(), StoreError>;

    /// Structured dump of one conversation.
    async fn export_conversation_json(
        &self,
        conversation_id: ConversationId,
    ) -> Result<ConversationExport, StoreError> {
        let messages = self.get_messages(conversation_id).await?;
        Ok(ConversationExport::from_messages(conversation_id, &messages))
    }

    /// Append the messages of an export to `conversation_id`, preserving
    /// role, content and order. Returns the persisted messages.
    async fn import_conversation_json(
        &self,
        conversation_id: ConversationId,
        export: &ConversationExport,
    ) -> Result<Vec<Message>, StoreError> {
        let mut saved = Vec::with_capacity(export.messages.len());
        for message in export.to_messages(conversation_id) {
            saved.push(self.add_message(message).await?);
        }
        Ok(saved)
    }
}
