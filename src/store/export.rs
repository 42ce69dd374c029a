//! JSON export and import of a single conversation.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CompanionError, Result};
use crate::message::{ConversationId, Message, MessageId, Role};

/// Current export document version.
pub const EXPORT_FORMAT_VERSION: u32 = 1;

/// One message in an export document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedMessage {
    /// Id in the exporting store.
    pub id: Option<MessageId>,
    /// Who sent it.
    pub role: Role,
    /// Text.
    pub content: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Structured dump of one conversation's messages, in original order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationExport {
    /// Document format version.
    pub format_version: u32,
    /// Conversation the messages came from.
    pub conversation_id: ConversationId,
    /// When the export was taken.
    pub exported_at: DateTime<Utc>,
    /// Messages in insertion order.
    pub messages: Vec<ExportedMessage>,
}

impl ConversationExport {
    /// Build an export from a conversation's messages.
    pub fn from_messages(conversation_id: ConversationId, messages: &[Message]) -> Self {
        Self {
            format_version: EXPORT_FORMAT_VERSION,
            conversation_id,
            exported_at: Utc::now(),
            messages: messages
                .iter()
                .map(|m| ExportedMessage {
                    id: m.id,
                    role: m.role,
                    content: m.content.clone(),
                    created_at: m.created_at,
                })
                .collect(),
        }
    }

    /// Unsaved messages for `conversation_id`, in export order.
    pub fn to_messages(&self, conversation_id: ConversationId) -> Vec<Message> {
        self.messages
            .iter()
            .map(|m| Message {
                id: None,
                conversation_id,
                role: m.role,
                content: m.content.clone(),
                created_at: m.created_at,
            })
            .collect()
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::Export`] if serialization fails.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CompanionError::Export(e.to_string()))
    }

    /// Parse a JSON export, rejecting newer format versions.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::Export`] on malformed JSON or an unsupported version.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc: Self =
            serde_json::from_str(json).map_err(|e| CompanionError::Export(e.to_string()))?;
        if doc.format_version > EXPORT_FORMAT_VERSION {
            return Err(CompanionError::Export(format!(
                "unsupported export format version {} (max {EXPORT_FORMAT_VERSION})",
                doc.format_version
            )));
        }
        Ok(doc)
    }
}

/// Write an export to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized or written.
pub fn write_export(export: &ConversationExport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, export.to_json_string()?)?;
    Ok(())
}

/// Read an export previously written by [`write_export`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_export(path: &Path) -> Result<ConversationExport> {
    let json = std::fs::read_to_string(path)?;
    ConversationExport::from_json_str(&json)
}
