//! SQLite-backed message store.
//!
//! A single database file (`companion.db` by default) holds messages and
//! settings. Thread-safe via an internal `Mutex<Connection>`; each async
//! call locks, runs its statements and releases before returning.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use super::schema::{apply_schema, read_schema_version};
use super::{MessageStore, Settings, StoreError, Theme};
use crate::message::{ConversationId, Message, MessageId, Role};

/// SQLite message and settings store.
pub struct SqliteStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        info!(path = %path.display(), "message store opened");
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot create the database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
        })
    }

    /// Database file, or `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Schema version stamped in the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be read.
    pub fn schema_version(&self) -> Result<Option<u32>, StoreError> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }
}

fn conversion_error(col: usize, detail: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        col,
        Type::Text,
        Box::new(StoreError::InvalidData(detail)),
    )
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let role: String = row.get(2)?;
    let role = Role::parse(&role).ok_or_else(|| conversion_error(2, format!("role {role:?}")))?;
    let millis: i64 = row.get(4)?;
    Ok(Message {
        id: Some(row.get(0)?),
        conversation_id: row.get(1)?,
        role,
        content: row.get(3)?,
        created_at: DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default(),
    })
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn get_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, content, created_at
             FROM messages WHERE conversation_id = ?1 ORDER BY id",
        )?;
        let messages = stmt
            .query_map(params![conversation_id], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    async fn add_message(&self, message: Message) -> Result<Message, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (conversation_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                message.conversation_id,
                message.role.as_str(),
                message.content,
                message.created_at.timestamp_millis(),
            ],
        )?;
        let id: MessageId = conn.last_insert_rowid();
        debug!(
            id,
            conversation_id = message.conversation_id,
            role = %message.role,
            "message stored"
        );
        Ok(message.with_id(id))
    }

    async fn update_message(&self, id: MessageId, content: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE messages SET content = ?1 WHERE id = ?2",
            params![content, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn clear_conversation_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        info!(conversation_id, removed, "conversation cleared");
        Ok(())
    }

    async fn clear_all_messages(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM messages", [])?;
        info!(removed, "all messages cleared");
        Ok(())
    }

    async fn get_settings(&self) -> Result<Settings, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT language, theme, system_prompt FROM settings WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((language, theme, system_prompt)) = row else {
            return Ok(Settings::default());
        };
        let theme = Theme::parse(&theme)
            .ok_or_else(|| StoreError::InvalidData(format!("theme {theme:?}")))?;
        Ok(Settings {
            language,
            theme,
            system_prompt,
        })
    }

    async fn update_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (id, language, theme, system_prompt) VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                 language = excluded.language,
                 theme = excluded.theme,
                 system_prompt = excluded.system_prompt",
            params![
                settings.language,
                settings.theme.as_str(),
                settings.system_prompt
            ],
        )?;
        Ok(())
    }
}
