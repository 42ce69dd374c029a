//! In-process message store.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{MessageStore, Settings, StoreError};
use crate::message::{ConversationId, Message, MessageId};

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<Message>,
    last_id: MessageId,
    settings: Settings,
}

/// Message store backed by process memory.
///
/// Cloning shares the same data. Contents are lost when the last clone drops.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Create an empty store with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn get_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .read()?
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn add_message(&self, message: Message) -> Result<Message, StoreError> {
        let mut inner = self.write()?;
        inner.last_id += 1;
        let saved = message.with_id(inner.last_id);
        inner.messages.push(saved.clone());
        Ok(saved)
    }

    async fn update_message(&self, id: MessageId, content: &str) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let msg = inner
            .messages
            .iter_mut()
            .find(|m| m.id == Some(id))
            .ok_or(StoreError::NotFound(id))?;
        msg.content = content.to_owned();
        Ok(())
    }

    async fn clear_conversation_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<(), StoreError> {
        self.write()?
            .messages
            .retain(|m| m.conversation_id != conversation_id);
        Ok(())
    }

    async fn clear_all_messages(&self) -> Result<(), StoreError> {
        self.write()?.messages.clear();
        Ok(())
    }

    async fn get_settings(&self) -> Result<Settings, StoreError> {
        Ok(self.read()?.settings.clone())
    }

    async fn update_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        self.write()?.settings = settings.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::message::Role;

    #[tokio::test]
    async fn ids_are_unique_and_order_is_kept() {
        let store = MemoryStore::new();
        let a = store.add_message(Message::user(1, "a")).await.unwrap();
        store.add_message(Message::user(2, "other")).await.unwrap();
        let c = store.add_message(Message::assistant(1, "c")).await.unwrap();
        assert_ne!(a.id, c.id);

        let conv = store.get_messages(1).await.unwrap();
        assert_eq!(conv, vec![a, c]);
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_clear() {
        let store = MemoryStore::new();
        let a = store.add_message(Message::user(1, "a")).await.unwrap();
        store.clear_all_messages().await.unwrap();
        let b = store.add_message(Message::user(1, "b")).await.unwrap();
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.update_message(5, "x").await,
            Err(StoreError::NotFound(5))
        ));
    }

    #[tokio::test]
    async fn clones_share_data() {
        let store = MemoryStore::new();
        let clone = store.clone();
        clone.add_message(Message::system(1, "s")).await.unwrap();
        let msgs = store.get_messages(1).await.unwrap();
        assert_eq!(msgs[0].role, Role::System);
    }

    #[tokio::test]
    async fn export_then_import_preserves_role_content_order() {
        let store = MemoryStore::new();
        store.add_message(Message::user(1, "q1")).await.unwrap();
        store.add_message(Message::assistant(1, "a1")).await.unwrap();
        store.add_message(Message::user(1, "q2")).await.unwrap();

        let doc = store.export_conversation_json(1).await.unwrap();
        assert_eq!(doc.messages.len(), 3);

        let imported = store.import_conversation_json(4, &doc).await.unwrap();
        let original = store.get_messages(1).await.unwrap();
        let copy = store.get_messages(4).await.unwrap();
        assert_eq!(imported, copy);
        let shape = |ms: &[Message]| {
            ms.iter()
                .map(|m| (m.role, m.content.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(shape(&original), shape(&copy));
    }
}
