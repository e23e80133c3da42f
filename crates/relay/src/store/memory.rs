//! In-process store. Nothing survives a restart.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{MessageStore, StoreResult};
use crate::conversation::ConversationKey;
use crate::models::Message;

#[derive(Default)]
pub struct MemoryStore {
    conversations: RwLock<HashMap<ConversationKey, Vec<Message>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of materialized conversations.
    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn try_append(&self, key: &ConversationKey, message: &Message) -> StoreResult<()> {
        self.conversations
            .write()
            .await
            .entry(key.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn try_query(&self, key: &ConversationKey) -> StoreResult<Option<Vec<Message>>> {
        Ok(self.conversations.read().await.get(key).cloned())
    }

    async fn try_get_or_create(&self, key: &ConversationKey) -> StoreResult<Vec<Message>> {
        Ok(self
            .conversations
            .write()
            .await
            .entry(key.clone())
            .or_default()
            .clone())
    }

    /// The map never becomes unreadable, so there is nothing to reset.
    async fn reinitialize(&self) -> StoreResult<()> {
        Ok(())
    }
}
