//! JSON file storage
//!
//! All conversations live in one pretty-printed document:
//!
//! ```text
//! {
//!   "messages": [
//!     { "userToken": "a1_b1", "messages": [ { "from": "a1", "message": "hi", "time": "T1" } ] }
//!   ]
//! }
//! ```
//!
//! Every operation re-reads the file under a single mutex, so there is no cache to
//! drift from disk. Writes go to a temp file first and are renamed into place.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{MessageStore, StoreResult};
use crate::conversation::ConversationKey;
use crate::models::Message;

/// One conversation as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(rename = "userToken")]
    pub key: ConversationKey,
    pub messages: Vec<Message>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    messages: Vec<ConversationRecord>,
}

impl StoreDocument {
    fn find(&self, key: &ConversationKey) -> Option<&ConversationRecord> {
        self.messages.iter().find(|record| &record.key == key)
    }

    fn find_or_insert(&mut self, key: &ConversationKey) -> (&mut ConversationRecord, bool) {
        match self.messages.iter().position(|record| &record.key == key) {
            Some(idx) => (&mut self.messages[idx], false),
            None => {
                self.messages.push(ConversationRecord {
                    key: key.clone(),
                    messages: Vec::new(),
                });
                let last = self.messages.len() - 1;
                (&mut self.messages[last], true)
            }
        }
    }
}

pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes every read-modify-write cycle on the file.
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open the store at `path`, creating the parent directory if needed.
    /// A missing file is treated as an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        info!("[JsonStore] Using {:?}", path);

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StoreResult<StoreDocument> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoreDocument::default()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Save the document atomically
    async fn save(&self, document: &StoreDocument) -> StoreResult<()> {
        let temp_path = self.path.with_extension("tmp");
        let json = serde_json::to_string_pretty(document)?;

        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &self.path).await?;

        Ok(())
    }
}

#[async_trait]
impl MessageStore for JsonFileStore {
    fn backend(&self) -> &'static str {
        "json"
    }

    async fn try_append(&self, key: &ConversationKey, message: &Message) -> StoreResult<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;

        let (record, created) = document.find_or_insert(key);
        record.messages.push(message.clone());
        if created {
            debug!("[JsonStore] Created conversation {}", key);
        }

        self.save(&document).await
    }

    async fn try_query(&self, key: &ConversationKey) -> StoreResult<Option<Vec<Message>>> {
        let _guard = self.lock.lock().await;
        let document = self.load().await?;
        Ok(document.find(key).map(|record| record.messages.clone()))
    }

    async fn try_get_or_create(&self, key: &ConversationKey) -> StoreResult<Vec<Message>> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;

        let (record, created) = document.find_or_insert(key);
        let messages = record.messages.clone();
        if created {
            self.save(&document).await?;
            debug!("[JsonStore] Created conversation {}", key);
        }

        Ok(messages)
    }

    async fn reinitialize(&self) -> StoreResult<()> {
        let _guard = self.lock.lock().await;
        if self.load().await.is_ok() {
            debug!("[JsonStore] {:?} parses again, keeping it", self.path);
            return Ok(());
        }
        self.save(&StoreDocument::default()).await?;
        info!("[JsonStore] Reinitialized {:?}", self.path);
        Ok(())
    }
}
