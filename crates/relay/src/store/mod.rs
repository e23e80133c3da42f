//! Message storage
//!
//! Conversations are append-only message logs keyed by [`ConversationKey`].
//! Backends implement the `try_*` primitives; the public operations wrap them with
//! a single self-heal: when the backing medium turns out to be unreadable or
//! unwritable the store is reinitialized to an empty valid state and the operation
//! is retried once against it. Reinitialize re-checks the medium under the
//! backend's own lock, so concurrent healers reset it at most once and never wipe
//! writes that a sibling already completed. Transient faults ([`StoreError::Backend`])
//! are returned as is.

pub mod json_store;
pub mod memory;
pub mod sqlite_store;

pub use json_store::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite_store::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::conversation::ConversationKey;
use crate::models::Message;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// The backing medium could not be read or written.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the operation but the medium is intact (pool
    /// exhausted or closed, lock contention). Never triggers a reset.
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Unavailable(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Unavailable(format!("JSON error: {}", err))
    }
}

// SQLite primary result codes that mean the file itself is unusable.
const SQLITE_IOERR: i32 = 10;
const SQLITE_CORRUPT: i32 = 11;
const SQLITE_CANTOPEN: i32 = 14;
const SQLITE_NOTADB: i32 = 26;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let unusable = match &err {
            sqlx::Error::Io(_) => true,
            sqlx::Error::Database(db) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| {
                    matches!(
                        code & 0xff,
                        SQLITE_IOERR | SQLITE_CORRUPT | SQLITE_CANTOPEN | SQLITE_NOTADB
                    )
                })
                .unwrap_or(false),
            _ => false,
        };

        if unusable {
            StoreError::Unavailable(format!("Database error: {}", err))
        } else {
            StoreError::Backend(format!("Database error: {}", err))
        }
    }
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    async fn try_append(&self, key: &ConversationKey, message: &Message) -> StoreResult<()>;

    async fn try_query(&self, key: &ConversationKey) -> StoreResult<Option<Vec<Message>>>;

    async fn try_get_or_create(&self, key: &ConversationKey) -> StoreResult<Vec<Message>>;

    /// Reset the backing medium to an empty valid state if it is still unusable.
    /// Leaves it untouched when it reads back fine, e.g. because a concurrent
    /// caller already reinitialized it.
    async fn reinitialize(&self) -> StoreResult<()>;

    /// Append `message` to the conversation, creating it if absent.
    /// Persisted before this returns.
    async fn append(&self, key: &ConversationKey, message: Message) -> StoreResult<()> {
        match self.try_append(key, &message).await {
            Err(StoreError::Unavailable(reason)) => {
                self.heal(key, &reason).await?;
                self.try_append(key, &message).await
            }
            other => other,
        }
    }

    /// Full ordered history, or `None` if the conversation was never touched.
    async fn query(&self, key: &ConversationKey) -> StoreResult<Option<Vec<Message>>> {
        match self.try_query(key).await {
            Err(StoreError::Unavailable(reason)) => {
                self.heal(key, &reason).await?;
                self.try_query(key).await
            }
            other => other,
        }
    }

    /// Full ordered history, materializing an empty conversation if absent.
    async fn get_or_create(&self, key: &ConversationKey) -> StoreResult<Vec<Message>> {
        match self.try_get_or_create(key).await {
            Err(StoreError::Unavailable(reason)) => {
                self.heal(key, &reason).await?;
                self.try_get_or_create(key).await
            }
            other => other,
        }
    }

    async fn heal(&self, key: &ConversationKey, reason: &str) -> StoreResult<()> {
        warn!(
            backend = self.backend(),
            key = %key,
            "[Store] Backing medium unusable ({}), reinitializing",
            reason
        );
        self.reinitialize().await
    }
}
