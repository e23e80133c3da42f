//! SQLite storage
//!
//! Messages are rows ordered by an autoincrement id, so history comes back in
//! append order regardless of the client-supplied `time` strings. A file that
//! SQLite refuses to read is deleted and recreated with an empty schema.
//!
//! Only errors SQLite reports against the file itself (corrupt, not a database,
//! cannot open, I/O) count as unusable. Pool timeouts and lock contention surface
//! as [`StoreError::Backend`] and leave the data alone.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{MessageStore, StoreError, StoreResult};
use crate::conversation::ConversationKey;
use crate::models::Message;

const CREATE_CONVERSATIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS conversations (
        key TEXT PRIMARY KEY,
        created_at TEXT NOT NULL
    )
"#;

const CREATE_MESSAGES: &str = r#"
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        key TEXT NOT NULL REFERENCES conversations(key),
        sender TEXT NOT NULL,
        body TEXT NOT NULL,
        time TEXT NOT NULL
    )
"#;

const CREATE_MESSAGES_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_messages_key ON messages (key, id)";

pub struct SqliteStore {
    path: PathBuf,
    pool: RwLock<SqlitePool>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`. An unreadable file is replaced.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = match connect(&path).await {
            Ok(pool) => pool,
            Err(StoreError::Unavailable(reason)) => {
                warn!("[SqliteStore] {:?} unusable ({}), recreating", path, reason);
                remove_database_files(&path).await?;
                connect(&path).await?
            }
            Err(e) => return Err(e),
        };

        info!("[SqliteStore] Using {:?}", path);

        Ok(Self {
            path,
            pool: RwLock::new(pool),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_conversation(
        conn: &mut sqlx::SqliteConnection,
        key: &ConversationKey,
    ) -> StoreResult<()> {
        sqlx::query("INSERT OR IGNORE INTO conversations (key, created_at) VALUES (?, ?)")
            .bind(key.as_str())
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn load_messages(
        conn: &mut sqlx::SqliteConnection,
        key: &ConversationKey,
    ) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query("SELECT sender, body, time FROM messages WHERE key = ? ORDER BY id")
            .bind(key.as_str())
            .fetch_all(&mut *conn)
            .await?;

        rows.into_iter()
            .map(|row| -> StoreResult<Message> {
                Ok(Message {
                    from: row.try_get("sender")?,
                    message: row.try_get("body")?,
                    time: row.try_get("time")?,
                })
            })
            .collect()
    }
}

async fn connect(path: &Path) -> StoreResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    for statement in [CREATE_CONVERSATIONS, CREATE_MESSAGES, CREATE_MESSAGES_INDEX] {
        if let Err(e) = sqlx::query(statement).execute(&pool).await {
            pool.close().await;
            return Err(e.into());
        }
    }

    Ok(pool)
}

async fn is_readable(pool: &SqlitePool) -> bool {
    sqlx::query("SELECT COUNT(*) FROM conversations")
        .fetch_one(pool)
        .await
        .is_ok()
}

async fn remove_database_files(path: &Path) -> StoreResult<()> {
    let mut candidates = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        candidates.push(PathBuf::from(name));
    }

    for candidate in candidates {
        match tokio::fs::remove_file(&candidate).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[async_trait]
impl MessageStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn try_append(&self, key: &ConversationKey, message: &Message) -> StoreResult<()> {
        let pool = self.pool.read().await;
        let mut tx = pool.begin().await?;

        Self::ensure_conversation(&mut *tx, key).await?;
        sqlx::query("INSERT INTO messages (key, sender, body, time) VALUES (?, ?, ?, ?)")
            .bind(key.as_str())
            .bind(&message.from)
            .bind(&message.message)
            .bind(&message.time)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn try_query(&self, key: &ConversationKey) -> StoreResult<Option<Vec<Message>>> {
        let pool = self.pool.read().await;
        let mut conn = pool.acquire().await?;

        let exists = sqlx::query("SELECT 1 FROM conversations WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(&mut *conn)
            .await?
            .is_some();
        if !exists {
            return Ok(None);
        }

        Self::load_messages(&mut *conn, key).await.map(Some)
    }

    async fn try_get_or_create(&self, key: &ConversationKey) -> StoreResult<Vec<Message>> {
        let pool = self.pool.read().await;
        let mut tx = pool.begin().await?;

        Self::ensure_conversation(&mut *tx, key).await?;
        let messages = Self::load_messages(&mut *tx, key).await?;

        tx.commit().await?;
        Ok(messages)
    }

    async fn reinitialize(&self) -> StoreResult<()> {
        let mut pool = self.pool.write().await;
        if is_readable(&pool).await {
            debug!("[SqliteStore] {:?} reads back fine, keeping it", self.path);
            return Ok(());
        }
        pool.close().await;

        remove_database_files(&self.path).await?;
        *pool = connect(&self.path).await?;

        info!("[SqliteStore] Reinitialized {:?}", self.path);
        Ok(())
    }
}
