//! Relay server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::relay::Relay;
use crate::store::{JsonFileStore, MemoryStore, MessageStore, SqliteStore};

/// Which [`MessageStore`] backend to run with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Json,
    Sqlite,
    Memory,
}

impl StoreBackend {
    fn default_data_path(self) -> PathBuf {
        match self {
            StoreBackend::Json => PathBuf::from("data.json"),
            StoreBackend::Sqlite => PathBuf::from("relay.sqlite"),
            StoreBackend::Memory => PathBuf::new(),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(StoreBackend::Json),
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend `{}`", other)),
        }
    }
}

/// Configuration for the relay server
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Address the HTTP/WebSocket listener binds to
    pub bind_addr: SocketAddr,
    /// Message store backend
    pub store: StoreBackend,
    /// Backing file for the json and sqlite stores
    pub data_path: PathBuf,
    /// Directory served as static assets
    pub public_dir: PathBuf,
    /// Outbound events buffered per connection before pushes are dropped
    pub outbox_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            store: StoreBackend::Json,
            data_path: StoreBackend::Json.default_data_path(),
            public_dir: PathBuf::from("public"),
            outbox_capacity: 64,
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by `RELAY_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("RELAY_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|e| anyhow::anyhow!("RELAY_ADDR `{}`: {}", addr, e))?;
        }
        if let Ok(store) = std::env::var("RELAY_STORE") {
            config.store = store.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            config.data_path = config.store.default_data_path();
        }
        if let Ok(path) = std::env::var("RELAY_DATA") {
            config.data_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("RELAY_PUBLIC_DIR") {
            config.public_dir = PathBuf::from(dir);
        }
        config.outbox_capacity = std::env::var("RELAY_OUTBOX_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(config.outbox_capacity);

        Ok(config)
    }

    /// Open the configured store backend.
    pub async fn open_store(&self) -> anyhow::Result<Arc<dyn MessageStore>> {
        let store: Arc<dyn MessageStore> = match self.store {
            StoreBackend::Json => Arc::new(JsonFileStore::open(&self.data_path).await?),
            StoreBackend::Sqlite => Arc::new(SqliteStore::open(&self.data_path).await?),
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };
        Ok(store)
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: RelayConfig,
    pub relay: Arc<Relay>,
}

impl AppState {
    pub fn new(config: RelayConfig, relay: Arc<Relay>) -> Self {
        Self { config, relay }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("json".parse::<StoreBackend>(), Ok(StoreBackend::Json));
        assert_eq!(" SQLite ".parse::<StoreBackend>(), Ok(StoreBackend::Sqlite));
        assert_eq!("memory".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert!("mongo".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_defaults_match_legacy_layout() {
        let config = RelayConfig::default();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.data_path, PathBuf::from("data.json"));
        assert_eq!(config.public_dir, PathBuf::from("public"));
    }

    #[tokio::test]
    async fn test_open_store_uses_data_path() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = RelayConfig {
            store: StoreBackend::Sqlite,
            data_path: temp_dir.path().join("relay.sqlite"),
            ..RelayConfig::default()
        };

        let store = config.open_store().await.unwrap();
        assert_eq!(store.backend(), "sqlite");
        assert!(config.data_path.exists());
    }
}
