//! Direct-Message Relay Server Library
//!
//! Clients connect over a WebSocket, announce a username, exchange direct messages
//! routed by connection id, and fetch the stored history of a conversation.

pub mod config;
pub mod connection;
pub mod conversation;
pub mod error;
pub mod handlers;
pub mod models;
pub mod presence;
pub mod relay;
pub mod store;

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{AppState, RelayConfig};
use relay::Relay;

pub use connection::{ConnectionHandler, ConnectionState};
pub use conversation::ConversationKey;
pub use error::{RelayError, Result};
pub use relay::Delivery;
pub use store::{MessageStore, StoreError};

/// Build the HTTP application for an already constructed relay.
pub fn app(state: AppState) -> axum::Router {
    handlers::router(state)
}

pub async fn run() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("relay=info,tower_http=info"));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        // Already set, ignore
    }

    let config = RelayConfig::from_env()?;

    info!("=== Relay Server ===");
    info!("Store: {:?} ({:?})", config.store, config.data_path);
    info!("Static assets: {:?}", config.public_dir);

    let store = config.open_store().await?;
    let relay = Arc::new(Relay::new(store));
    let state = AppState::new(config.clone(), relay);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Relay listening on {}", listener.local_addr()?);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
