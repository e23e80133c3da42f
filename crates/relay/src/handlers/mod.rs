//! HTTP and WebSocket handlers
//!
//! `/ws` carries the relay protocol; `/session` and static assets are thin shells
//! around it for the browser client.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::AppState;

pub mod session;
pub mod ws;

pub use session::create_session;
pub use ws::ws_handler;

pub fn router(state: AppState) -> Router {
    let assets = ServeDir::new(&state.config.public_dir);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/session", post(create_session))
        .route("/health", get(health_check))
        .fallback_service(assets)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> &'static str {
    "OK - Relay"
}
