use axum::Json;
use tracing::info;
use uuid::Uuid;

use crate::error::{RelayError, Result};
use crate::models::{Identity, SessionRequest};

/// POST /session
///
/// Issues a fresh connection id for `username`. The relay never checks it;
/// clients pass it back as `userID` when opening `/ws`.
pub async fn create_session(Json(request): Json<SessionRequest>) -> Result<Json<Identity>> {
    let username = request.username.trim();
    if username.is_empty() {
        return Err(RelayError::BadRequest("Invalid username".to_string()));
    }

    let identity = Identity::new(username, Uuid::new_v4().to_string());
    info!(
        "[Session] Issued {} for {}",
        identity.connection_id, identity.username
    );

    Ok(Json(identity))
}
