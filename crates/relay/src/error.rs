use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Errors raised by the relay core and its HTTP surface.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    #[error("Connection is not active")]
    NotActive,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = core::result::Result<T, RelayError>;

impl RelayError {
    fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidHandshake(_)
            | RelayError::BadRequest(_)
            | RelayError::MalformedEvent(_) => StatusCode::BAD_REQUEST,
            RelayError::NotActive => StatusCode::CONFLICT,
            RelayError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.to_string()
            }
        }));

        (self.status(), body).into_response()
    }
}
