//! Receptionist Server
//!
//! Trusted backend for browser and native voice sessions. Holds the
//! long-lived provider key, mints ephemeral credentials and relays the
//! SDP offer/answer exchange.

pub mod auth;
pub mod http;
pub mod metrics;
pub mod state;
pub mod upstream;

pub use auth::require_client_key;
pub use http::create_router;
pub use metrics::{init_metrics, record_upstream_call};
pub use state::AppState;
pub use upstream::{UpstreamClient, UpstreamSession};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    /// Non-2xx from the provider, relayed as-is
    #[error("Upstream returned status {status}")]
    Upstream { status: u16, body: String },

    #[error("Upstream unreachable: {0}")]
    UpstreamUnavailable(String),

    #[error("Server misconfigured: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        err.status_code()
    }
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Auth(_) => StatusCode::UNAUTHORIZED,
            ServerError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            },
            ServerError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ServerError::Config(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

impl From<reqwest::Error> for ServerError {
    fn from(err: reqwest::Error) -> Self {
        ServerError::UpstreamUnavailable(err.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ServerError::Upstream { body, .. } => (status, body).into_response(),
            other => {
                tracing::warn!(status = status.as_u16(), error = %other, "Request failed");
                (status, Json(serde_json::json!({ "error": other.to_string() }))).into_response()
            },
        }
    }
}
