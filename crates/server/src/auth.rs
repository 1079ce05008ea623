//! Client key for the relay
//!
//! Minting credentials spends the provider key, so the credential and
//! signaling endpoints (and `/admin`) can require `Authorization: Bearer
//! <client key>`. Which paths are guarded comes from `server.auth`.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::AppState;
use crate::ServerError;

/// What a request to a given path needs
#[derive(Debug, PartialEq, Eq)]
enum Requirement {
    None,
    Key(String),
    /// Guarded path but no key configured
    Unconfigured,
}

fn requirement(state: &AppState, path: &str) -> Requirement {
    let config = state.get_config();
    let auth = &config.server.auth;
    if !auth.requires_key(path) {
        return Requirement::None;
    }
    match auth.api_key.as_deref() {
        Some(key) if !key.is_empty() => Requirement::Key(key.to_string()),
        _ => Requirement::Unconfigured,
    }
}

/// Reject relay requests that lack the configured client key
pub async fn require_client_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let expected = match requirement(&state, &path) {
        Requirement::None => return next.run(request).await,
        Requirement::Key(key) => key,
        Requirement::Unconfigured => {
            tracing::error!(path = %path, "Relay auth enabled without server.auth.api_key");
            return ServerError::Config("relay client key is not configured".to_string())
                .into_response();
        },
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(key) if keys_match(key, &expected) => next.run(request).await,
        Some(_) => {
            tracing::warn!(path = %path, "Relay request with wrong client key");
            ServerError::Auth("client key rejected".to_string()).into_response()
        },
        None => ServerError::Auth(format!(
            "{} requires Authorization: Bearer <client key>",
            path
        ))
        .into_response(),
    }
}

/// Compare without short-circuiting on the first differing byte
fn keys_match(provided: &str, expected: &str) -> bool {
    provided.len() == expected.len()
        && provided
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}
