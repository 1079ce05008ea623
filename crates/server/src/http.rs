//! HTTP Endpoints
//!
//! Credential minting and signaling relay for voice sessions.

use axum::{
    extract::{Json, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use receptionist_core::{
    CredentialRequest, CredentialResponse, SignalingRequest, SignalingResponse, Voice,
};

use crate::auth::require_client_key;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::ServerError;

const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

pub fn create_router(state: AppState) -> Router {
    let config = state.config.read();
    let cors_layer = build_cors_layer(&config.server.cors_origins, config.server.cors_enabled);
    let timeout = Duration::from_secs(config.server.timeout_seconds);
    if !config.server.auth.enabled {
        tracing::warn!(
            "Relay auth is disabled; anyone who can reach this server can mint credentials. \
             Set RECEPTIONIST__SERVER__AUTH__ENABLED=true outside development."
        );
    }
    drop(config);

    Router::new()
        .route("/api/agent/credential", post(create_credential))
        .route("/api/agent/signal", post(relay_signal))
        .route("/api/agent/voices", get(list_voices))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/admin/reload-config", post(reload_config))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_client_key,
        ))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// CORS from configured origins
///
/// - disabled: permissive (development only)
/// - no valid origins: localhost:3000
pub fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let mut parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::info!("No valid CORS origins configured, defaulting to {}", DEFAULT_CORS_ORIGIN);
        parsed_origins.push(HeaderValue::from_static(DEFAULT_CORS_ORIGIN));
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Mint an ephemeral credential for one session
async fn create_credential(
    State(state): State<AppState>,
    Json(request): Json<CredentialRequest>,
) -> Result<Json<CredentialResponse>, ServerError> {
    let voice: Voice = request
        .voice_id
        .parse()
        .map_err(|e: receptionist_core::SessionError| ServerError::InvalidRequest(e.to_string()))?;

    let upstream_config = state.get_config().upstream.clone();
    let model = if request.model_id.trim().is_empty() {
        upstream_config.default_model.clone()
    } else {
        request.model_id.clone()
    };

    let session = state
        .upstream
        .create_session(&upstream_config, &model, voice.id())
        .await?;

    let expires_at = session.expires_at.unwrap_or_else(|| {
        Utc::now() + ChronoDuration::seconds(upstream_config.credential_ttl_secs as i64)
    });

    tracing::info!(voice = %voice, model = %model, %expires_at, "Issued session credential");

    Ok(Json(CredentialResponse {
        token: session.token,
        available_voices: Voice::catalogue(),
        expires_at: Some(expires_at),
    }))
}

/// Relay an SDP offer to the provider and return its answer
async fn relay_signal(
    State(state): State<AppState>,
    Json(request): Json<SignalingRequest>,
) -> Result<Json<SignalingResponse>, ServerError> {
    if request.local_description_sdp.trim().is_empty() {
        return Err(ServerError::InvalidRequest(
            "localDescriptionSdp is empty".to_string(),
        ));
    }
    if request.credential_token.trim().is_empty() {
        return Err(ServerError::InvalidRequest(
            "credentialToken is empty".to_string(),
        ));
    }

    let upstream_config = state.get_config().upstream.clone();
    let model = if request.model_id.trim().is_empty() {
        upstream_config.default_model.clone()
    } else {
        request.model_id.clone()
    };

    let answer = state
        .upstream
        .exchange_sdp(
            &upstream_config,
            &request.credential_token,
            &model,
            &request.local_description_sdp,
        )
        .await?;

    tracing::debug!(model = %model, answer_len = answer.len(), "Relayed SDP answer");

    Ok(Json(SignalingResponse {
        remote_description_sdp: answer,
    }))
}

async fn list_voices() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "voices": Voice::catalogue() }))
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let config = state.get_config();
    let key_configured = config
        .upstream
        .api_key
        .as_deref()
        .is_some_and(|k| !k.is_empty());

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "environment": config.environment,
            "upstream_key_configured": key_configured,
        })),
    )
}

async fn reload_config(State(state): State<AppState>) -> impl IntoResponse {
    match state.reload_config() {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "reloaded" })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Config reload failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e })),
            )
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use receptionist_config::Settings;

    #[test]
    fn test_router_creation() {
        let state = AppState::new(Settings::default()).unwrap();
        let _ = create_router(state);
    }

    #[test]
    fn test_cors_layer_with_invalid_origins() {
        let _ = build_cors_layer(&["not a header\n".to_string()], true);
        let _ = build_cors_layer(&[], false);
    }
}
