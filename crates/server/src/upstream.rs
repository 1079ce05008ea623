//! Realtime provider client
//!
//! Two calls: mint an ephemeral session key with the long-lived API key,
//! and post an SDP offer with that ephemeral key.

use chrono::{DateTime, TimeZone, Utc};
use reqwest::{header, Client};
use serde::Deserialize;
use std::time::{Duration, Instant};

use receptionist_config::constants::endpoints::{UPSTREAM_REALTIME_PATH, UPSTREAM_SESSIONS_PATH};
use receptionist_config::UpstreamConfig;

use crate::metrics::record_upstream_call;
use crate::ServerError;

/// Ephemeral session minted by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamSession {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct SessionsResponse {
    client_secret: ClientSecret,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
    /// Unix seconds
    #[serde(default)]
    expires_at: Option<i64>,
}

pub struct UpstreamClient {
    client: Client,
}

impl UpstreamClient {
    pub fn new(timeout: Duration) -> Result<Self, ServerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServerError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn from_settings(config: &UpstreamConfig) -> Result<Self, ServerError> {
        Self::new(Duration::from_millis(config.request_timeout_ms))
    }

    /// `POST {base}/v1/realtime/sessions` with `{ model, voice }`
    pub async fn create_session(
        &self,
        config: &UpstreamConfig,
        model: &str,
        voice: &str,
    ) -> Result<UpstreamSession, ServerError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ServerError::Config("upstream API key is not set".to_string()))?;

        let url = format!(
            "{}{}",
            config.base_url.trim_end_matches('/'),
            UPSTREAM_SESSIONS_PATH
        );
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&serde_json::json!({ "model": model, "voice": voice }))
            .send()
            .await
            .map_err(|e| {
                record_upstream_call("credential", None, started.elapsed());
                ServerError::from(e)
            })?;

        let status = response.status();
        record_upstream_call("credential", Some(status.as_u16()), started.elapsed());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Upstream rejected session request");
            return Err(ServerError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SessionsResponse = response
            .json()
            .await
            .map_err(|e| ServerError::UpstreamUnavailable(format!("Invalid session response: {}", e)))?;

        Ok(UpstreamSession {
            token: parsed.client_secret.value,
            expires_at: parsed
                .client_secret
                .expires_at
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        })
    }

    /// `POST {base}/v1/realtime?model=..` with the offer as `application/sdp`.
    /// The model id is query-encoded.
    pub async fn exchange_sdp(
        &self,
        config: &UpstreamConfig,
        token: &str,
        model: &str,
        offer_sdp: &str,
    ) -> Result<String, ServerError> {
        let url = format!(
            "{}{}",
            config.base_url.trim_end_matches('/'),
            UPSTREAM_REALTIME_PATH
        );
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .query(&[("model", model)])
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, "application/sdp")
            .body(offer_sdp.to_string())
            .send()
            .await
            .map_err(|e| {
                record_upstream_call("signal", None, started.elapsed());
                ServerError::from(e)
            })?;

        let status = response.status();
        record_upstream_call("signal", Some(status.as_u16()), started.elapsed());
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Upstream rejected SDP offer");
            return Err(ServerError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}
