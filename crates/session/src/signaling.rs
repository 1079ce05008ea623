//! Signaling client

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use receptionist_config::SessionConfig;
use receptionist_core::{
    Result, SessionCredential, SessionError, SignalingRequest, SignalingResponse,
};

/// Exchanges the local offer for the remote answer
#[async_trait]
pub trait SignalingClient: Send + Sync + 'static {
    /// # Returns
    /// The remote description SDP
    async fn exchange(
        &self,
        credential: &SessionCredential,
        local_sdp: &str,
        model_id: &str,
    ) -> Result<String>;
}

/// Signaling over `POST {signaling endpoint}`
pub struct HttpSignalingClient {
    client: Client,
    endpoint: String,
}

impl HttpSignalingClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Signaling {
                status: None,
                body: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_settings(session: &SessionConfig) -> Result<Self> {
        Self::new(
            session.signaling_endpoint.clone(),
            Duration::from_millis(session.request_timeout_ms),
        )
    }
}

#[async_trait]
impl SignalingClient for HttpSignalingClient {
    async fn exchange(
        &self,
        credential: &SessionCredential,
        local_sdp: &str,
        model_id: &str,
    ) -> Result<String> {
        let request = SignalingRequest {
            credential_token: credential.token.clone(),
            local_description_sdp: local_sdp.to_string(),
            model_id: model_id.to_string(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| SessionError::Signaling {
                status: None,
                body: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Signaling exchange rejected");
            return Err(SessionError::Signaling {
                status: Some(status.as_u16()),
                body,
            });
        }

        let parsed: SignalingResponse =
            serde_json::from_str(&body).map_err(|_| SessionError::Signaling {
                status: Some(status.as_u16()),
                body: body.clone(),
            })?;

        if parsed.remote_description_sdp.trim().is_empty() {
            return Err(SessionError::Signaling {
                status: Some(status.as_u16()),
                body,
            });
        }

        Ok(parsed.remote_description_sdp)
    }
}
