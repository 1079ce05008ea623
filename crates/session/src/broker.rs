//! Credential broker
//!
//! Obtains a short-lived credential from the trusted backend for one
//! negotiation. Stateless per call and never retries.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;

use receptionist_config::SessionConfig;
use receptionist_core::{
    CredentialRequest, CredentialResponse, Result, SessionCredential, SessionError, Voice,
};

/// Source of ephemeral session credentials
#[async_trait]
pub trait CredentialBroker: Send + Sync + 'static {
    /// Fetch a credential for `voice_id` / `model_id`.
    ///
    /// Unknown voices fail with [`SessionError::InvalidVoice`] before any
    /// network call.
    async fn fetch_credential(&self, voice_id: &str, model_id: &str) -> Result<SessionCredential>;
}

/// Broker backed by the credential endpoint
pub struct HttpCredentialBroker {
    client: Client,
    endpoint: String,
}

impl HttpCredentialBroker {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Credential {
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
            session.credential_endpoint.clone(),
            Duration::from_millis(session.request_timeout_ms),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CredentialBroker for HttpCredentialBroker {
    async fn fetch_credential(&self, voice_id: &str, model_id: &str) -> Result<SessionCredential> {
        let voice: Voice = voice_id.parse()?;

        let request = CredentialRequest {
            voice_id: voice.id().to_string(),
            model_id: model_id.to_string(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| SessionError::Credential {
                status: None,
                body: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| SessionError::Credential {
            status: Some(status.as_u16()),
            body: e.to_string(),
        })?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Credential endpoint rejected request");
            return Err(SessionError::Credential {
                status: Some(status.as_u16()),
                body,
            });
        }

        let parsed: CredentialResponse =
            serde_json::from_str(&body).map_err(|_| SessionError::Credential {
                status: Some(status.as_u16()),
                body: body.clone(),
            })?;

        let credential = SessionCredential::from_response(parsed, Utc::now());
        tracing::debug!(
            voice = %voice,
            expires_at = %credential.expires_at,
            "Obtained session credential"
        );

        Ok(credential)
    }
}
