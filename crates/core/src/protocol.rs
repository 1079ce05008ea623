//! Wire types for the credential endpoint, the signaling endpoint and the
//! control channel.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::VoiceOption;

/// Lifetime assumed when the credential endpoint omits `expiresAt`
pub const IMPLICIT_CREDENTIAL_TTL_SECS: i64 = 60;

/// Body of `POST {credential endpoint}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest {
    pub voice_id: String,
    pub model_id: String,
}

/// Response of the credential endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialResponse {
    pub token: String,
    #[serde(default)]
    pub available_voices: Vec<VoiceOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Short-lived credential scoped to one signaling exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl SessionCredential {
    /// Build from an endpoint response, applying the implicit lifetime when
    /// the endpoint does not state one.
    pub fn from_response(response: CredentialResponse, now: DateTime<Utc>) -> Self {
        Self {
            token: response.token,
            expires_at: response
                .expires_at
                .unwrap_or_else(|| now + Duration::seconds(IMPLICIT_CREDENTIAL_TTL_SECS)),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Body of `POST {signaling endpoint}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalingRequest {
    pub credential_token: String,
    pub local_description_sdp: String,
    pub model_id: String,
}

/// Response of the signaling endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalingResponse {
    pub remote_description_sdp: String,
}

/// Payload of an outgoing `configure` message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureData {
    pub voice_id: String,
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_context: Option<String>,
}

/// Outgoing control channel message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ControlMessage {
    Configure(ConfigureData),
}

impl ControlMessage {
    /// Configuration messages are the only ones held back while the channel
    /// is still opening.
    pub fn is_configuration(&self) -> bool {
        matches!(self, ControlMessage::Configure(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Configure(_) => "configure",
        }
    }
}

/// Incoming control channel envelope, before classification
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl InboundEnvelope {
    /// Payload as text; non-string payloads are rendered as compact JSON
    pub fn data_text(&self) -> String {
        match &self.data {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}
