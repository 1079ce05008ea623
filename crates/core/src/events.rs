//! Session events and observable state

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::SessionError;

/// Lifecycle signals carried on the control channel or emitted by the
/// negotiator itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    Connecting,
    Connected,
    Listening,
    Closed,
    /// Peer transport reported a non-fatal disconnect
    TransportDisconnected,
    SessionCreated,
    SessionUpdated,
    SpeechStarted,
    SpeechStopped,
    /// A control message type this client does not understand
    Unknown(String),
}

impl LifecycleKind {
    /// Map a provider message type to a known lifecycle kind
    pub fn from_provider_type(kind: &str) -> Self {
        match kind {
            "session.created" => LifecycleKind::SessionCreated,
            "session.updated" => LifecycleKind::SessionUpdated,
            "input_audio_buffer.speech_started" => LifecycleKind::SpeechStarted,
            "input_audio_buffer.speech_stopped" => LifecycleKind::SpeechStopped,
            other => LifecycleKind::Unknown(other.to_string()),
        }
    }
}

/// Event delivered to session subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    Transcript(String),
    Response(String),
    Error(String),
    LifecycleSignal(LifecycleKind),
}

/// Connection phase of the negotiator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    #[default]
    Idle,
    CredentialPending,
    OfferCreated,
    AwaitingRemoteAnswer,
    Connected,
    Listening,
    Closed,
    Failed,
}

impl ConnectionPhase {
    /// Phases in which a connection attempt is in flight
    pub fn is_negotiating(&self) -> bool {
        matches!(
            self,
            ConnectionPhase::CredentialPending
                | ConnectionPhase::OfferCreated
                | ConnectionPhase::AwaitingRemoteAnswer
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionPhase::Connected | ConnectionPhase::Listening)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionPhase::Closed | ConnectionPhase::Failed)
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionPhase::Idle => "idle",
            ConnectionPhase::CredentialPending => "credential_pending",
            ConnectionPhase::OfferCreated => "offer_created",
            ConnectionPhase::AwaitingRemoteAnswer => "awaiting_remote_answer",
            ConnectionPhase::Connected => "connected",
            ConnectionPhase::Listening => "listening",
            ConnectionPhase::Closed => "closed",
            ConnectionPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Observable view of a session for UI rendering
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub phase: ConnectionPhase,
    pub is_connected: bool,
    pub is_listening: bool,
    pub is_data_channel_ready: bool,
    pub active_voice: String,
    pub last_error: Option<SessionError>,
}

/// The one state a UI should render for a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayState {
    Idle,
    Connecting,
    Connected,
    Listening,
    Error(String),
    Closed,
}

impl SessionSnapshot {
    pub fn display_state(&self) -> DisplayState {
        match self.phase {
            ConnectionPhase::Idle => DisplayState::Idle,
            ConnectionPhase::CredentialPending
            | ConnectionPhase::OfferCreated
            | ConnectionPhase::AwaitingRemoteAnswer => DisplayState::Connecting,
            ConnectionPhase::Connected => DisplayState::Connected,
            ConnectionPhase::Listening => DisplayState::Listening,
            ConnectionPhase::Closed => DisplayState::Closed,
            ConnectionPhase::Failed => DisplayState::Error(
                self.last_error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Connection failed".to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_lifecycle_mapping() {
        assert_eq!(
            LifecycleKind::from_provider_type("session.created"),
            LifecycleKind::SessionCreated
        );
        assert_eq!(
            LifecycleKind::from_provider_type("rate_limits.updated"),
            LifecycleKind::Unknown("rate_limits.updated".to_string())
        );
    }

    #[test]
    fn test_display_state() {
        let mut snapshot = SessionSnapshot::default();
        assert_eq!(snapshot.display_state(), DisplayState::Idle);

        snapshot.phase = ConnectionPhase::AwaitingRemoteAnswer;
        assert_eq!(snapshot.display_state(), DisplayState::Connecting);

        snapshot.phase = ConnectionPhase::Failed;
        snapshot.last_error = Some(SessionError::ChannelNotReady);
        assert_eq!(
            snapshot.display_state(),
            DisplayState::Error("Control channel is not ready".to_string())
        );
    }
}
