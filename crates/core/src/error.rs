//! Error taxonomy for the voice session

use thiserror::Error;

/// Result alias used throughout the session crates
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced by a voice session.
///
/// Errors raised while negotiating are terminal for the attempt that
/// produced them: the negotiator moves to `Failed` and tears down all
/// resources before reporting them. [`SessionError::MessageParse`] and the
/// precondition rejections (`AlreadyConnecting`, `ListenInFlight`,
/// `NotConnected`, `ChannelNotReady` on listen) leave the session as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Unknown voice: {0}")]
    InvalidVoice(String),

    #[error("Credential request failed ({}): {body}", describe_status(.status))]
    Credential { status: Option<u16>, body: String },

    #[error("Audio capture unavailable: {reason}")]
    MediaAccess { reason: String },

    #[error("Signaling exchange failed ({}): {body}", describe_status(.status))]
    Signaling { status: Option<u16>, body: String },

    #[error("Connection attempt was superseded by a teardown")]
    StaleConnection,

    #[error("Control channel is not ready")]
    ChannelNotReady,

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Malformed control message: {0}")]
    MessageParse(String),

    #[error("A connection attempt is already in progress")]
    AlreadyConnecting,

    #[error("Session is not connected")]
    NotConnected,

    #[error("Another start or stop of listening is in progress")]
    ListenInFlight,
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "no response".to_string(),
    }
}

impl SessionError {
    /// Upstream HTTP status, for credential and signaling failures
    pub fn status(&self) -> Option<u16> {
        match self {
            SessionError::Credential { status, .. } | SessionError::Signaling { status, .. } => {
                *status
            },
            _ => None,
        }
    }

    /// Whether this error ends the connection attempt
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SessionError::MessageParse(_)
                | SessionError::AlreadyConnecting
                | SessionError::ListenInFlight
        )
    }
}

/// Errors reported by the platform media stack
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Media error: {0}")]
    Media(String),

    #[error("Data channel error: {0}")]
    Channel(String),

    #[error("Connection closed")]
    Closed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        SessionError::TransportFailure(err.to_string())
    }
}
