//! Peer connection traits

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::{CaptureTrack, TransportError};

/// Connectivity state reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl TransportState {
    /// States after which the connection cannot recover
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportState::Failed)
    }
}

/// Events raised by a peer connection while it is alive
pub enum PeerEvent {
    /// The control channel finished opening
    ControlChannelOpen,
    /// The control channel closed
    ControlChannelClosed,
    /// Raw text received on the control channel
    ControlMessage(String),
    /// The remote side started sending audio; the sink plays it out
    RemoteAudio(Arc<dyn AudioSink>),
    /// Peer connection state changed
    TransportState(TransportState),
}

impl std::fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerEvent::ControlChannelOpen => f.write_str("ControlChannelOpen"),
            PeerEvent::ControlChannelClosed => f.write_str("ControlChannelClosed"),
            PeerEvent::ControlMessage(raw) => f.debug_tuple("ControlMessage").field(raw).finish(),
            PeerEvent::RemoteAudio(sink) => f.debug_tuple("RemoteAudio").field(&sink.id()).finish(),
            PeerEvent::TransportState(s) => f.debug_tuple("TransportState").field(s).finish(),
        }
    }
}

/// Factory for peer connections
///
/// # Example
///
/// ```ignore
/// let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
/// let peer = connector.create(tx).await?;
/// let channel = peer.create_control_channel("events").await?;
/// peer.add_audio_transceiver().await?;
/// peer.create_offer().await?;
/// peer.wait_for_gathering(Duration::from_secs(5)).await;
/// ```
#[async_trait]
pub trait PeerConnector: Send + Sync + 'static {
    /// Create a new peer connection that reports into `events`
    async fn create(
        &self,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>, TransportError>;
}

/// A local peer connection negotiating with one remote endpoint
#[async_trait]
pub trait PeerConnection: Send + Sync + 'static {
    /// Create the bidirectional control channel
    async fn create_control_channel(
        &self,
        label: &str,
    ) -> Result<Arc<dyn ControlChannel>, TransportError>;

    /// Add an audio transceiver in send+receive mode
    async fn add_audio_transceiver(&self) -> Result<(), TransportError>;

    /// Create the local offer and apply it as the local description
    ///
    /// # Returns
    /// The offer SDP before candidate gathering
    async fn create_offer(&self) -> Result<String, TransportError>;

    /// Wait for candidate gathering to settle
    ///
    /// # Returns
    /// `true` if gathering completed, `false` if the wait timed out
    async fn wait_for_gathering(&self, timeout: Duration) -> bool;

    /// Current local description including gathered candidates
    async fn local_description(&self) -> Option<String>;

    /// Apply the remote answer
    async fn apply_answer(&self, sdp: &str) -> Result<(), TransportError>;

    /// Route a capture track into the outgoing audio transceiver
    async fn attach_capture(&self, track: CaptureTrack) -> Result<(), TransportError>;

    /// Stop routing capture audio; the transceiver stays negotiated
    async fn detach_capture(&self) -> Result<(), TransportError>;

    /// Whether `close` has been called
    fn is_closed(&self) -> bool;

    async fn close(&self) -> Result<(), TransportError>;
}

/// The non-audio data channel of a peer connection
#[async_trait]
pub trait ControlChannel: Send + Sync + 'static {
    fn label(&self) -> &str;

    fn is_open(&self) -> bool;

    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Playback target for remote audio
#[async_trait]
pub trait AudioSink: Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Stop playback and release the output
    async fn detach(&self) -> Result<(), TransportError>;
}
