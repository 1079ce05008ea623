//! Core traits and types for the receptionist voice session
//!
//! This crate provides foundational types used across all other crates:
//! - Platform traits for the media stack (peer connection, capture)
//! - Audio frame and capture stream types
//! - Voice catalogue and agent profile
//! - Wire protocol for credentials, signaling and the control channel
//! - Session events and error types

pub mod audio;
pub mod error;
pub mod events;
pub mod profile;
pub mod protocol;
pub mod traits;
pub mod voice;

pub use audio::{AudioFrame, CaptureConstraints, CaptureStream, CaptureTrack, Channels, SampleRate};
pub use error::{Result, SessionError, TransportError};
pub use events::{ConnectionPhase, DisplayState, InboundEvent, LifecycleKind, SessionSnapshot};
pub use profile::{AgentProfile, MenuCategory, MenuItem, DEFAULT_MODEL_ID};
pub use protocol::{
    ConfigureData, ControlMessage, CredentialRequest, CredentialResponse, InboundEnvelope,
    SessionCredential, SignalingRequest, SignalingResponse, IMPLICIT_CREDENTIAL_TTL_SECS,
};
pub use voice::{Voice, VoiceOption};

pub use traits::{
    AudioSink, CaptureDevice, ControlChannel, PeerConnection, PeerConnector, PeerEvent,
    TransportState,
};
