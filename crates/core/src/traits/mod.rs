//! Platform traits for the voice session
//!
//! The session logic never talks to a media stack directly. These traits
//! are the seam:
//!
//! ```text
//! Network:
//!   - PeerConnector: creates peer connections
//!   - PeerConnection: offer/answer, transceivers, capture routing
//!   - ControlChannel: the JSON data channel
//!   - AudioSink: remote audio playback
//!
//! Capture:
//!   - CaptureDevice: opens local audio input
//! ```

mod capture;
mod peer;

pub use capture::CaptureDevice;
pub use peer::{
    AudioSink, ControlChannel, PeerConnection, PeerConnector, PeerEvent, TransportState,
};
