//! Native media transport for the receptionist voice session
//!
//! Implements the platform traits from `receptionist-core` on top of the
//! `webrtc` crate:
//! - [`WebRtcConnector`] / [`WebRtcPeer`]: peer connection with one Opus
//!   send+receive transceiver and a JSON data channel
//! - [`ChannelCaptureDevice`] and [`WavCaptureDevice`]: capture sources
//! - [`OpusEncoder`] / [`OpusDecoder`]: audio codec

pub mod capture;
pub mod codec;
pub mod webrtc;

pub use capture::{CaptureFeed, ChannelCaptureDevice, WavCaptureDevice};
pub use codec::{OpusDecoder, OpusEncoder};
pub use webrtc::{
    IceServer, WebRtcAudioSink, WebRtcConfig, WebRtcConnector, WebRtcControlChannel, WebRtcPeer,
};
