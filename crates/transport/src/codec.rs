//! Opus codec wrappers
//!
//! Both coders sit behind a mutex so they can be shared between the
//! callback that owns a track and the task that drains it.

use std::convert::TryFrom;

use audiopus::coder::{Decoder, Encoder};
use audiopus::packet::Packet;
use audiopus::{Application, MutSignals};
use parking_lot::Mutex;

use receptionist_core::{Channels, SampleRate, TransportError};

/// Largest encoded frame we expect to produce
const MAX_OPUS_FRAME_BYTES: usize = 4000;

/// Decoded samples per channel for the longest Opus frame (120ms at 48kHz)
const MAX_DECODED_SAMPLES_PER_CHANNEL: usize = 5760;

fn opus_rate(rate: SampleRate) -> audiopus::SampleRate {
    match rate {
        SampleRate::Hz8000 => audiopus::SampleRate::Hz8000,
        SampleRate::Hz16000 => audiopus::SampleRate::Hz16000,
        SampleRate::Hz24000 => audiopus::SampleRate::Hz24000,
        SampleRate::Hz48000 => audiopus::SampleRate::Hz48000,
    }
}

fn opus_channels(channels: Channels) -> audiopus::Channels {
    match channels {
        Channels::Mono => audiopus::Channels::Mono,
        Channels::Stereo => audiopus::Channels::Stereo,
    }
}

/// Opus encoder for capture audio
pub struct OpusEncoder {
    inner: Mutex<Encoder>,
    sample_rate: SampleRate,
    channels: Channels,
}

impl OpusEncoder {
    pub fn new(sample_rate: SampleRate, channels: Channels) -> Result<Self, TransportError> {
        let encoder = Encoder::new(
            opus_rate(sample_rate),
            opus_channels(channels),
            Application::Voip,
        )
        .map_err(|e| TransportError::Media(format!("Failed to create Opus encoder: {}", e)))?;

        Ok(Self {
            inner: Mutex::new(encoder),
            sample_rate,
            channels,
        })
    }

    /// Samples (all channels) in one 20ms frame
    pub fn frame_len(&self) -> usize {
        self.sample_rate.frame_size_20ms() * self.channels.count()
    }

    /// Encode exactly one frame of interleaved samples
    pub fn encode(&self, samples: &[f32]) -> Result<Vec<u8>, TransportError> {
        let mut output = vec![0u8; MAX_OPUS_FRAME_BYTES];
        let len = self
            .inner
            .lock()
            .encode_float(samples, &mut output)
            .map_err(|e| TransportError::Media(format!("Opus encode failed: {}", e)))?;
        output.truncate(len);
        Ok(output)
    }
}

/// Opus decoder for remote audio
pub struct OpusDecoder {
    inner: Mutex<Decoder>,
    channels: Channels,
}

impl OpusDecoder {
    pub fn new(sample_rate: SampleRate, channels: Channels) -> Result<Self, TransportError> {
        let decoder = Decoder::new(opus_rate(sample_rate), opus_channels(channels))
            .map_err(|e| TransportError::Media(format!("Failed to create Opus decoder: {}", e)))?;

        Ok(Self {
            inner: Mutex::new(decoder),
            channels,
        })
    }

    fn buffer(&self) -> Vec<f32> {
        vec![0f32; MAX_DECODED_SAMPLES_PER_CHANNEL * self.channels.count()]
    }

    /// Decode one packet into interleaved samples
    pub fn decode(&self, payload: &[u8]) -> Result<Vec<f32>, TransportError> {
        let mut output = self.buffer();

        let packet = Packet::try_from(payload)
            .map_err(|e| TransportError::Media(format!("Invalid Opus packet: {}", e)))?;
        let signals = MutSignals::try_from(output.as_mut_slice())
            .map_err(|e| TransportError::Media(format!("Invalid output buffer: {}", e)))?;

        let decoded = self
            .inner
            .lock()
            .decode_float(Some(packet), signals, false)
            .map_err(|e| TransportError::Media(format!("Opus decode failed: {}", e)))?;

        output.truncate(decoded * self.channels.count());
        Ok(output)
    }

    /// Packet loss concealment for a missing packet
    pub fn decode_plc(&self) -> Result<Vec<f32>, TransportError> {
        let mut output = self.buffer();

        let signals = MutSignals::try_from(output.as_mut_slice())
            .map_err(|e| TransportError::Media(format!("Invalid output buffer: {}", e)))?;

        let decoded = self
            .inner
            .lock()
            .decode_float(None::<Packet<'_>>, signals, false)
            .map_err(|e| TransportError::Media(format!("Opus PLC failed: {}", e)))?;

        output.truncate(decoded * self.channels.count());
        Ok(output)
    }
}
