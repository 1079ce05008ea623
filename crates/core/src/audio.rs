//! Audio frame and capture stream types

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Sample rates the Opus codec can encode natively
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SampleRate {
    /// 8kHz - Telephony
    Hz8000,
    /// 16kHz - Standard speech capture
    Hz16000,
    /// 24kHz - Realtime provider PCM
    Hz24000,
    /// 48kHz - WebRTC clock rate
    #[default]
    Hz48000,
}

impl SampleRate {
    /// Get sample rate as u32
    pub fn as_u32(&self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz16000 => 16000,
            SampleRate::Hz24000 => 24000,
            SampleRate::Hz48000 => 48000,
        }
    }

    pub fn from_u32(rate: u32) -> Option<Self> {
        match rate {
            8000 => Some(SampleRate::Hz8000),
            16000 => Some(SampleRate::Hz16000),
            24000 => Some(SampleRate::Hz24000),
            48000 => Some(SampleRate::Hz48000),
            _ => None,
        }
    }

    /// Get frame size for 20ms chunk
    pub fn frame_size_20ms(&self) -> usize {
        (self.as_u32() as usize * 20) / 1000
    }
}

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Channels {
    #[default]
    Mono,
    Stereo,
}

impl Channels {
    pub fn count(&self) -> usize {
        match self {
            Channels::Mono => 1,
            Channels::Stereo => 2,
        }
    }
}

/// Audio frame with metadata
#[derive(Clone)]
pub struct AudioFrame {
    /// Interleaved samples, normalized to [-1.0, 1.0]
    pub samples: Arc<[f32]>,
    pub sample_rate: SampleRate,
    pub channels: Channels,
    /// Frame sequence number for ordering
    pub sequence: u64,
    pub duration: Duration,
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("samples_len", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("sequence", &self.sequence)
            .field("duration", &self.duration)
            .finish()
    }
}

impl AudioFrame {
    pub fn new(
        samples: Vec<f32>,
        sample_rate: SampleRate,
        channels: Channels,
        sequence: u64,
    ) -> Self {
        let duration = Duration::from_secs_f64(
            samples.len() as f64 / (sample_rate.as_u32() as f64 * channels.count() as f64),
        );

        Self {
            samples: samples.into(),
            sample_rate,
            channels,
            sequence,
            duration,
        }
    }

    /// Convert from signed 16-bit samples
    pub fn from_i16(
        samples: &[i16],
        sample_rate: SampleRate,
        channels: Channels,
        sequence: u64,
    ) -> Self {
        const PCM16_NORMALIZE: f32 = 32768.0;

        let samples = samples
            .iter()
            .map(|s| *s as f32 / PCM16_NORMALIZE)
            .collect();
        Self::new(samples, sample_rate, channels, sequence)
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}

/// Processing hints requested when opening a capture device.
///
/// These are best-effort: a device that cannot honour one keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// One audio track of a capture stream.
///
/// Clones share the same underlying track: stopping any clone stops all of
/// them, and the frame receiver can be taken exactly once.
#[derive(Clone)]
pub struct CaptureTrack {
    id: String,
    sample_rate: SampleRate,
    channels: Channels,
    stopped: Arc<AtomicBool>,
    frames: Arc<Mutex<Option<mpsc::Receiver<AudioFrame>>>>,
}

impl std::fmt::Debug for CaptureTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureTrack")
            .field("id", &self.id)
            .field("sample_rate", &self.sample_rate)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl CaptureTrack {
    /// Create a track fed by `frames`
    pub fn new(
        sample_rate: SampleRate,
        channels: Channels,
        frames: mpsc::Receiver<AudioFrame>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sample_rate,
            channels,
            stopped: Arc::new(AtomicBool::new(false)),
            frames: Arc::new(Mutex::new(Some(frames))),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Take the frame receiver; `None` once taken
    pub fn take_frames(&self) -> Option<mpsc::Receiver<AudioFrame>> {
        self.frames.lock().take()
    }

    /// Stop the track. Returns `true` only for the call that stopped it.
    pub fn stop(&self) -> bool {
        let first = !self.stopped.swap(true, Ordering::SeqCst);
        if first {
            // Dropping the receiver ends producers blocked on send
            self.frames.lock().take();
        }
        first
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Handle for producers to observe the stop flag
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stopped.clone()
    }
}

/// Audio-only capture stream
#[derive(Debug, Clone)]
pub struct CaptureStream {
    id: String,
    tracks: Vec<CaptureTrack>,
}

impl CaptureStream {
    pub fn new(tracks: Vec<CaptureTrack>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[CaptureTrack] {
        &self.tracks
    }

    /// First audio track, the one attached to the peer connection
    pub fn audio_track(&self) -> Option<&CaptureTrack> {
        self.tracks.first()
    }

    /// Stop every track. Returns how many tracks this call stopped.
    pub fn stop_all(&self) -> usize {
        self.tracks.iter().filter(|t| t.stop()).count()
    }

    pub fn is_stopped(&self) -> bool {
        self.tracks.iter().all(CaptureTrack::is_stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rate_conversions() {
        assert_eq!(SampleRate::Hz16000.frame_size_20ms(), 320);
        assert_eq!(SampleRate::Hz48000.frame_size_20ms(), 960);
        assert_eq!(SampleRate::from_u32(24000), Some(SampleRate::Hz24000));
        assert_eq!(SampleRate::from_u32(44100), None);
    }

    #[test]
    fn test_audio_frame_from_i16() {
        let frame = AudioFrame::from_i16(&[0; 320], SampleRate::Hz16000, Channels::Mono, 0);
        assert_eq!(frame.samples.len(), 320);
        assert_eq!(frame.duration_ms(), 20);
    }

    #[test]
    fn test_track_stops_once() {
        let (_tx, rx) = mpsc::channel(4);
        let track = CaptureTrack::new(SampleRate::Hz16000, Channels::Mono, rx);
        let clone = track.clone();

        assert!(track.stop());
        assert!(!clone.stop());
        assert!(clone.is_stopped());
        assert!(clone.take_frames().is_none());
    }

    #[test]
    fn test_stream_stop_all() {
        let (_tx, rx) = mpsc::channel(4);
        let stream = CaptureStream::new(vec![CaptureTrack::new(
            SampleRate::Hz16000,
            Channels::Mono,
            rx,
        )]);

        assert_eq!(stream.stop_all(), 1);
        assert_eq!(stream.stop_all(), 0);
        assert!(stream.is_stopped());
    }
}
