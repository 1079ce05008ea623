//! Capture devices
//!
//! Neither device has a signal-processing stage, so echo cancellation,
//! noise suppression and gain control hints are accepted and logged only.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use receptionist_config::constants::audio::{CAPTURE_CHANNEL_CAPACITY, FRAME_MS};
use receptionist_core::{
    AudioFrame, CaptureConstraints, CaptureDevice, CaptureStream, CaptureTrack, Channels,
    SampleRate, TransportError,
};

fn log_unsupported_hints(device: &str, constraints: &CaptureConstraints) {
    for (hint, requested) in [
        ("echo_cancellation", constraints.echo_cancellation),
        ("noise_suppression", constraints.noise_suppression),
        ("auto_gain_control", constraints.auto_gain_control),
    ] {
        if requested {
            tracing::debug!(device, hint, "Capture hint not supported, ignoring");
        }
    }
}

struct ActiveFeed {
    tx: mpsc::Sender<AudioFrame>,
    stopped: Arc<AtomicBool>,
}

/// Capture device fed by the host application.
///
/// Each `open` creates a fresh track; frames pushed through a
/// [`CaptureFeed`] go to the most recently opened track until it stops.
pub struct ChannelCaptureDevice {
    sample_rate: SampleRate,
    channels: Channels,
    active: Arc<Mutex<Option<ActiveFeed>>>,
    opens: AtomicUsize,
}

impl ChannelCaptureDevice {
    pub fn new(sample_rate: SampleRate, channels: Channels) -> Self {
        Self {
            sample_rate,
            channels,
            active: Arc::new(Mutex::new(None)),
            opens: AtomicUsize::new(0),
        }
    }

    /// Handle for pushing frames into the open track
    pub fn feed(&self) -> CaptureFeed {
        CaptureFeed {
            active: self.active.clone(),
        }
    }

    /// Number of streams opened so far
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureDevice for ChannelCaptureDevice {
    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<CaptureStream, TransportError> {
        log_unsupported_hints(self.name(), constraints);

        let (tx, rx) = mpsc::channel(CAPTURE_CHANNEL_CAPACITY);
        let track = CaptureTrack::new(self.sample_rate, self.channels, rx);

        *self.active.lock() = Some(ActiveFeed {
            tx,
            stopped: track.stop_flag(),
        });
        self.opens.fetch_add(1, Ordering::SeqCst);

        Ok(CaptureStream::new(vec![track]))
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Producer side of a [`ChannelCaptureDevice`]
#[derive(Clone)]
pub struct CaptureFeed {
    active: Arc<Mutex<Option<ActiveFeed>>>,
}

impl CaptureFeed {
    /// Push a frame. Returns `false` when no live track takes it.
    pub fn push(&self, frame: AudioFrame) -> bool {
        let mut active = self.active.lock();
        let Some(feed) = active.as_ref() else {
            return false;
        };

        if feed.stopped.load(Ordering::SeqCst) {
            *active = None;
            return false;
        }

        match feed.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!("Capture buffer full, dropping frame");
                false
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                *active = None;
                false
            },
        }
    }
}

/// Capture device that plays a 16-bit WAV file in real time
pub struct WavCaptureDevice {
    path: PathBuf,
}

impl WavCaptureDevice {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

fn read_wav(path: &Path) -> Result<(Vec<i16>, SampleRate, Channels), TransportError> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| TransportError::Media(format!("Failed to open {}: {}", path.display(), e)))?;

    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(TransportError::Media(format!(
            "Unsupported WAV format: {:?} {}-bit (expected 16-bit PCM)",
            spec.sample_format, spec.bits_per_sample
        )));
    }

    let sample_rate = SampleRate::from_u32(spec.sample_rate).ok_or_else(|| {
        TransportError::Media(format!("Unsupported sample rate {} Hz", spec.sample_rate))
    })?;
    let channels = match spec.channels {
        1 => Channels::Mono,
        2 => Channels::Stereo,
        n => {
            return Err(TransportError::Media(format!(
                "Unsupported channel count {}",
                n
            )))
        },
    };

    let samples = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TransportError::Media(format!("Failed to read samples: {}", e)))?;

    tracing::debug!(
        path = %path.display(),
        samples = samples.len(),
        rate = spec.sample_rate,
        "Loaded capture audio"
    );

    Ok((samples, sample_rate, channels))
}

#[async_trait]
impl CaptureDevice for WavCaptureDevice {
    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<CaptureStream, TransportError> {
        log_unsupported_hints(self.name(), constraints);

        let path = self.path.clone();
        let (samples, sample_rate, channels) = tokio::task::spawn_blocking(move || read_wav(&path))
            .await
            .map_err(|e| TransportError::Internal(e.to_string()))??;

        let (tx, rx) = mpsc::channel(CAPTURE_CHANNEL_CAPACITY);
        let track = CaptureTrack::new(sample_rate, channels, rx);
        let stopped = track.stop_flag();

        tokio::spawn(async move {
            let chunk_len = sample_rate.frame_size_20ms() * channels.count();
            let mut ticker = tokio::time::interval(Duration::from_millis(FRAME_MS as u64));

            for (sequence, chunk) in samples.chunks(chunk_len).enumerate() {
                ticker.tick().await;
                if stopped.load(Ordering::SeqCst) {
                    return;
                }

                let frame = AudioFrame::from_i16(chunk, sample_rate, channels, sequence as u64);
                if tx.send(frame).await.is_err() {
                    return;
                }
            }
            tracing::info!("Capture file exhausted");
        });

        Ok(CaptureStream::new(vec![track]))
    }

    fn name(&self) -> &str {
        "wav"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            writer.write_sample(((i % 100) as i16) * 100).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[tokio::test]
    async fn test_channel_device_feed() {
        let device = ChannelCaptureDevice::new(SampleRate::Hz16000, Channels::Mono);
        let feed = device.feed();
        let frame = AudioFrame::from_i16(&[0; 320], SampleRate::Hz16000, Channels::Mono, 0);

        // Nothing open yet
        assert!(!feed.push(frame.clone()));

        let stream = device.open(&CaptureConstraints::default()).await.unwrap();
        let mut rx = stream.audio_track().unwrap().take_frames().unwrap();
        assert!(feed.push(frame.clone()));
        assert_eq!(rx.recv().await.unwrap().samples.len(), 320);

        stream.stop_all();
        assert!(!feed.push(frame));
        assert_eq!(device.open_count(), 1);
    }

    #[tokio::test]
    async fn test_wav_device_streams_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.wav");
        write_wav(&path, 16000, 16000 / 10);

        let device = WavCaptureDevice::new(&path);
        let stream = device.open(&CaptureConstraints::default()).await.unwrap();
        let track = stream.audio_track().unwrap();
        assert_eq!(track.sample_rate(), SampleRate::Hz16000);

        let mut rx = track.take_frames().unwrap();
        let mut count = 0;
        while let Some(frame) = rx.recv().await {
            assert_eq!(frame.samples.len(), 320);
            count += 1;
        }
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn test_wav_device_rejects_unsupported_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cd.wav");
        write_wav(&path, 44100, 441);

        let device = WavCaptureDevice::new(&path);
        assert!(matches!(
            device.open(&CaptureConstraints::default()).await,
            Err(TransportError::Media(_))
        ));
    }

    #[tokio::test]
    async fn test_wav_device_missing_file() {
        let device = WavCaptureDevice::new("/nonexistent/capture.wav");
        assert!(device.open(&CaptureConstraints::default()).await.is_err());
    }
}
