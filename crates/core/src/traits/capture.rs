//! Capture device trait

use async_trait::async_trait;

use crate::{CaptureConstraints, CaptureStream, TransportError};

/// Local audio input
///
/// Implementations:
/// - `ChannelCaptureDevice` - frames pushed by the host application
/// - `WavCaptureDevice` - a WAV file played back in real time
#[async_trait]
pub trait CaptureDevice: Send + Sync + 'static {
    /// Open an audio-only capture stream
    ///
    /// Constraints are hints; unsupported ones are ignored.
    async fn open(&self, constraints: &CaptureConstraints)
        -> Result<CaptureStream, TransportError>;

    /// Device name for logging
    fn name(&self) -> &str;
}
