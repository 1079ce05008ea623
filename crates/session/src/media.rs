//! Media source manager
//!
//! Owns the capture stream lifecycle independently of the network session,
//! so capture can start after the peer connection is already up.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use receptionist_core::{CaptureConstraints, CaptureDevice, CaptureStream, Result, SessionError};

enum Held {
    Opening,
    Stream(String),
}

/// Acquires and releases the session's single capture stream
pub struct MediaSourceManager {
    device: Arc<dyn CaptureDevice>,
    constraints: CaptureConstraints,
    held: Mutex<Option<Held>>,
    releases: AtomicUsize,
}

impl MediaSourceManager {
    pub fn new(device: Arc<dyn CaptureDevice>, constraints: CaptureConstraints) -> Self {
        Self {
            device,
            constraints,
            held: Mutex::new(None),
            releases: AtomicUsize::new(0),
        }
    }

    /// Open the capture stream.
    ///
    /// Fails fast if a stream is already held or being opened.
    pub async fn acquire(&self) -> Result<CaptureStream> {
        {
            let mut held = self.held.lock();
            if held.is_some() {
                return Err(SessionError::MediaAccess {
                    reason: "capture stream already acquired".to_string(),
                });
            }
            *held = Some(Held::Opening);
        }

        match self.device.open(&self.constraints).await {
            Ok(stream) => {
                *self.held.lock() = Some(Held::Stream(stream.id().to_string()));
                tracing::info!(
                    device = self.device.name(),
                    stream = %stream.id(),
                    "Capture stream acquired"
                );
                Ok(stream)
            },
            Err(e) => {
                *self.held.lock() = None;
                Err(SessionError::MediaAccess {
                    reason: e.to_string(),
                })
            },
        }
    }

    /// Stop every track of `stream`. Releasing `None` or an already
    /// released stream is a no-op.
    pub fn release(&self, stream: Option<&CaptureStream>) {
        let Some(stream) = stream else {
            return;
        };

        let stopped = stream.stop_all();
        {
            let mut held = self.held.lock();
            if matches!(held.as_ref(), Some(Held::Stream(id)) if id == stream.id()) {
                *held = None;
            }
        }

        if stopped > 0 {
            self.releases.fetch_add(1, Ordering::SeqCst);
            tracing::info!(stream = %stream.id(), tracks = stopped, "Capture stream released");
        }
    }

    pub fn is_acquired(&self) -> bool {
        self.held.lock().is_some()
    }

    /// Number of streams actually released
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}
