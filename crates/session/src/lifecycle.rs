//! Resource ownership and teardown
//!
//! All live resources of a session sit in one [`ResourceSet`]. Teardown
//! invalidates the generation first, then takes the whole set in one step
//! and releases it in a fixed order. Installing a resource checks the
//! generation under the same lock, so nothing can be installed into a
//! session that is being torn down.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use receptionist_core::{
    AudioSink, CaptureStream, ControlChannel, PeerConnection, Result, SessionError,
};

use crate::media::MediaSourceManager;
use crate::state::{StateMachine, Terminal};

/// Live resources of one connection attempt
#[derive(Default)]
pub struct ResourceSet {
    pub capture_stream: Option<CaptureStream>,
    pub peer_connection: Option<Arc<dyn PeerConnection>>,
    pub control_channel: Option<Arc<dyn ControlChannel>>,
    pub audio_sink: Option<Arc<dyn AudioSink>>,
}

impl ResourceSet {
    pub fn is_empty(&self) -> bool {
        self.capture_stream.is_none()
            && self.peer_connection.is_none()
            && self.control_channel.is_none()
            && self.audio_sink.is_none()
    }

    /// Release every resource in order: capture, outgoing media, channel,
    /// peer, playback. Failures are logged and skipped.
    pub async fn release(self, media: &MediaSourceManager) {
        media.release(self.capture_stream.as_ref());

        if let Some(peer) = &self.peer_connection {
            if let Err(e) = peer.detach_capture().await {
                tracing::warn!(error = %e, "Failed to detach capture during teardown");
            }
        }

        if let Some(channel) = &self.control_channel {
            if let Err(e) = channel.close().await {
                tracing::warn!(error = %e, label = channel.label(), "Failed to close control channel");
            }
        }

        if let Some(peer) = &self.peer_connection {
            if let Err(e) = peer.close().await {
                tracing::warn!(error = %e, "Failed to close peer connection");
            }
        }

        if let Some(sink) = &self.audio_sink {
            if let Err(e) = sink.detach().await {
                tracing::warn!(error = %e, sink = sink.id(), "Failed to detach audio sink");
            }
        }
    }
}

pub struct LifecycleCoordinator {
    resources: Mutex<ResourceSet>,
    state: Arc<StateMachine>,
    media: Arc<MediaSourceManager>,
    in_progress: AtomicBool,
}

impl LifecycleCoordinator {
    pub fn new(state: Arc<StateMachine>, media: Arc<MediaSourceManager>) -> Self {
        Self {
            resources: Mutex::new(ResourceSet::default()),
            state,
            media,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> &Arc<StateMachine> {
        &self.state
    }

    pub fn media(&self) -> &Arc<MediaSourceManager> {
        &self.media
    }

    /// Tear the session down to `terminal`.
    ///
    /// With `expected` set, the teardown only runs if that generation is
    /// still current; a failure from an old attempt must not kill a newer
    /// one.
    ///
    /// # Returns
    /// `true` if this call performed the teardown
    pub async fn teardown(&self, terminal: Terminal, expected: Option<u64>) -> bool {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Teardown already in progress");
            return false;
        }

        let generation = match expected {
            Some(gen) => self.state.invalidate_if(gen),
            None => Some(self.state.invalidate()),
        };
        let Some(generation) = generation else {
            self.in_progress.store(false, Ordering::Release);
            return false;
        };

        let resources = std::mem::take(&mut *self.resources.lock());
        let had_resources = !resources.is_empty();
        resources.release(&self.media).await;

        tracing::info!(generation, ?terminal, had_resources, "Session torn down");
        self.state.finish(generation, terminal);
        self.in_progress.store(false, Ordering::Release);
        true
    }

    pub fn is_tearing_down(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn install_peer(&self, generation: u64, peer: Arc<dyn PeerConnection>) -> Result<()> {
        let mut resources = self.resources.lock();
        self.check_current(generation)?;
        if resources.peer_connection.is_some() {
            return Err(SessionError::TransportFailure(
                "peer connection already installed".to_string(),
            ));
        }
        resources.peer_connection = Some(peer);
        Ok(())
    }

    pub fn install_channel(
        &self,
        generation: u64,
        channel: Arc<dyn ControlChannel>,
    ) -> Result<()> {
        let mut resources = self.resources.lock();
        self.check_current(generation)?;
        if resources.control_channel.is_some() {
            return Err(SessionError::TransportFailure(
                "control channel already installed".to_string(),
            ));
        }
        resources.control_channel = Some(channel);
        Ok(())
    }

    pub fn install_capture(&self, generation: u64, stream: CaptureStream) -> Result<()> {
        let mut resources = self.resources.lock();
        if let Err(e) = self.check_current(generation) {
            drop(resources);
            self.media.release(Some(&stream));
            return Err(e);
        }
        if resources.capture_stream.is_some() {
            drop(resources);
            self.media.release(Some(&stream));
            return Err(SessionError::MediaAccess {
                reason: "capture stream already acquired".to_string(),
            });
        }
        resources.capture_stream = Some(stream);
        Ok(())
    }

    pub fn install_sink(&self, generation: u64, sink: Arc<dyn AudioSink>) -> Result<()> {
        let mut resources = self.resources.lock();
        self.check_current(generation)?;
        if let Some(previous) = resources.audio_sink.replace(sink) {
            tracing::debug!(sink = previous.id(), "Replacing audio sink");
            tokio::spawn(async move {
                let _ = previous.detach().await;
            });
        }
        Ok(())
    }

    /// Take the capture stream out without touching the connection
    pub fn take_capture(&self, generation: u64) -> Result<Option<CaptureStream>> {
        let mut resources = self.resources.lock();
        self.check_current(generation)?;
        Ok(resources.capture_stream.take())
    }

    pub fn peer(&self) -> Option<Arc<dyn PeerConnection>> {
        self.resources.lock().peer_connection.clone()
    }

    pub fn control_channel(&self) -> Option<Arc<dyn ControlChannel>> {
        self.resources.lock().control_channel.clone()
    }

    pub fn has_capture(&self) -> bool {
        self.resources.lock().capture_stream.is_some()
    }

    pub fn has_resources(&self) -> bool {
        !self.resources.lock().is_empty()
    }

    /// Take everything without touching the state machine. Used on drop.
    pub fn take_all(&self) -> ResourceSet {
        std::mem::take(&mut *self.resources.lock())
    }

    fn check_current(&self, generation: u64) -> Result<()> {
        if self.state.is_current(generation) {
            Ok(())
        } else {
            Err(SessionError::StaleConnection)
        }
    }
}
