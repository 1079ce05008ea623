//! Session negotiator
//!
//! Drives one voice session from credential fetch through offer/answer to
//! listening, and owns every resource it creates through the
//! [`LifecycleCoordinator`].

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use receptionist_config::SessionConfig;
use receptionist_core::{
    AgentProfile, CaptureConstraints, CaptureDevice, ConfigureData, ConnectionPhase,
    ControlMessage, InboundEvent, LifecycleKind, PeerConnector, PeerEvent, Result, SessionError,
    SessionSnapshot, TransportState, Voice,
};

use crate::broker::CredentialBroker;
use crate::bus::{EventBus, Subscription};
use crate::dispatcher::{ControlDispatcher, SendOutcome};
use crate::lifecycle::LifecycleCoordinator;
use crate::media::MediaSourceManager;
use crate::signaling::SignalingClient;
use crate::state::{StateMachine, Terminal, Transition};

/// Tunables for one session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub ice_gather_timeout: Duration,
    pub control_channel_label: String,
    pub capture: CaptureConstraints,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ice_gather_timeout: Duration::from_millis(
                receptionist_config::constants::timeouts::ICE_GATHER_MS,
            ),
            control_channel_label: receptionist_config::constants::webrtc::CONTROL_CHANNEL_LABEL
                .to_string(),
            capture: CaptureConstraints::default(),
        }
    }
}

impl SessionOptions {
    pub fn from_settings(session: &SessionConfig) -> Self {
        Self {
            ice_gather_timeout: Duration::from_millis(session.ice_gather_timeout_ms),
            control_channel_label: session.control_channel_label.clone(),
            capture: CaptureConstraints {
                echo_cancellation: session.capture.echo_cancellation,
                noise_suppression: session.capture.noise_suppression,
                auto_gain_control: session.capture.auto_gain_control,
            },
        }
    }
}

/// External collaborators of a session
pub struct SessionDeps {
    pub broker: Arc<dyn CredentialBroker>,
    pub signaling: Arc<dyn SignalingClient>,
    pub connector: Arc<dyn PeerConnector>,
    pub capture: Arc<dyn CaptureDevice>,
}

struct SessionInner {
    id: String,
    profile: AgentProfile,
    options: SessionOptions,
    broker: Arc<dyn CredentialBroker>,
    signaling: Arc<dyn SignalingClient>,
    connector: Arc<dyn PeerConnector>,
    state: Arc<StateMachine>,
    lifecycle: LifecycleCoordinator,
    bus: EventBus,
    dispatcher: RwLock<Option<(u64, Arc<ControlDispatcher>)>>,
    listen_in_flight: AtomicBool,
}

/// One realtime voice session.
///
/// Cheap to clone; clones drive the same session.
///
/// # Example
///
/// ```ignore
/// let session = VoiceSession::new(profile, SessionOptions::default(), deps);
/// let (_sub, mut events) = session.events();
/// session.connect().await?;
/// session.start_listening().await?;
/// ```
#[derive(Clone)]
pub struct VoiceSession {
    inner: Arc<SessionInner>,
}

impl VoiceSession {
    pub fn new(profile: AgentProfile, options: SessionOptions, deps: SessionDeps) -> Self {
        let state = Arc::new(StateMachine::new(profile.voice_id.clone()));
        let media = Arc::new(MediaSourceManager::new(deps.capture, options.capture));
        let lifecycle = LifecycleCoordinator::new(state.clone(), media);

        Self {
            inner: Arc::new(SessionInner {
                id: uuid::Uuid::new_v4().to_string(),
                profile,
                options,
                broker: deps.broker,
                signaling: deps.signaling,
                connector: deps.connector,
                state,
                lifecycle,
                bus: EventBus::new(),
                dispatcher: RwLock::new(None),
                listen_in_flight: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.inner.profile
    }

    /// Negotiate a connection.
    ///
    /// Fails with [`SessionError::AlreadyConnecting`] if an attempt is in
    /// flight or the session is already connected; that rejection leaves
    /// the state untouched. Any other failure moves the session to
    /// `Failed` after a full teardown.
    pub async fn connect(&self) -> Result<()> {
        let inner = &self.inner;
        let generation = inner.state.begin()?;

        tracing::info!(session_id = %inner.id, generation, "Connecting");
        inner
            .bus
            .publish(InboundEvent::LifecycleSignal(LifecycleKind::Connecting));

        match inner.negotiate(generation).await {
            Ok(()) => {
                tracing::info!(session_id = %inner.id, generation, "Connected");
                inner
                    .bus
                    .publish(InboundEvent::LifecycleSignal(LifecycleKind::Connected));
                Ok(())
            },
            Err(e) => {
                inner.fail(generation, e.clone()).await;
                Err(e)
            },
        }
    }

    /// Acquire capture and start sending audio.
    ///
    /// Start and stop never interleave: while either is running, the other
    /// (or a second start) fails with [`SessionError::ListenInFlight`].
    pub async fn start_listening(&self) -> Result<()> {
        let _guard = ListenGuard::acquire(&self.inner.listen_in_flight)?;
        self.inner.start_listening().await
    }

    /// Release capture; the connection and control channel stay up
    pub async fn stop_listening(&self) -> Result<()> {
        let _guard = ListenGuard::acquire(&self.inner.listen_in_flight)?;
        self.inner.stop_listening().await
    }

    /// Tear everything down and end in `Closed`
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        if inner.lifecycle.teardown(Terminal::Closed, None).await {
            *inner.dispatcher.write() = None;
            tracing::info!(session_id = %inner.id, "Disconnected");
            inner
                .bus
                .publish(InboundEvent::LifecycleSignal(LifecycleKind::Closed));
        }
    }

    /// Release all resources and return to `Idle`
    pub async fn teardown(&self) {
        if self.inner.lifecycle.teardown(Terminal::Idle, None).await {
            *self.inner.dispatcher.write() = None;
        }
    }

    /// Switch the voice.
    ///
    /// An active session is torn down and renegotiated with a fresh
    /// credential; otherwise the voice is recorded for the next `connect()`.
    pub async fn change_voice(&self, voice_id: &str) -> Result<()> {
        let voice: Voice = voice_id.parse()?;
        let inner = &self.inner;

        let phase = inner.state.phase();
        inner.state.set_active_voice(voice.id());

        if matches!(
            phase,
            ConnectionPhase::Idle | ConnectionPhase::Closed | ConnectionPhase::Failed
        ) {
            tracing::debug!(session_id = %inner.id, voice = %voice, "Voice recorded");
            return Ok(());
        }

        tracing::info!(session_id = %inner.id, voice = %voice, "Changing voice, reconnecting");
        self.teardown().await;
        self.connect().await
    }

    /// Send a control message on the current channel
    pub async fn send(&self, message: ControlMessage) -> Result<SendOutcome> {
        let dispatcher = self
            .inner
            .current_dispatcher()
            .ok_or(SessionError::NotConnected)?;
        dispatcher.send(message).await
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(handler)
    }

    pub fn events(&self) -> (Subscription, mpsc::UnboundedReceiver<InboundEvent>) {
        self.inner.bus.events()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.snapshot()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.inner.state.phase()
    }

    /// Whether the session currently owns any live resource
    pub fn has_resources(&self) -> bool {
        self.inner.lifecycle.has_resources()
    }

    pub fn is_capturing(&self) -> bool {
        self.inner.lifecycle.has_capture()
    }
}

impl SessionInner {
    async fn negotiate(self: &Arc<Self>, generation: u64) -> Result<()> {
        let voice = self.state.active_voice();
        voice.parse::<Voice>()?;
        let model_id = self.profile.model_id.clone();

        let credential = self.broker.fetch_credential(&voice, &model_id).await?;
        self.ensure_current(generation)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let peer = self.connector.create(events_tx).await?;
        if let Err(e) = self.lifecycle.install_peer(generation, peer.clone()) {
            let _ = peer.close().await;
            return Err(e);
        }

        let channel = peer
            .create_control_channel(&self.options.control_channel_label)
            .await?;
        if let Err(e) = self.lifecycle.install_channel(generation, channel.clone()) {
            let _ = channel.close().await;
            return Err(e);
        }

        let dispatcher = Arc::new(ControlDispatcher::new(channel, self.bus.clone()));
        *self.dispatcher.write() = Some((generation, dispatcher.clone()));
        dispatcher.send(self.configure_message(&voice)).await?;

        spawn_event_pump(Arc::downgrade(self), generation, events_rx, dispatcher);

        peer.add_audio_transceiver().await?;
        peer.create_offer().await?;
        if !peer.wait_for_gathering(self.options.ice_gather_timeout).await {
            tracing::warn!(
                session_id = %self.id,
                timeout_ms = self.options.ice_gather_timeout.as_millis() as u64,
                "ICE gathering timed out, using candidates gathered so far"
            );
        }
        self.ensure_current(generation)?;
        self.state.apply(generation, Transition::OfferCreated)?;

        let local_sdp = peer.local_description().await.ok_or_else(|| {
            SessionError::TransportFailure("local description unavailable".to_string())
        })?;
        self.state.apply(generation, Transition::OfferSent)?;

        let answer = self
            .signaling
            .exchange(&credential, &local_sdp, &model_id)
            .await?;

        if !self.state.is_current(generation) || peer.is_closed() {
            tracing::debug!(session_id = %self.id, generation, "Discarding stale answer");
            return Err(SessionError::StaleConnection);
        }

        if let Err(e) = peer.apply_answer(&answer).await {
            if !self.state.is_current(generation) {
                return Err(SessionError::StaleConnection);
            }
            return Err(e.into());
        }

        self.state.apply(generation, Transition::AnswerApplied)?;
        Ok(())
    }

    async fn start_listening(&self) -> Result<()> {
        let snapshot = self.state.state();
        if snapshot.phase == ConnectionPhase::Listening {
            return Ok(());
        }
        if !snapshot.phase.is_connected() {
            return Err(SessionError::NotConnected);
        }
        if !snapshot.control_channel_ready {
            return Err(SessionError::ChannelNotReady);
        }
        let generation = snapshot.generation;

        let stream = match self.lifecycle.media().acquire().await {
            Ok(stream) => stream,
            Err(e) => {
                self.fail(generation, e.clone()).await;
                return Err(e);
            },
        };

        let track = stream.audio_track().cloned();
        self.lifecycle.install_capture(generation, stream)?;

        let Some(track) = track else {
            let err = SessionError::MediaAccess {
                reason: "capture stream has no audio track".to_string(),
            };
            self.fail(generation, err.clone()).await;
            return Err(err);
        };

        let peer = self
            .lifecycle
            .peer()
            .ok_or(SessionError::StaleConnection)?;
        if let Err(e) = peer.attach_capture(track).await {
            let err = SessionError::from(e);
            self.fail(generation, err.clone()).await;
            return Err(err);
        }

        if let Err(e) = self.state.apply(generation, Transition::ListeningStarted) {
            // The channel closed while capture was opening.
            if let Err(detach) = peer.detach_capture().await {
                tracing::warn!(session_id = %self.id, error = %detach, "Failed to detach capture");
            }
            if let Ok(stream) = self.lifecycle.take_capture(generation) {
                self.lifecycle.media().release(stream.as_ref());
            }
            return Err(e);
        }

        tracing::info!(session_id = %self.id, generation, "Listening");
        self.bus
            .publish(InboundEvent::LifecycleSignal(LifecycleKind::Listening));
        Ok(())
    }

    async fn stop_listening(&self) -> Result<()> {
        let snapshot = self.state.state();
        if !snapshot.phase.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let generation = snapshot.generation;

        self.release_capture(generation).await?;
        self.state.apply(generation, Transition::ListeningStopped)?;
        tracing::info!(session_id = %self.id, generation, "Stopped listening");
        Ok(())
    }

    /// Detach and release the capture stream of `generation`, if any
    async fn release_capture(&self, generation: u64) -> Result<bool> {
        let stream = self.lifecycle.take_capture(generation)?;
        if let Some(peer) = self.lifecycle.peer() {
            if let Err(e) = peer.detach_capture().await {
                tracing::warn!(session_id = %self.id, error = %e, "Failed to detach capture");
            }
        }
        self.lifecycle.media().release(stream.as_ref());
        Ok(stream.is_some())
    }

    /// Fail the attempt identified by `generation`. A no-op when that
    /// attempt was already superseded.
    async fn fail(&self, generation: u64, err: SessionError) {
        let terminal = Terminal::Failed(err.clone());
        if self.lifecycle.teardown(terminal, Some(generation)).await {
            self.clear_dispatcher(generation);
            tracing::error!(
                session_id = %self.id,
                generation,
                status = ?err.status(),
                error = %err,
                "Session failed"
            );
            self.bus.publish(InboundEvent::Error(err.to_string()));
        }
    }

    fn configure_message(&self, voice: &str) -> ControlMessage {
        ControlMessage::Configure(ConfigureData {
            voice_id: voice.to_string(),
            model_id: self.profile.model_id.clone(),
            agent_context: self.profile.agent_context(),
        })
    }

    fn current_dispatcher(&self) -> Option<Arc<ControlDispatcher>> {
        let guard = self.dispatcher.read();
        match guard.as_ref() {
            Some((gen, dispatcher)) if self.state.is_current(*gen) => Some(dispatcher.clone()),
            _ => None,
        }
    }

    fn clear_dispatcher(&self, generation: u64) {
        let mut guard = self.dispatcher.write();
        if matches!(guard.as_ref(), Some((gen, _)) if *gen == generation) {
            *guard = None;
        }
    }

    fn ensure_current(&self, generation: u64) -> Result<()> {
        if self.state.is_current(generation) {
            Ok(())
        } else {
            Err(SessionError::StaleConnection)
        }
    }

    async fn handle_peer_event(
        &self,
        generation: u64,
        dispatcher: &ControlDispatcher,
        event: PeerEvent,
    ) {
        match event {
            PeerEvent::ControlChannelOpen => {
                if self
                    .state
                    .apply(generation, Transition::ChannelOpened)
                    .is_err()
                {
                    return;
                }
                if let Err(e) = dispatcher.on_open().await {
                    self.fail(generation, e).await;
                }
            },
            PeerEvent::ControlChannelClosed => {
                if self
                    .state
                    .apply(generation, Transition::ChannelClosed)
                    .is_err()
                {
                    return;
                }
                // Without a control channel the session cannot be listening,
                // so the microphone goes with it.
                match self.release_capture(generation).await {
                    Ok(true) => {
                        tracing::warn!(
                            session_id = %self.id,
                            generation,
                            "Control channel closed while listening, capture released"
                        );
                    },
                    Ok(false) => {},
                    Err(e) => {
                        tracing::debug!(session_id = %self.id, generation, error = %e, "Capture already gone");
                    },
                }
            },
            PeerEvent::ControlMessage(raw) => dispatcher.on_raw_message(&raw),
            PeerEvent::RemoteAudio(sink) => {
                if self.lifecycle.install_sink(generation, sink.clone()).is_err() {
                    let _ = sink.detach().await;
                }
            },
            PeerEvent::TransportState(state) if state.is_fatal() => {
                self.fail(
                    generation,
                    SessionError::TransportFailure(format!("peer connection {:?}", state)),
                )
                .await;
            },
            PeerEvent::TransportState(TransportState::Disconnected) => {
                tracing::warn!(session_id = %self.id, generation, "Peer transport disconnected");
                self.bus.publish(InboundEvent::LifecycleSignal(
                    LifecycleKind::TransportDisconnected,
                ));
            },
            PeerEvent::TransportState(state) => {
                tracing::debug!(session_id = %self.id, generation, ?state, "Peer transport state");
            },
        }
    }
}

/// Held for the duration of a start or stop of listening
struct ListenGuard<'a>(&'a AtomicBool);

impl<'a> ListenGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| SessionError::ListenInFlight)
    }
}

impl Drop for ListenGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn spawn_event_pump(
    session: Weak<SessionInner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<PeerEvent>,
    dispatcher: Arc<ControlDispatcher>,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(inner) = session.upgrade() else {
                break;
            };

            if !inner.state.is_current(generation) {
                if let PeerEvent::RemoteAudio(sink) = event {
                    let _ = sink.detach().await;
                }
                break;
            }

            inner.handle_peer_event(generation, &dispatcher, event).await;
        }
        tracing::trace!(generation, "Peer event pump finished");
    });
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let resources = self.lifecycle.take_all();
        if resources.is_empty() {
            return;
        }

        let media = self.lifecycle.media().clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    resources.release(&media).await;
                });
            },
            Err(_) => {
                media.release(resources.capture_stream.as_ref());
                tracing::warn!(session_id = %self.id, "Session dropped outside a runtime");
            },
        }
    }
}
