//! Hand-written mocks for the platform and HTTP seams

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

use receptionist_core::{
    AgentProfile, AudioSink, CaptureConstraints, CaptureDevice, CaptureStream, CaptureTrack,
    Channels, ControlChannel, PeerConnection,
    PeerConnector, PeerEvent, Result, SampleRate, SessionCredential, SessionError,
    TransportError, TransportState, Voice,
};
use receptionist_session::{
    CredentialBroker, SessionDeps, SessionOptions, SignalingClient, VoiceSession,
};
use receptionist_transport::ChannelCaptureDevice;

pub const ANSWER_SDP: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\n";

#[derive(Default)]
pub struct MockBroker {
    pub calls: AtomicUsize,
    pub fail_with: Mutex<Option<SessionError>>,
}

#[async_trait]
impl CredentialBroker for MockBroker {
    async fn fetch_credential(&self, voice_id: &str, _model_id: &str) -> Result<SessionCredential> {
        voice_id.parse::<Voice>()?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_with.lock().clone() {
            return Err(err);
        }
        Ok(SessionCredential {
            token: format!("ek_{}", self.calls.load(Ordering::SeqCst)),
            expires_at: Utc::now() + ChronoDuration::seconds(60),
        })
    }
}

#[derive(Default)]
pub struct MockSignaling {
    pub calls: AtomicUsize,
    /// Signalled when an exchange starts
    pub entered: Notify,
    /// When set, the exchange waits for this before answering
    pub gate: Mutex<Option<Arc<Notify>>>,
    pub fail_with: Mutex<Option<SessionError>>,
    pub tokens: Mutex<Vec<String>>,
}

#[async_trait]
impl SignalingClient for MockSignaling {
    async fn exchange(
        &self,
        credential: &SessionCredential,
        _local_sdp: &str,
        _model_id: &str,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().push(credential.token.clone());
        self.entered.notify_one();

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if let Some(err) = self.fail_with.lock().clone() {
            return Err(err);
        }
        Ok(ANSWER_SDP.to_string())
    }
}

#[derive(Default)]
pub struct MockChannel {
    pub open: AtomicBool,
    pub sent: Mutex<Vec<String>>,
    pub closes: AtomicUsize,
}

#[async_trait]
impl ControlChannel for MockChannel {
    fn label(&self) -> &str {
        "events"
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send_text(&self, text: String) -> std::result::Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Channel("not open".to_string()));
        }
        self.sent.lock().push(text);
        Ok(())
    }

    async fn close(&self) -> std::result::Result<(), TransportError> {
        self.open.store(false, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockSink {
    pub detaches: AtomicUsize,
}

#[async_trait]
impl AudioSink for MockSink {
    fn id(&self) -> &str {
        "mock-sink"
    }

    async fn detach(&self) -> std::result::Result<(), TransportError> {
        self.detaches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockPeer {
    pub events: mpsc::UnboundedSender<PeerEvent>,
    pub channel: Arc<MockChannel>,
    pub sink: Arc<MockSink>,
    pub auto_open: bool,
    pub closed: AtomicBool,
    pub closes: AtomicUsize,
    pub answers: AtomicUsize,
    pub attached: Mutex<Option<CaptureTrack>>,
    pub detaches: AtomicUsize,
}

impl MockPeer {
    /// Open the control channel and report it, as the platform would
    pub fn open_channel(&self) {
        self.channel.open.store(true, Ordering::SeqCst);
        let _ = self.events.send(PeerEvent::ControlChannelOpen);
    }

    /// Close the control channel from the remote side
    pub fn close_channel(&self) {
        self.channel.open.store(false, Ordering::SeqCst);
        let _ = self.events.send(PeerEvent::ControlChannelClosed);
    }

    pub fn deliver(&self, raw: &str) {
        let _ = self.events.send(PeerEvent::ControlMessage(raw.to_string()));
    }

    pub fn report_state(&self, state: TransportState) {
        let _ = self.events.send(PeerEvent::TransportState(state));
    }
}

#[async_trait]
impl PeerConnection for MockPeer {
    async fn create_control_channel(
        &self,
        _label: &str,
    ) -> std::result::Result<Arc<dyn ControlChannel>, TransportError> {
        Ok(self.channel.clone())
    }

    async fn add_audio_transceiver(&self) -> std::result::Result<(), TransportError> {
        Ok(())
    }

    async fn create_offer(&self) -> std::result::Result<String, TransportError> {
        Ok("v=0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n".to_string())
    }

    async fn wait_for_gathering(&self, _timeout: Duration) -> bool {
        true
    }

    async fn local_description(&self) -> Option<String> {
        Some("v=0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=candidate:1\r\n".to_string())
    }

    async fn apply_answer(&self, _sdp: &str) -> std::result::Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.answers.fetch_add(1, Ordering::SeqCst);
        if self.auto_open {
            let _ = self.events.send(PeerEvent::RemoteAudio(self.sink.clone()));
            self.open_channel();
        }
        Ok(())
    }

    async fn attach_capture(&self, track: CaptureTrack) -> std::result::Result<(), TransportError> {
        *self.attached.lock() = Some(track);
        Ok(())
    }

    async fn detach_capture(&self) -> std::result::Result<(), TransportError> {
        if self.attached.lock().take().is_some() {
            self.detaches.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> std::result::Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockConnector {
    pub auto_open: bool,
    pub peers: Mutex<Vec<Arc<MockPeer>>>,
}

impl MockConnector {
    pub fn new(auto_open: bool) -> Self {
        Self {
            auto_open,
            peers: Mutex::new(Vec::new()),
        }
    }

    pub fn last_peer(&self) -> Arc<MockPeer> {
        self.peers.lock().last().cloned().expect("no peer created")
    }

    pub fn created(&self) -> usize {
        self.peers.lock().len()
    }
}

#[async_trait]
impl PeerConnector for MockConnector {
    async fn create(
        &self,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> std::result::Result<Arc<dyn PeerConnection>, TransportError> {
        let peer = Arc::new(MockPeer {
            events,
            channel: Arc::new(MockChannel::default()),
            sink: Arc::new(MockSink {
                detaches: AtomicUsize::new(0),
            }),
            auto_open: self.auto_open,
            closed: AtomicBool::new(false),
            closes: AtomicUsize::new(0),
            answers: AtomicUsize::new(0),
            attached: Mutex::new(None),
            detaches: AtomicUsize::new(0),
        });
        self.peers.lock().push(peer.clone());
        Ok(peer)
    }
}

/// Capture device whose `open()` waits for a release
pub struct GatedCaptureDevice {
    pub inner: Arc<ChannelCaptureDevice>,
    /// Signalled when `open()` is entered
    pub entered: Notify,
    pub gate: Notify,
}

impl GatedCaptureDevice {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ChannelCaptureDevice::new(SampleRate::Hz48000, Channels::Mono)),
            entered: Notify::new(),
            gate: Notify::new(),
        }
    }
}

#[async_trait]
impl CaptureDevice for GatedCaptureDevice {
    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> std::result::Result<CaptureStream, TransportError> {
        self.entered.notify_one();
        self.gate.notified().await;
        self.inner.open(constraints).await
    }

    fn name(&self) -> &str {
        "gated"
    }
}

pub struct Harness {
    pub session: VoiceSession,
    pub broker: Arc<MockBroker>,
    pub signaling: Arc<MockSignaling>,
    pub connector: Arc<MockConnector>,
    pub capture: Arc<ChannelCaptureDevice>,
}

pub fn profile(voice: &str) -> AgentProfile {
    serde_json::from_value(serde_json::json!({
        "voiceId": voice,
        "greetingText": "Welcome to Luigi's, how can I help?",
        "storeHoursText": "11am to 10pm daily",
    }))
    .expect("valid profile")
}

pub fn harness(voice: &str, auto_open: bool) -> Harness {
    let signaling = Arc::new(MockSignaling::default());
    let mut h = harness_with_signaling(voice, auto_open, signaling.clone());
    h.signaling = signaling;
    h
}

pub fn harness_with_signaling(
    voice: &str,
    auto_open: bool,
    signaling: Arc<dyn SignalingClient>,
) -> Harness {
    let capture = Arc::new(ChannelCaptureDevice::new(SampleRate::Hz48000, Channels::Mono));
    build_harness(voice, auto_open, signaling, capture.clone(), capture)
}

/// Harness whose capture device blocks in `open()` until released
pub fn gated_harness(voice: &str) -> (Harness, Arc<GatedCaptureDevice>) {
    let signaling = Arc::new(MockSignaling::default());
    let device = Arc::new(GatedCaptureDevice::new());
    let mut h = build_harness(
        voice,
        true,
        signaling.clone(),
        device.clone(),
        device.inner.clone(),
    );
    h.signaling = signaling;
    (h, device)
}

fn build_harness(
    voice: &str,
    auto_open: bool,
    signaling: Arc<dyn SignalingClient>,
    device: Arc<dyn CaptureDevice>,
    capture: Arc<ChannelCaptureDevice>,
) -> Harness {
    let broker = Arc::new(MockBroker::default());
    let connector = Arc::new(MockConnector::new(auto_open));

    let session = VoiceSession::new(
        profile(voice),
        SessionOptions::default(),
        SessionDeps {
            broker: broker.clone(),
            signaling,
            connector: connector.clone(),
            capture: device,
        },
    );

    Harness {
        session,
        broker,
        // Replaced by `harness` when the mock is the wired client
        signaling: Arc::new(MockSignaling::default()),
        connector,
        capture,
    }
}

/// Wait until the snapshot satisfies `predicate`
pub async fn wait_for<F>(session: &VoiceSession, predicate: F)
where
    F: Fn(&receptionist_core::SessionSnapshot) -> bool,
{
    let mut rx = session.watch();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if predicate(&rx.borrow_and_update()) {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    })
    .await
    .expect("condition not reached in time");
}
