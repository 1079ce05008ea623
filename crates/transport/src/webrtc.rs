//! WebRTC peer implementation
//!
//! Native counterpart of the browser peer connection used by the voice
//! session: one Opus audio transceiver in send+receive mode, one JSON data
//! channel, and non-trickle ICE (the offer is sent once gathering settles).

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use receptionist_config::constants::webrtc::{
    ICE_DISCONNECTED_TIMEOUT_SECS, ICE_FAILED_TIMEOUT_SECS, ICE_KEEPALIVE_INTERVAL_SECS,
    OPUS_CLOCK_RATE, OPUS_PAYLOAD_TYPE,
};
use receptionist_config::SessionConfig;
use receptionist_core::{
    AudioFrame, AudioSink, CaptureTrack, Channels, ControlChannel, PeerConnection, PeerConnector,
    PeerEvent, SampleRate, TransportError, TransportState,
};

use crate::codec::{OpusDecoder, OpusEncoder};

/// ICE server configuration
#[derive(Debug, Clone)]
pub struct IceServer {
    /// Server URLs (stun: or turn:)
    pub urls: Vec<String>,
    /// Username (for TURN)
    pub username: Option<String>,
    /// Credential (for TURN)
    pub credential: Option<String>,
}

impl Default for IceServer {
    fn default() -> Self {
        Self {
            urls: vec![receptionist_config::constants::webrtc::DEFAULT_STUN.to_string()],
            username: None,
            credential: None,
        }
    }
}

/// WebRTC configuration
#[derive(Debug, Clone)]
pub struct WebRtcConfig {
    /// ICE servers
    pub ice_servers: Vec<IceServer>,
    /// Channel count advertised for the Opus track
    pub opus_channels: u16,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer::default()],
            opus_channels: 2,
        }
    }
}

impl WebRtcConfig {
    /// Build from session settings
    pub fn from_settings(session: &SessionConfig) -> Self {
        let mut ice_servers: Vec<IceServer> = session
            .stun_servers
            .iter()
            .map(|url| IceServer {
                urls: vec![url.clone()],
                username: None,
                credential: None,
            })
            .collect();

        ice_servers.extend(session.turn_servers.iter().map(|turn| IceServer {
            urls: vec![turn.url.clone()],
            username: Some(turn.username.clone()),
            credential: Some(turn.credential.clone()),
        }));

        Self {
            ice_servers,
            ..Default::default()
        }
    }

    fn opus_capability(&self) -> RTCRtpCodecCapability {
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_string(),
            clock_rate: OPUS_CLOCK_RATE,
            channels: self.opus_channels,
            sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
            rtcp_feedback: vec![],
        }
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        let ice_servers = self
            .ice_servers
            .iter()
            .map(|s| RTCIceServer {
                urls: s.urls.clone(),
                username: s.username.clone().unwrap_or_default(),
                credential: s.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect();

        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

/// Creates native peer connections
pub struct WebRtcConnector {
    config: WebRtcConfig,
    playback: Option<mpsc::Sender<AudioFrame>>,
}

impl WebRtcConnector {
    pub fn new(config: WebRtcConfig) -> Self {
        Self {
            config,
            playback: None,
        }
    }

    /// Forward decoded remote audio to `playback`
    pub fn with_playback(mut self, playback: mpsc::Sender<AudioFrame>) -> Self {
        self.playback = Some(playback);
        self
    }

    /// Create WebRTC API with media engine
    fn create_api(&self) -> Result<API, TransportError> {
        let mut media_engine = MediaEngine::default();

        media_engine
            .register_codec(
                RTCRtpCodecParameters {
                    capability: self.config.opus_capability(),
                    payload_type: OPUS_PAYLOAD_TYPE,
                    stats_id: String::new(),
                },
                RTPCodecType::Audio,
            )
            .map_err(|e| TransportError::Internal(e.to_string()))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| TransportError::Internal(e.to_string()))?;

        let mut setting_engine = SettingEngine::default();
        setting_engine.set_ice_timeouts(
            Some(Duration::from_secs(ICE_DISCONNECTED_TIMEOUT_SECS)),
            Some(Duration::from_secs(ICE_FAILED_TIMEOUT_SECS)),
            Some(Duration::from_secs(ICE_KEEPALIVE_INTERVAL_SECS)),
        );

        Ok(APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(setting_engine)
            .build())
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn create(
        &self,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>, TransportError> {
        let api = self.create_api()?;
        let pc = api
            .new_peer_connection(self.config.rtc_configuration())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let peer = WebRtcPeer::new(Arc::new(pc), self.config.clone(), events, self.playback.clone());
        Ok(Arc::new(peer))
    }
}

/// One native peer connection
pub struct WebRtcPeer {
    id: String,
    pc: Arc<RTCPeerConnection>,
    config: WebRtcConfig,
    events: mpsc::UnboundedSender<PeerEvent>,
    audio_track: Mutex<Option<Arc<TrackLocalStaticSample>>>,
    capture_pump: Mutex<Option<JoinHandle<()>>>,
    gathering_rx: Mutex<Option<oneshot::Receiver<()>>>,
    closed: AtomicBool,
}

impl WebRtcPeer {
    fn new(
        pc: Arc<RTCPeerConnection>,
        config: WebRtcConfig,
        events: mpsc::UnboundedSender<PeerEvent>,
        playback: Option<mpsc::Sender<AudioFrame>>,
    ) -> Self {
        let id = uuid::Uuid::new_v4().to_string();

        // Connection state changes
        let state_tx = events.clone();
        let peer_id = id.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let state = match s {
                RTCPeerConnectionState::New => TransportState::New,
                RTCPeerConnectionState::Connecting => TransportState::Connecting,
                RTCPeerConnectionState::Connected => TransportState::Connected,
                RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
                RTCPeerConnectionState::Failed => TransportState::Failed,
                RTCPeerConnectionState::Closed => TransportState::Closed,
                _ => return Box::pin(async {}),
            };
            tracing::debug!(peer = %peer_id, state = ?state, "Peer connection state changed");
            let _ = state_tx.send(PeerEvent::TransportState(state));
            Box::pin(async {})
        }));

        // Gathering completion
        let (gather_tx, gather_rx) = oneshot::channel::<()>();
        let gather_tx = Arc::new(Mutex::new(Some(gather_tx)));
        pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
            tracing::debug!(state = ?state, "ICE gathering state changed");
            if state == RTCIceGathererState::Complete {
                if let Some(tx) = gather_tx.lock().take() {
                    let _ = tx.send(());
                }
            }
            Box::pin(async {})
        }));

        // Remote audio
        let track_tx = events.clone();
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            tracing::info!(kind = ?track.kind(), ssrc = track.ssrc(), "Received remote track");
            match WebRtcAudioSink::start(track, playback.clone()) {
                Ok(sink) => {
                    let _ = track_tx.send(PeerEvent::RemoteAudio(Arc::new(sink)));
                },
                Err(e) => tracing::error!(error = %e, "Failed to start remote audio sink"),
            }
            Box::pin(async {})
        }));

        Self {
            id,
            pc,
            config,
            events,
            audio_track: Mutex::new(None),
            capture_pump: Mutex::new(None),
            gathering_rx: Mutex::new(Some(gather_rx)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    fn stop_pump(&self) -> bool {
        match self.capture_pump.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            },
            None => false,
        }
    }
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    async fn create_control_channel(
        &self,
        label: &str,
    ) -> Result<Arc<dyn ControlChannel>, TransportError> {
        self.ensure_open()?;

        let dc = self
            .pc
            .create_data_channel(label, None)
            .await
            .map_err(|e| TransportError::Channel(format!("Failed to create data channel: {}", e)))?;

        let open_tx = self.events.clone();
        let open_label = label.to_string();
        dc.on_open(Box::new(move || {
            tracing::info!(label = %open_label, "Control channel opened");
            let _ = open_tx.send(PeerEvent::ControlChannelOpen);
            Box::pin(async {})
        }));

        let close_tx = self.events.clone();
        let close_label = label.to_string();
        dc.on_close(Box::new(move || {
            tracing::info!(label = %close_label, "Control channel closed");
            let _ = close_tx.send(PeerEvent::ControlChannelClosed);
            Box::pin(async {})
        }));

        let msg_tx = self.events.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            match String::from_utf8(msg.data.to_vec()) {
                Ok(text) => {
                    let _ = msg_tx.send(PeerEvent::ControlMessage(text));
                },
                Err(_) => {
                    tracing::warn!(len = msg.data.len(), "Dropping non-UTF-8 control message");
                },
            }
            Box::pin(async {})
        }));

        Ok(Arc::new(WebRtcControlChannel {
            label: label.to_string(),
            dc,
        }))
    }

    async fn add_audio_transceiver(&self) -> Result<(), TransportError> {
        self.ensure_open()?;

        let track = Arc::new(TrackLocalStaticSample::new(
            self.config.opus_capability(),
            "audio".to_string(),
            format!("receptionist-{}", self.id),
        ));

        // add_track negotiates a sendrecv transceiver
        let rtp_sender = self
            .pc
            .add_track(track.clone() as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| TransportError::Media(format!("Failed to add audio track: {}", e)))?;

        // Drain RTCP so interceptors keep running
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while rtp_sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        *self.audio_track.lock() = Some(track);
        Ok(())
    }

    async fn create_offer(&self) -> Result<String, TransportError> {
        self.ensure_open()?;

        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("Failed to create offer: {}", e)))?;

        // Setting the local description starts ICE gathering
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(|e| {
                TransportError::ConnectionFailed(format!("Failed to set local description: {}", e))
            })?;

        Ok(offer.sdp)
    }

    async fn wait_for_gathering(&self, timeout: Duration) -> bool {
        let rx = self.gathering_rx.lock().take();
        let Some(rx) = rx else {
            return true;
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(())) => {
                tracing::debug!("ICE gathering completed");
                true
            },
            Ok(Err(_)) => {
                tracing::debug!("ICE gathering channel closed (possibly already complete)");
                true
            },
            Err(_) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "ICE gathering timed out, proceeding with available candidates"
                );
                false
            },
        }
    }

    async fn local_description(&self) -> Option<String> {
        self.pc.local_description().await.map(|desc| desc.sdp)
    }

    async fn apply_answer(&self, sdp: &str) -> Result<(), TransportError> {
        self.ensure_open()?;

        let answer = RTCSessionDescription::answer(sdp.to_string())
            .map_err(|e| TransportError::ConnectionFailed(format!("Invalid answer SDP: {}", e)))?;

        self.pc.set_remote_description(answer).await.map_err(|e| {
            TransportError::ConnectionFailed(format!("Failed to set remote description: {}", e))
        })
    }

    async fn attach_capture(&self, track: CaptureTrack) -> Result<(), TransportError> {
        self.ensure_open()?;

        let audio_track = self
            .audio_track
            .lock()
            .clone()
            .ok_or_else(|| TransportError::Media("No audio transceiver".to_string()))?;
        let mut frames = track
            .take_frames()
            .ok_or_else(|| TransportError::Media("Capture track already attached".to_string()))?;
        let encoder = OpusEncoder::new(track.sample_rate(), track.channels())?;
        let stopped = track.stop_flag();
        let track_id = track.id().to_string();

        let pump = tokio::spawn(async move {
            let frame_len = encoder.frame_len();
            let frame_duration = Duration::from_millis(20);
            let mut pending: Vec<f32> = Vec::with_capacity(frame_len * 2);

            while let Some(frame) = frames.recv().await {
                if stopped.load(Ordering::SeqCst) {
                    break;
                }
                pending.extend_from_slice(&frame.samples);

                while pending.len() >= frame_len {
                    let chunk: Vec<f32> = pending.drain(..frame_len).collect();
                    let packet = match encoder.encode(&chunk) {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::warn!(error = %e, "Dropping capture frame");
                            continue;
                        },
                    };

                    let sample = Sample {
                        data: Bytes::from(packet),
                        duration: frame_duration,
                        ..Default::default()
                    };
                    if let Err(e) = audio_track.write_sample(&sample).await {
                        tracing::warn!(error = %e, "Failed to write capture sample");
                        return;
                    }
                }
            }
            tracing::debug!(track = %track_id, "Capture pump finished");
        });

        if let Some(previous) = self.capture_pump.lock().replace(pump) {
            previous.abort();
        }

        tracing::info!(track = %track.id(), rate = track.sample_rate().as_u32(), "Capture attached");
        Ok(())
    }

    async fn detach_capture(&self) -> Result<(), TransportError> {
        if self.stop_pump() {
            tracing::info!("Capture detached");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.stop_pump();
        self.pc
            .close()
            .await
            .map_err(|e| TransportError::Internal(e.to_string()))?;

        tracing::info!(peer = %self.id, "Peer connection closed");
        Ok(())
    }
}

/// Data channel carrying JSON control messages
pub struct WebRtcControlChannel {
    label: String,
    dc: Arc<RTCDataChannel>,
}

#[async_trait]
impl ControlChannel for WebRtcControlChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        self.dc.ready_state() == RTCDataChannelState::Open
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.dc
            .send_text(text)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Channel(format!("Failed to send: {}", e)))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.dc
            .close()
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))
    }
}

/// Decodes remote Opus audio for playback
pub struct WebRtcAudioSink {
    id: String,
    decode_task: Mutex<Option<JoinHandle<()>>>,
}

impl WebRtcAudioSink {
    fn start(
        track: Arc<TrackRemote>,
        playback: Option<mpsc::Sender<AudioFrame>>,
    ) -> Result<Self, TransportError> {
        let decoder = OpusDecoder::new(SampleRate::Hz48000, Channels::Mono)?;
        let id = format!("sink-{}", track.ssrc());

        let task = tokio::spawn(async move {
            let mut sequence = 0u64;
            loop {
                match track.read_rtp().await {
                    Ok((rtp_packet, _)) => {
                        let payload = &rtp_packet.payload;
                        if payload.is_empty() {
                            continue;
                        }

                        let samples = match decoder.decode(payload) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("Opus decode error: {}", e);
                                match decoder.decode_plc() {
                                    Ok(s) => s,
                                    Err(_) => continue,
                                }
                            },
                        };

                        if let Some(tx) = &playback {
                            let frame =
                                AudioFrame::new(samples, SampleRate::Hz48000, Channels::Mono, sequence);
                            if tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                        sequence += 1;
                    },
                    Err(e) => {
                        tracing::debug!("Remote track ended: {}", e);
                        break;
                    },
                }
            }
        });

        Ok(Self {
            id,
            decode_task: Mutex::new(Some(task)),
        })
    }
}

#[async_trait]
impl AudioSink for WebRtcAudioSink {
    fn id(&self) -> &str {
        &self.id
    }

    async fn detach(&self) -> Result<(), TransportError> {
        if let Some(task) = self.decode_task.lock().take() {
            task.abort();
            tracing::debug!(sink = %self.id, "Remote audio sink detached");
        }
        Ok(())
    }
}
