//! Centralized constants for the voice session
//!
//! Single source of truth for defaults shared by the client session, the
//! transport and the credential/signaling service.

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// Upstream realtime provider
    pub const UPSTREAM_DEFAULT: &str = "https://api.openai.com";

    /// Credential endpoint of the trusted backend
    pub const CREDENTIAL_DEFAULT: &str = "http://127.0.0.1:8080/api/agent/credential";

    /// Signaling endpoint of the trusted backend
    pub const SIGNALING_DEFAULT: &str = "http://127.0.0.1:8080/api/agent/signal";

    /// Upstream path that mints ephemeral session keys
    pub const UPSTREAM_SESSIONS_PATH: &str = "/v1/realtime/sessions";

    /// Upstream path that accepts SDP offers
    pub const UPSTREAM_REALTIME_PATH: &str = "/v1/realtime";
}

/// Timeouts (in milliseconds unless noted)
pub mod timeouts {
    /// Credential and signaling HTTP request timeout (ms)
    pub const HTTP_REQUEST_MS: u64 = 15_000;

    /// Bounded wait for ICE candidate gathering (ms)
    pub const ICE_GATHER_MS: u64 = 5_000;
}

/// Ephemeral credential defaults
pub mod credentials {
    /// Lifetime requested for ephemeral keys (seconds)
    pub const TTL_SECS: u64 = 60;

    /// Upper bound accepted for the requested lifetime (seconds)
    pub const MAX_TTL_SECS: u64 = 600;
}

/// Audio processing defaults
pub mod audio {
    /// Frame duration pushed into the encoder (ms)
    pub const FRAME_MS: u32 = 20;

    /// Frames buffered between a capture device and the encoder
    pub const CAPTURE_CHANNEL_CAPACITY: usize = 50;
}

/// WebRTC configuration constants
pub mod webrtc {
    /// Data channel label used for the control channel
    pub const CONTROL_CHANNEL_LABEL: &str = "events";

    /// Opus RTP payload type
    pub const OPUS_PAYLOAD_TYPE: u8 = 111;

    /// Opus clock rate (Hz)
    pub const OPUS_CLOCK_RATE: u32 = 48000;

    /// ICE disconnected timeout (seconds) - time before considering peer disconnected
    pub const ICE_DISCONNECTED_TIMEOUT_SECS: u64 = 5;

    /// ICE failed timeout (seconds) - time before declaring connection failed
    pub const ICE_FAILED_TIMEOUT_SECS: u64 = 25;

    /// ICE keep-alive interval (seconds)
    pub const ICE_KEEPALIVE_INTERVAL_SECS: u64 = 2;

    /// Default public STUN server
    pub const DEFAULT_STUN: &str = "stun:stun.l.google.com:19302";
}
