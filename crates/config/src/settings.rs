//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{credentials, endpoints, timeouts, webrtc};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Credential/signaling service configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream realtime provider
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Client session configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_upstream()?;
        self.validate_session()?;

        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if server.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.timeout_seconds".to_string(),
                message: "Timeout must be at least 1 second".to_string(),
            });
        }

        if self.environment.is_production() && server.auth.enabled && server.auth.api_key.is_none()
        {
            return Err(ConfigError::InvalidValue {
                field: "server.auth.api_key".to_string(),
                message: "API key must be set when auth is enabled in production".to_string(),
            });
        }

        if self.environment.is_strict() && server.cors_enabled && server.cors_origins.is_empty() {
            tracing::warn!(
                environment = ?self.environment,
                "CORS is enabled without explicit origins, any origin will be allowed"
            );
        }

        Ok(())
    }

    fn validate_upstream(&self) -> Result<(), ConfigError> {
        let upstream = &self.upstream;

        if !upstream.base_url.starts_with("http://") && !upstream.base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue {
                field: "upstream.base_url".to_string(),
                message: format!("Must be an http(s) URL, got {}", upstream.base_url),
            });
        }

        if upstream.credential_ttl_secs == 0 || upstream.credential_ttl_secs > credentials::MAX_TTL_SECS
        {
            return Err(ConfigError::InvalidValue {
                field: "upstream.credential_ttl_secs".to_string(),
                message: format!(
                    "Must be between 1 and {}, got {}",
                    credentials::MAX_TTL_SECS,
                    upstream.credential_ttl_secs
                ),
            });
        }

        if upstream.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "upstream.request_timeout_ms".to_string(),
                message: "Must be at least 1ms".to_string(),
            });
        }

        if self.environment.is_production() && upstream.api_key.is_none() {
            return Err(ConfigError::MissingField("upstream.api_key".to_string()));
        }

        Ok(())
    }

    fn validate_session(&self) -> Result<(), ConfigError> {
        let session = &self.session;

        if session.ice_gather_timeout_ms == 0 || session.ice_gather_timeout_ms > 60_000 {
            return Err(ConfigError::InvalidValue {
                field: "session.ice_gather_timeout_ms".to_string(),
                message: format!(
                    "Must be between 1 and 60000, got {}",
                    session.ice_gather_timeout_ms
                ),
            });
        }

        if session.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.request_timeout_ms".to_string(),
                message: "Must be at least 1ms".to_string(),
            });
        }

        if session.control_channel_label.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "session.control_channel_label".to_string(),
                message: "Label cannot be empty".to_string(),
            });
        }

        if session.model_id.trim().is_empty() {
            return Err(ConfigError::MissingField("session.model_id".to_string()));
        }

        for (i, turn) in session.turn_servers.iter().enumerate() {
            if !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:") {
                return Err(ConfigError::InvalidValue {
                    field: format!("session.turn_servers[{}].url", i),
                    message: format!("Expected a turn: or turns: URL, got {}", turn.url),
                });
            }
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_seconds: default_timeout(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            auth: AuthConfig::default(),
        }
    }
}

/// Client key guarding the credential and signaling relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Require the client key (off for local development)
    #[serde(default)]
    pub enabled: bool,

    /// Client key, usually from RECEPTIONIST__SERVER__AUTH__API_KEY
    #[serde(default)]
    pub api_key: Option<String>,

    /// Path prefixes that need the key
    #[serde(default = "default_protected_prefixes")]
    pub protected_prefixes: Vec<String>,

    /// Exact paths under a protected prefix that stay open
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_protected_prefixes() -> Vec<String> {
    vec!["/api/agent/".to_string(), "/admin/".to_string()]
}

fn default_public_paths() -> Vec<String> {
    vec!["/api/agent/voices".to_string()]
}

impl AuthConfig {
    /// Whether a request to `path` must carry the client key
    pub fn requires_key(&self, path: &str) -> bool {
        self.enabled
            && self.protected_prefixes.iter().any(|p| path.starts_with(p.as_str()))
            && !self.public_paths.iter().any(|p| p == path)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            protected_prefixes: default_protected_prefixes(),
            public_paths: default_public_paths(),
        }
    }
}

/// Upstream realtime provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Provider base URL
    #[serde(default = "default_upstream_url")]
    pub base_url: String,

    /// Long-lived provider key; never leaves the server
    #[serde(default = "default_upstream_api_key")]
    pub api_key: Option<String>,

    /// Model used when a request does not name one
    #[serde(default = "default_model_id")]
    pub default_model: String,

    /// Lifetime requested for ephemeral credentials
    #[serde(default = "default_credential_ttl")]
    pub credential_ttl_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_upstream_url() -> String {
    endpoints::UPSTREAM_DEFAULT.to_string()
}

fn default_upstream_api_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
}

fn default_model_id() -> String {
    receptionist_core::DEFAULT_MODEL_ID.to_string()
}

fn default_credential_ttl() -> u64 {
    credentials::TTL_SECS
}

fn default_request_timeout() -> u64 {
    timeouts::HTTP_REQUEST_MS
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
            api_key: default_upstream_api_key(),
            default_model: default_model_id(),
            credential_ttl_secs: default_credential_ttl(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

/// Client-side session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Credential endpoint of the trusted backend
    #[serde(default = "default_credential_endpoint")]
    pub credential_endpoint: String,

    /// Signaling endpoint of the trusted backend
    #[serde(default = "default_signaling_endpoint")]
    pub signaling_endpoint: String,

    /// Realtime model requested for new sessions
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Voice used when the agent profile does not name one
    #[serde(default = "default_voice")]
    pub default_voice: String,

    /// Bounded wait for ICE gathering before sending the offer
    #[serde(default = "default_gather_timeout")]
    pub ice_gather_timeout_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_control_channel_label")]
    pub control_channel_label: String,

    /// STUN servers for WebRTC NAT traversal
    #[serde(default = "default_stun_servers")]
    pub stun_servers: Vec<String>,

    /// TURN servers for WebRTC relay (when STUN fails)
    #[serde(default)]
    pub turn_servers: Vec<TurnServerConfig>,

    /// Processing hints requested from the capture device
    #[serde(default)]
    pub capture: CaptureHints,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (e.g., "turn:turn.example.com:3478")
    pub url: String,
    /// Username for TURN authentication
    pub username: String,
    /// Credential for TURN authentication
    pub credential: String,
}

/// Capture processing hints
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CaptureHints {
    #[serde(default = "default_true")]
    pub echo_cancellation: bool,
    #[serde(default = "default_true")]
    pub noise_suppression: bool,
    #[serde(default = "default_true")]
    pub auto_gain_control: bool,
}

impl Default for CaptureHints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

fn default_credential_endpoint() -> String {
    endpoints::CREDENTIAL_DEFAULT.to_string()
}
fn default_signaling_endpoint() -> String {
    endpoints::SIGNALING_DEFAULT.to_string()
}
fn default_voice() -> String {
    receptionist_core::Voice::default().id().to_string()
}
fn default_gather_timeout() -> u64 {
    timeouts::ICE_GATHER_MS
}
fn default_control_channel_label() -> String {
    webrtc::CONTROL_CHANNEL_LABEL.to_string()
}
fn default_stun_servers() -> Vec<String> {
    vec![webrtc::DEFAULT_STUN.to_string()]
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credential_endpoint: default_credential_endpoint(),
            signaling_endpoint: default_signaling_endpoint(),
            model_id: default_model_id(),
            default_voice: default_voice(),
            ice_gather_timeout_ms: default_gather_timeout(),
            request_timeout_ms: default_request_timeout(),
            control_channel_label: default_control_channel_label(),
            stun_servers: default_stun_servers(),
            turn_servers: Vec::new(),
            capture: CaptureHints::default(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Enable metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Sources, later ones overriding earlier ones:
/// 1. `config/default.{yaml,toml,json}`
/// 2. `config/{env}.{yaml,toml,json}`
/// 3. `RECEPTIONIST__SECTION__FIELD` environment variables
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    // Load default config
    builder = builder.add_source(File::with_name("config/default").required(false));

    // Load environment-specific config
    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    // Load from environment variables
    builder = builder.add_source(
        Environment::with_prefix("RECEPTIONIST")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    // Validate
    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.session.control_channel_label, "events");
        assert_eq!(settings.session.ice_gather_timeout_ms, 5_000);
        assert_eq!(settings.upstream.credential_ttl_secs, 60);
        assert_eq!(settings.session.default_voice, "alloy");
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());

        settings.session.ice_gather_timeout_ms = 0;
        assert!(settings.validate().is_err());

        settings.session.ice_gather_timeout_ms = 2_000;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_upstream_validation() {
        let mut settings = Settings::default();

        settings.upstream.base_url = "ftp://example.com".to_string();
        assert!(settings.validate_upstream().is_err());

        settings.upstream.base_url = "https://api.openai.com".to_string();
        settings.upstream.credential_ttl_secs = 0;
        assert!(settings.validate_upstream().is_err());

        settings.upstream.credential_ttl_secs = credentials::MAX_TTL_SECS + 1;
        assert!(settings.validate_upstream().is_err());
    }

    #[test]
    fn test_production_requires_upstream_key() {
        let mut settings = Settings {
            environment: RuntimeEnvironment::Production,
            ..Default::default()
        };
        settings.upstream.api_key = None;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingField(field)) if field == "upstream.api_key"
        ));

        settings.upstream.api_key = Some("sk-test".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_production_auth_requires_key() {
        let mut settings = Settings {
            environment: RuntimeEnvironment::Production,
            ..Default::default()
        };
        settings.upstream.api_key = Some("sk-test".to_string());
        settings.server.auth.enabled = true;
        assert!(settings.validate_server().is_err());

        settings.server.auth.api_key = Some("dashboard-key".to_string());
        assert!(settings.validate_server().is_ok());
    }

    #[test]
    fn test_relay_paths_require_key() {
        let mut auth = AuthConfig::default();
        assert!(!auth.requires_key("/api/agent/credential"));

        auth.enabled = true;
        assert!(auth.requires_key("/api/agent/credential"));
        assert!(auth.requires_key("/api/agent/signal"));
        assert!(auth.requires_key("/admin/reload-config"));
        assert!(!auth.requires_key("/api/agent/voices"));
        assert!(!auth.requires_key("/health"));
        assert!(!auth.requires_key("/metrics"));
    }

    #[test]
    fn test_turn_server_url_validation() {
        let mut settings = Settings::default();
        settings.session.turn_servers.push(TurnServerConfig {
            url: "stun:turn.example.com:3478".to_string(),
            username: "u".to_string(),
            credential: "c".to_string(),
        });
        assert!(settings.validate_session().is_err());

        settings.session.turn_servers[0].url = "turn:turn.example.com:3478".to_string();
        assert!(settings.validate_session().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
session:
  model_id: gpt-4o-realtime-preview
  capture:
    echo_cancellation: false
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.session.model_id, "gpt-4o-realtime-preview");
        assert!(!settings.session.capture.echo_cancellation);
        assert!(settings.session.capture.noise_suppression);
        assert_eq!(settings.server.port, 8080);
    }
}
