//! Configuration management for the receptionist voice session
//!
//! Supports loading configuration from:
//! - YAML/TOML/JSON files under `config/`
//! - Environment variables (RECEPTIONIST__ prefix)
//! - Agent profile files exported by the dashboard

pub mod constants;
pub mod profile;
pub mod settings;

pub use profile::{load_agent_profile, validate_profile};
pub use settings::{
    load_settings, AuthConfig, CaptureHints, ObservabilityConfig, RuntimeEnvironment,
    ServerConfig, SessionConfig, Settings, TurnServerConfig, UpstreamConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
