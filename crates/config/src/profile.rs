//! Agent profile loading
//!
//! Profiles are exported by the dashboard as YAML or JSON. The format is
//! picked from the file extension; anything that is not `.json` is read as
//! YAML, which also accepts JSON documents.

use std::path::Path;

use receptionist_core::{AgentProfile, Voice};

use crate::ConfigError;

/// Load and validate an agent profile from disk
pub fn load_agent_profile(path: impl AsRef<Path>) -> Result<AgentProfile, ConfigError> {
    let path = path.as_ref();

    let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.display().to_string()),
        _ => ConfigError::ParseError(format!("{}: {}", path.display(), e)),
    })?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let profile: AgentProfile = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?
    } else {
        serde_yaml::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?
    };

    validate_profile(&profile)?;

    tracing::debug!(
        path = %path.display(),
        voice = %profile.voice_id,
        model = %profile.model_id,
        "Loaded agent profile"
    );

    Ok(profile)
}

/// Check a profile before it is handed to a session
pub fn validate_profile(profile: &AgentProfile) -> Result<(), ConfigError> {
    if profile.voice_id.parse::<Voice>().is_err() {
        return Err(ConfigError::InvalidValue {
            field: "voiceId".to_string(),
            message: format!("Unknown voice {}", profile.voice_id),
        });
    }

    if profile.model_id.trim().is_empty() {
        return Err(ConfigError::MissingField("modelId".to_string()));
    }

    Ok(())
}
