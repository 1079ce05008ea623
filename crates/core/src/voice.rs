//! Voice catalogue for the realtime provider

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::SessionError;

/// Voices offered by the realtime speech provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl Voice {
    /// All voices, in the order they are presented to operators
    pub fn all() -> &'static [Voice] {
        &[
            Voice::Alloy,
            Voice::Echo,
            Voice::Fable,
            Voice::Onyx,
            Voice::Nova,
            Voice::Shimmer,
        ]
    }

    /// Wire identifier
    pub fn id(&self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Onyx => "onyx",
            Voice::Nova => "nova",
            Voice::Shimmer => "shimmer",
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Voice::Alloy => "Alloy",
            Voice::Echo => "Echo",
            Voice::Fable => "Fable",
            Voice::Onyx => "Onyx",
            Voice::Nova => "Nova",
            Voice::Shimmer => "Shimmer",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Voice::Alloy => "Neutral and balanced",
            Voice::Echo => "Warm and conversational",
            Voice::Fable => "Expressive storyteller",
            Voice::Onyx => "Deep and authoritative",
            Voice::Nova => "Bright and friendly",
            Voice::Shimmer => "Soft and clear",
        }
    }

    /// Catalogue entry for this voice
    pub fn option(&self) -> VoiceOption {
        VoiceOption {
            id: self.id().to_string(),
            name: self.name().to_string(),
            description: self.description().to_string(),
        }
    }

    /// Catalogue of every voice
    pub fn catalogue() -> Vec<VoiceOption> {
        Self::all().iter().map(Voice::option).collect()
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Voice {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|v| v.id() == s)
            .ok_or_else(|| SessionError::InvalidVoice(s.to_string()))
    }
}

/// A voice as listed in the credential response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceOption {
    pub id: String,
    pub name: String,
    pub description: String,
}
