//! Agent profile supplied by the surrounding application

use serde::{Deserialize, Serialize};

/// Menu item rendered into the agent context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub description: String,
}

/// Menu category with its items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuCategory {
    pub name: String,
    #[serde(default)]
    pub items: Vec<MenuItem>,
}

/// Read-only agent configuration for one session.
///
/// Owned by the external configuration store; the session never persists
/// or mutates it. Both camelCase and snake_case keys are accepted so the
/// record can be loaded straight from the dashboard's database export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    #[serde(alias = "voice_id", default = "default_voice_id")]
    pub voice_id: String,

    #[serde(alias = "model_id", alias = "model", default = "default_model_id")]
    pub model_id: String,

    #[serde(alias = "greeting_text", alias = "agent_greeting", default)]
    pub greeting_text: String,

    #[serde(alias = "store_hours_text", alias = "agent_store_hours", default)]
    pub store_hours_text: String,

    #[serde(
        alias = "daily_specials_text",
        alias = "agent_daily_specials",
        default
    )]
    pub daily_specials_text: String,

    #[serde(alias = "menu_enabled", default)]
    pub menu_enabled: bool,

    /// Menu rendered into the context when `menu_enabled` is set
    #[serde(default)]
    pub menu: Vec<MenuCategory>,
}

fn default_voice_id() -> String {
    crate::Voice::default().id().to_string()
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

/// Realtime model used when a profile does not name one
pub const DEFAULT_MODEL_ID: &str = "gpt-4o-mini-realtime-preview-2024-12-17";

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            voice_id: default_voice_id(),
            model_id: default_model_id(),
            greeting_text: String::new(),
            store_hours_text: String::new(),
            daily_specials_text: String::new(),
            menu_enabled: false,
            menu: Vec::new(),
        }
    }
}

impl AgentProfile {
    /// Render the instruction text pushed to the provider on configure.
    ///
    /// Returns `None` when the profile carries nothing worth sending.
    pub fn agent_context(&self) -> Option<String> {
        let mut lines = Vec::new();

        if !self.greeting_text.trim().is_empty() {
            lines.push(format!("Greeting: {}", self.greeting_text.trim()));
        }
        if !self.store_hours_text.trim().is_empty() {
            lines.push(format!("Store Hours: {}", self.store_hours_text.trim()));
        }
        if !self.daily_specials_text.trim().is_empty() {
            lines.push(format!("Daily Specials: {}", self.daily_specials_text.trim()));
        }

        if self.menu_enabled && !self.menu.is_empty() {
            lines.push("\nMenu:".to_string());
            for category in &self.menu {
                lines.push(format!("\n{}:", category.name));
                for item in &category.items {
                    lines.push(format!(
                        "- {} (${:.2}): {}",
                        item.name, item.price, item.description
                    ));
                }
            }
        }

        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}
