use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

pub const DEFAULT_MAX_ON_SECONDS: u64 = 30;
pub const DEFAULT_PULSE_SECONDS: u64 = 3;

/// Top-level settings document. Only the character-control block is read here;
/// everything else in the file belongs to other parts of the app and is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub global_character_controls: ControlSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlSettings {
    /// Master switch for tag-driven device control and phrase reinforcement.
    pub llm_device_control: bool,
    /// Auto-off delay applied after an `on` directive.
    pub llm_device_control_max_seconds: u64,
    /// Pulse length used when a pulse has no explicit duration.
    pub llm_device_control_pulse_duration: u64,
    /// Disables the capacity interlock.
    pub allow_over_inflation: bool,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            llm_device_control: false,
            llm_device_control_max_seconds: DEFAULT_MAX_ON_SECONDS,
            llm_device_control_pulse_duration: DEFAULT_PULSE_SECONDS,
            allow_over_inflation: false,
        }
    }
}

impl Settings {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn controls(&self) -> &ControlSettings {
        &self.global_character_controls
    }
}
