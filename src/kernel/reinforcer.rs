//! Phrase reinforcement.
//!
//! Models sometimes narrate the pump starting without emitting a tag. When
//! that happens we append the tag ourselves so the hardware matches the
//! story. Best effort: missed phrasings are fine, and false positives are
//! only held back by the guards below. Pump only.

use tracing::info;

use super::directive::DeviceRecord;
use super::patterns::{explicit_pump_regex, pulse_regexes, pump_activity_regexes};
use super::session::{is_pump_currently_running, SessionState};
use crate::config::ControlSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reinforcement {
    pub text: String,
    pub reinforced: bool,
    pub matched_phrase: Option<String>,
    pub is_pulse: bool,
}

impl Reinforcement {
    fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            reinforced: false,
            matched_phrase: None,
            is_pulse: false,
        }
    }
}

/// First phrase in the activity table that matches, as the matched substring.
pub fn detect_pump_activity(text: &str) -> Option<String> {
    pump_activity_regexes()
        .iter()
        .find_map(|re| re.find(text))
        .map(|m| m.as_str().to_string())
}

pub fn detect_pulse(text: &str) -> bool {
    pulse_regexes().iter().any(|re| re.is_match(text))
}

pub fn reinforce(
    text: &str,
    devices: &[DeviceRecord],
    session: &SessionState,
    settings: &ControlSettings,
) -> Reinforcement {
    if !settings.llm_device_control {
        return Reinforcement::unchanged(text);
    }
    if explicit_pump_regex().is_match(text) {
        return Reinforcement::unchanged(text);
    }
    if is_pump_currently_running(devices, session) {
        return Reinforcement::unchanged(text);
    }

    let Some(phrase) = detect_pump_activity(text) else {
        return Reinforcement::unchanged(text);
    };

    let is_pulse = detect_pulse(text);
    let tag = if is_pulse {
        format!("[pump:pulse:{}]", settings.llm_device_control_pulse_duration)
    } else {
        "[pump on]".to_string()
    };

    info!("Reinforcing pump {} from phrase {:?}", if is_pulse { "pulse" } else { "on" }, phrase);

    Reinforcement {
        text: format!("{} {}", text.trim(), tag),
        reinforced: true,
        matched_phrase: Some(phrase),
        is_pulse,
    }
}
