use serde::{Deserialize, Serialize};
use std::fmt;

/// The three actuator families a tag can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceKind {
    Pump,
    Vibe,
    Tens,
}

impl DeviceKind {
    /// Lowercase keyword used inside tags and timer keys.
    pub fn keyword(&self) -> &'static str {
        match self {
            DeviceKind::Pump => "pump",
            DeviceKind::Vibe => "vibe",
            DeviceKind::Tens => "tens",
        }
    }

    /// Uppercase form used by device records and session history keys.
    pub fn type_name(&self) -> &'static str {
        match self {
            DeviceKind::Pump => "PUMP",
            DeviceKind::Vibe => "VIBE",
            DeviceKind::Tens => "TENS",
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "pump" => Some(DeviceKind::Pump),
            "vibe" => Some(DeviceKind::Vibe),
            "tens" => Some(DeviceKind::Tens),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    On,
    Off,
    Pulse,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::On => "on",
            Action::Off => "off",
            Action::Pulse => "pulse",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One actuator instruction lifted out of model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directive {
    pub device: DeviceKind,
    pub action: Action,
    /// Seconds; only set for pulse tags.
    pub duration: Option<u64>,
    pub raw_match: String,
}

impl Directive {
    /// Canonical tag text for this directive.
    pub fn tag(&self) -> String {
        match (self.action, self.duration) {
            (Action::Pulse, Some(secs)) => format!("[{}:pulse:{}]", self.device, secs),
            _ => format!("[{} {}]", self.device, self.action),
        }
    }
}

/// A configured device as seen by the engine. Owned by the device catalog;
/// the engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_type: DeviceKind,
    #[serde(default)]
    pub is_primary_pump: bool,
    pub brand: String,
    /// Backend-specific address (IP for LAN plugs, cloud id otherwise),
    /// filled in when the backend registers the device.
    pub address: String,
    /// Outlet id on multi-outlet strips.
    #[serde(default)]
    pub child_id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl DeviceRecord {
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.address)
    }

    /// Key into the engine's timer registry.
    pub fn timer_key(&self, kind: DeviceKind) -> String {
        format!("{}-{}", kind.keyword(), self.address)
    }
}

/// Picks the record a directive for `kind` should drive. For pumps the
/// primary-flagged record wins, otherwise the first record of the type.
pub fn resolve_device(devices: &[DeviceRecord], kind: DeviceKind) -> Option<&DeviceRecord> {
    if kind == DeviceKind::Pump {
        if let Some(primary) = devices
            .iter()
            .find(|d| d.device_type == DeviceKind::Pump && d.is_primary_pump)
        {
            return Some(primary);
        }
    }
    devices.iter().find(|d| d.device_type == kind)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub directive: Directive,
    pub success: bool,
    /// Set only when the safety interlock refused the command.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    pub fn succeeded(directive: Directive, device: DeviceRecord, result: serde_json::Value) -> Self {
        Self {
            directive,
            success: true,
            blocked: false,
            result: Some(result),
            device: Some(device),
            error: None,
        }
    }

    pub fn failed(directive: Directive, device: Option<DeviceRecord>, error: impl Into<String>) -> Self {
        Self {
            directive,
            success: false,
            blocked: false,
            result: None,
            device,
            error: Some(error.into()),
        }
    }

    pub fn blocked(directive: Directive, device: DeviceRecord, error: impl Into<String>) -> Self {
        Self {
            blocked: true,
            ..Self::failed(directive, Some(device), error)
        }
    }
}
