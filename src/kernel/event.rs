use serde::{Deserialize, Serialize};

use super::directive::{Action, DeviceKind};

/// Broadcast to UI listeners. Serialized as `{"event": "<name>", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    PumpSafetyBlock(SafetyBlock),
    AiDeviceControl(DeviceControl),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyBlock {
    pub reason: String,
    pub capacity: f64,
    pub device: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceControl {
    pub device: DeviceKind,
    pub action: Action,
    pub device_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_off: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub const PULSE_COMPLETE: &str = "pulse_complete";
