use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::directive::{DeviceKind, DeviceRecord};

/// Last known action for one device, as recorded by the session layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceActionState {
    pub state: String,
    #[serde(default)]
    pub cycling: bool,
}

/// Read-only view of the live session the engine consults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Inflation capacity reading, 0-100+.
    #[serde(default)]
    pub capacity: Option<f64>,
    /// Keyed by `"<address>-<TYPE>"`, e.g. `192.168.1.20-PUMP`.
    #[serde(default)]
    pub executed_device_actions: HashMap<String, DeviceActionState>,
}

impl SessionState {
    pub fn capacity(&self) -> f64 {
        self.capacity.unwrap_or(0.0)
    }

    pub fn record_action(&mut self, device: &DeviceRecord, state: &str, cycling: bool) {
        self.executed_device_actions.insert(
            history_key(device),
            DeviceActionState {
                state: state.to_string(),
                cycling,
            },
        );
    }
}

pub fn history_key(device: &DeviceRecord) -> String {
    format!("{}-{}", device.address, device.device_type.type_name())
}

/// True when any configured pump is recorded as on or cycling.
pub fn is_pump_currently_running(devices: &[DeviceRecord], session: &SessionState) -> bool {
    devices
        .iter()
        .filter(|d| d.device_type == DeviceKind::Pump)
        .filter_map(|d| session.executed_device_actions.get(&history_key(d)))
        .any(|entry| entry.state == "on" || entry.cycling)
}
