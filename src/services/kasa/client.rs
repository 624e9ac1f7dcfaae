use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::cache::StateCache;
use super::transport::{send_command, DEFAULT_PORT, DEFAULT_TIMEOUT};
use crate::error::KasaError;

/// Relay state of one outlet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutletState {
    pub id: Option<String>,
    pub alias: String,
    pub relay_state: u8,
}

impl OutletState {
    pub fn is_on(&self) -> bool {
        self.relay_state == 1
    }
}

/// One outlet of a multi-outlet strip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildOutlet {
    pub id: String,
    pub index: usize,
    pub alias: String,
    pub relay_state: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StripInfo {
    pub is_strip: bool,
    pub outlet_count: usize,
    pub model: String,
    pub alias: String,
    pub children: Vec<ChildOutlet>,
}

impl StripInfo {
    pub fn any_on(&self) -> bool {
        self.children.iter().any(|c| c.relay_state == 1)
    }
}

/// What `get_state` reports: one relay, or every outlet of a strip when
/// the strip itself is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DeviceState {
    Outlet(OutletState),
    Strip(StripInfo),
}

impl DeviceState {
    /// A whole strip counts as on while any of its outlets is on.
    pub fn is_on(&self) -> bool {
        match self {
            DeviceState::Outlet(outlet) => outlet.is_on(),
            DeviceState::Strip(strip) => strip.any_on(),
        }
    }
}

/// A Kasa plug, or one outlet of a strip when `child_id` is set.
#[derive(Debug, Clone)]
pub struct KasaDevice {
    host: String,
    port: u16,
    child_id: Option<String>,
    timeout: Duration,
    cache: Option<StateCache>,
}

impl KasaDevice {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            child_id: None,
            timeout: DEFAULT_TIMEOUT,
            cache: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_child(mut self, child_id: Option<String>) -> Self {
        self.child_id = child_id;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Route `get_info` through a shared state cache.
    pub fn with_cache(mut self, cache: StateCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn cache_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn send(&self, command: Value) -> Result<Value, KasaError> {
        send_command(&self.host, self.port, &command, self.timeout).await
    }

    /// Add the child context so the strip applies `command` to one outlet.
    pub fn wrap_command(&self, command: Value) -> Value {
        match (&self.child_id, command) {
            (Some(child), Value::Object(mut fields)) => {
                fields.insert("context".to_string(), json!({ "child_ids": [child] }));
                Value::Object(fields)
            }
            (_, command) => command,
        }
    }

    async fn set_relay(&self, state: u8) -> Result<Value, KasaError> {
        let command = self.wrap_command(json!({ "system": { "set_relay_state": { "state": state } } }));
        let result = self.send(command).await;
        if let Some(cache) = &self.cache {
            cache.invalidate(&self.cache_key());
        }
        result
    }

    pub async fn turn_on(&self) -> Result<Value, KasaError> {
        self.set_relay(1).await
    }

    pub async fn turn_off(&self) -> Result<Value, KasaError> {
        self.set_relay(0).await
    }

    /// Full `get_sysinfo` response. Goes through the cache when one is set,
    /// so pollers of different outlets on the same strip share a round trip.
    pub async fn get_info(&self) -> Result<Value, KasaError> {
        let command = json!({ "system": { "get_sysinfo": {} } });
        match &self.cache {
            Some(cache) => {
                let host = self.host.clone();
                let port = self.port;
                let timeout = self.timeout;
                cache
                    .get_or_fetch(&self.cache_key(), move || async move {
                        send_command(&host, port, &command, timeout).await
                    })
                    .await
            }
            None => self.send(command).await,
        }
    }

    /// Relay state for this outlet, for a single plug, or for every outlet
    /// when a strip is addressed without a child id.
    pub async fn get_state(&self) -> Result<DeviceState, KasaError> {
        let info = self.get_info().await?;
        parse_device_state(&info, self.child_id.as_deref())
    }

    pub async fn is_on(&self) -> Result<bool, KasaError> {
        Ok(self.get_state().await?.is_on())
    }

    pub async fn toggle(&self) -> Result<Value, KasaError> {
        if self.is_on().await? {
            self.turn_off().await
        } else {
            self.turn_on().await
        }
    }

    pub async fn get_children(&self) -> Result<StripInfo, KasaError> {
        let info = self.get_info().await?;
        parse_strip_info(&info)
    }

    /// Realtime energy meter readings (metering plugs only).
    pub async fn emeter_realtime(&self) -> Result<Value, KasaError> {
        self.send(self.wrap_command(json!({ "emeter": { "get_realtime": {} } })))
            .await
    }

    pub async fn set_led(&self, on: bool) -> Result<Value, KasaError> {
        let off = if on { 0 } else { 1 };
        self.send(json!({ "system": { "set_led_off": { "off": off } } }))
            .await
    }

    pub async fn reboot(&self, delay_secs: u64) -> Result<Value, KasaError> {
        self.send(json!({ "system": { "reboot": { "delay": delay_secs } } }))
            .await
    }

    pub async fn get_cloud_info(&self) -> Result<Value, KasaError> {
        self.send(json!({ "cnCloud": { "get_info": {} } })).await
    }

    /// Ask the device to list nearby access points.
    pub async fn scan_wifi(&self) -> Result<Value, KasaError> {
        self.send(json!({ "netif": { "get_scaninfo": { "refresh": 1 } } }))
            .await
    }
}

fn sysinfo(info: &Value) -> Result<&Value, KasaError> {
    info.get("system")
        .and_then(|s| s.get("get_sysinfo"))
        .ok_or_else(|| KasaError::InvalidResponse("missing system.get_sysinfo".to_string()))
}

fn relay_value(v: Option<&Value>) -> u8 {
    match v.and_then(Value::as_u64) {
        Some(1) => 1,
        _ => 0,
    }
}

fn str_field(v: &Value, field: &str) -> String {
    v.get(field).and_then(Value::as_str).unwrap_or_default().to_string()
}

pub fn parse_outlet_state(info: &Value, child_id: Option<&str>) -> Result<OutletState, KasaError> {
    let sys = sysinfo(info)?;

    if let (Some(children), Some(child_id)) = (sys.get("children").and_then(Value::as_array), child_id) {
        return children
            .iter()
            .find(|c| c.get("id").and_then(Value::as_str) == Some(child_id))
            .map(|c| OutletState {
                id: Some(child_id.to_string()),
                alias: str_field(c, "alias"),
                relay_state: relay_value(c.get("state")),
            })
            .ok_or_else(|| KasaError::ChildNotFound(child_id.to_string()));
    }

    let relay = sys
        .get("relay_state")
        .ok_or_else(|| KasaError::InvalidResponse("missing relay_state".to_string()))?;
    Ok(OutletState {
        id: None,
        alias: str_field(sys, "alias"),
        relay_state: relay_value(Some(relay)),
    })
}

/// Like [`parse_outlet_state`], except that a strip addressed without a
/// child id reports all of its outlets.
pub fn parse_device_state(info: &Value, child_id: Option<&str>) -> Result<DeviceState, KasaError> {
    let is_strip = sysinfo(info)?.get("children").is_some();
    if is_strip && child_id.is_none() {
        return parse_strip_info(info).map(DeviceState::Strip);
    }
    parse_outlet_state(info, child_id).map(DeviceState::Outlet)
}

pub fn parse_strip_info(info: &Value) -> Result<StripInfo, KasaError> {
    let sys = sysinfo(info)?;
    let children = match sys.get("children").and_then(Value::as_array) {
        Some(children) => children
            .iter()
            .enumerate()
            .map(|(index, c)| ChildOutlet {
                id: str_field(c, "id"),
                index,
                alias: c
                    .get("alias")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Outlet {}", index + 1)),
                relay_state: relay_value(c.get("state")),
            })
            .collect(),
        None => Vec::new(),
    };

    Ok(StripInfo {
        is_strip: sys.get("children").is_some(),
        outlet_count: children.len(),
        model: str_field(sys, "model"),
        alias: str_field(sys, "alias"),
        children,
    })
}
