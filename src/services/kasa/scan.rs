use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

use super::transport::{send_command, DEFAULT_PORT};

/// A host that answered a direct sysinfo query.
#[derive(Debug, Clone, Serialize)]
pub struct ScannedDevice {
    pub ip: String,
    pub name: String,
    pub info: Value,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub port: u16,
    pub first_host: u8,
    pub last_host: u8,
    pub per_host_timeout: Duration,
    pub concurrency: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            first_host: 1,
            last_host: 255,
            per_host_timeout: Duration::from_millis(500),
            concurrency: 50,
        }
    }
}

/// Query every host of a /24 (`prefix` like `"192.168.1"`) over TCP.
///
/// Slower than broadcast discovery but works on networks that drop
/// broadcast traffic.
pub async fn scan_subnet(prefix: &str, options: &ScanOptions) -> Vec<ScannedDevice> {
    let query = json!({ "system": { "get_sysinfo": {} } });
    let hosts: Vec<String> = (options.first_host..=options.last_host)
        .map(|n| format!("{prefix}.{n}"))
        .collect();

    let mut found: Vec<ScannedDevice> = stream::iter(hosts)
        .map(|ip| {
            let query = &query;
            async move {
                let info = send_command(&ip, options.port, query, options.per_host_timeout)
                    .await
                    .ok()?;
                let name = info
                    .pointer("/system/get_sysinfo/alias")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Device {ip}"));
                Some(ScannedDevice { ip, name, info })
            }
        })
        .buffer_unordered(options.concurrency.max(1))
        .filter_map(|d| async move { d })
        .collect()
        .await;

    found.sort_by(|a, b| a.ip.cmp(&b.ip));
    info!("Subnet scan of {}.0/24 found {} devices", prefix, found.len());
    found
}
