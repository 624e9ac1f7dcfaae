use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::cache::StateCache;
use super::client::{DeviceState, KasaDevice};
use super::transport::{DEFAULT_PORT, DEFAULT_TIMEOUT};
use crate::error::{DeviceError, KasaError};
use crate::kernel::directive::DeviceRecord;
use crate::services::DeviceService;

/// `DeviceService` backend for Kasa plugs and strips on the LAN.
///
/// Every device built here shares one state cache, so status polls for
/// several outlets of a strip cost one round trip.
#[derive(Debug, Clone)]
pub struct KasaService {
    port: u16,
    timeout: Duration,
    cache: StateCache,
}

impl Default for KasaService {
    fn default() -> Self {
        Self::new()
    }
}

impl KasaService {
    pub fn new() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            cache: StateCache::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    pub fn device(&self, address: &str, child_id: Option<String>) -> KasaDevice {
        KasaDevice::new(address)
            .with_port(self.port)
            .with_timeout(self.timeout)
            .with_child(child_id)
            .with_cache(self.cache.clone())
    }

    pub async fn state(&self, device: &DeviceRecord) -> Result<DeviceState, KasaError> {
        self.device(&device.address, device.child_id.clone())
            .get_state()
            .await
    }
}

#[async_trait]
impl DeviceService for KasaService {
    async fn turn_on(&self, address: &str, device: &DeviceRecord) -> Result<Value, DeviceError> {
        Ok(self.device(address, device.child_id.clone()).turn_on().await?)
    }

    async fn turn_off(&self, address: &str, device: &DeviceRecord) -> Result<Value, DeviceError> {
        Ok(self.device(address, device.child_id.clone()).turn_off().await?)
    }
}
