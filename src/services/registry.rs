use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::DeviceService;
use crate::error::DeviceError;
use crate::kernel::directive::DeviceRecord;

/// Routes capability calls to the backend registered for a record's brand.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    backends: HashMap<String, Arc<dyn DeviceService>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Brands are matched case-insensitively.
    pub fn register(&mut self, brand: &str, backend: Arc<dyn DeviceService>) {
        self.backends.insert(brand.to_ascii_lowercase(), backend);
    }

    pub fn with_backend(mut self, brand: &str, backend: Arc<dyn DeviceService>) -> Self {
        self.register(brand, backend);
        self
    }

    fn backend_for(&self, device: &DeviceRecord) -> Result<&Arc<dyn DeviceService>, DeviceError> {
        self.backends
            .get(&device.brand.to_ascii_lowercase())
            .ok_or_else(|| DeviceError::UnsupportedBrand(device.brand.clone()))
    }
}

#[async_trait]
impl DeviceService for DeviceRegistry {
    async fn turn_on(&self, address: &str, device: &DeviceRecord) -> Result<Value, DeviceError> {
        self.backend_for(device)?.turn_on(address, device).await
    }

    async fn turn_off(&self, address: &str, device: &DeviceRecord) -> Result<Value, DeviceError> {
        self.backend_for(device)?.turn_off(address, device).await
    }
}
