pub mod kasa;
pub mod registry;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DeviceError;
use crate::kernel::directive::DeviceRecord;

/// The two calls the engine needs from any device backend. The returned
/// value is the backend's raw response, passed through to command results.
#[async_trait]
pub trait DeviceService: Send + Sync {
    async fn turn_on(&self, address: &str, device: &DeviceRecord) -> Result<Value, DeviceError>;
    async fn turn_off(&self, address: &str, device: &DeviceRecord) -> Result<Value, DeviceError>;
}

pub use registry::DeviceRegistry;
