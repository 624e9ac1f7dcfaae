//! TP-Link Kasa LAN driver.
//!
//! Commands are JSON over TCP 9999, XOR-autokey obfuscated and length
//! framed. Discovery is a UDP broadcast of the same cipher without the
//! length header.

pub mod cache;
pub mod client;
pub mod codec;
pub mod discovery;
pub mod scan;
pub mod service;
pub mod transport;

pub use cache::StateCache;
pub use client::{DeviceState, KasaDevice, OutletState, StripInfo};
pub use discovery::{discover, DiscoveryOptions};
pub use scan::{scan_subnet, ScanOptions};
pub use service::KasaService;
pub use transport::send_command;
