//! Rust library for discovering and controlling networked alert devices
//!
//! This library manages a set of remote alert endpoints on a local IP
//! network. It supports:
//!
//! - Discovery via a concurrent TCP sweep of configurable address ranges
//! - One long-lived client per registered device with automatic state
//!   tracking
//! - Toggling the alert level of each device and observing level updates
//!   pushed back by the device
//! - Connection state change notifications with self-exclusion, so an
//!   originator never re-processes its own change
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use lanalert::{
//!     AlertDevice, ClientRegistry, DeviceScanListener, RegistryConfig, ScanRange,
//! };
//!
//! struct PrintListener;
//!
//! impl DeviceScanListener for PrintListener {
//!     fn on_device_found(&self, device: Arc<AlertDevice>) {
//!         println!("found {} at {}", device.id(), device.address());
//!     }
//!
//!     fn on_scan_finished(&self) {
//!         println!("scan finished");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RegistryConfig::single_range(ScanRange::new("192.168.17", 2, 254));
//!     let registry = ClientRegistry::new(config);
//!
//!     // Sweep the configured range for live devices
//!     registry.start_scan_and_listen(Arc::new(PrintListener));
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!
//!     // Register a device directly and connect to it
//!     let device = Arc::new(AlertDevice::new("192.168.17.23", lanalert::DEFAULT_ALERT_PORT));
//!     registry.add_device_and_start_client(device.clone());
//!
//!     // Raise the alert; the client pushes the level to the device
//!     device.set_alert_level_and_notify(1, None);
//!
//!     registry.shutdown();
//! }
//! ```
//!
//! # Architecture
//!
//! - **Registry**: the table of device clients plus scan orchestration
//! - **Client**: one per device, owns the TCP session and its receive loop
//! - **Discovery**: bounded-concurrency sweep of an address range
//! - **Device**: shared record of one endpoint's state with listener fan-out
//! - **Protocol**: newline-delimited JSON message structures
//!
//! State changes flow both ways: a client applies updates received from its
//! device to the shared [`AlertDevice`] record, and level changes made
//! locally (for example by a UI) are observed by the client and pushed to
//! the device. Both directions use the same listener mechanism; the event
//! source is excluded from its own notification to prevent feedback loops.

mod client;
mod config;
mod connection;
mod device;
mod discovery;
mod error;
mod protocol;
mod registry;

// Public exports
pub use client::AlertClient;
pub use config::{RegistryConfig, ScanRange, DEFAULT_ALERT_PORT};
pub use device::{
    AlertDevice, AlertEventKind, AlertStateEvent, AlertStateListener, DEVICE_NAME_DEFAULT,
};
pub use discovery::{DeviceScanListener, DeviceScanner};
pub use error::{AlertError, Result};
pub use protocol::Message;
pub use registry::ClientRegistry;
