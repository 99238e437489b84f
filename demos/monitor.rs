//! Interactive console monitor for alert devices.
//!
//! Scans the network for alert devices, registers everything it finds, and
//! then takes simple commands from stdin:
//!
//! ```text
//! cargo run --example monitor -- 192.168.17 2 254
//! ```
//!
//! Commands: `list`, `toggle <n>`, `scan`, `quit`.

use std::sync::Arc;

use lanalert::{
    AlertDevice, AlertStateEvent, AlertStateListener, ClientRegistry, DeviceScanListener,
    RegistryConfig, ScanRange, DEFAULT_ALERT_PORT,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Prints every device state change to the console
struct ConsolePrinter;

impl AlertStateListener for ConsolePrinter {
    fn on_alert_level_event(&self, device: &AlertDevice, _event: &AlertStateEvent) {
        let state = if device.alert_level() > 0 { "ACTIVE" } else { "inactive" };
        println!(
            "[{}] alert level {} ({})",
            device.address(),
            device.alert_level(),
            state
        );
    }

    fn on_connection_state_event(&self, device: &AlertDevice, _event: &AlertStateEvent) {
        let state = if device.is_connected() { "connected" } else { "disconnected" };
        println!("[{}] {}", device.address(), state);
    }
}

/// Registers every found device and starts its client
struct AutoRegister {
    registry: ClientRegistry,
    printer: Arc<dyn AlertStateListener>,
}

impl DeviceScanListener for AutoRegister {
    fn on_device_found(&self, device: Arc<AlertDevice>) {
        println!(
            "found device '{}' ({}) at {}:{}",
            device.name(),
            device.id(),
            device.address(),
            device.port()
        );
        device.add_listener(self.printer.clone());
        self.registry.add_device_and_start_client(device);
    }

    fn on_scan_finished(&self) {
        println!("scan finished");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let prefix = args.get(1).map_or("192.168.17", String::as_str);
    let first: u8 = args.get(2).map_or(Ok(2), |s| s.parse())?;
    let last: u8 = args.get(3).map_or(Ok(254), |s| s.parse())?;
    let port: u16 = args.get(4).map_or(Ok(DEFAULT_ALERT_PORT), |s| s.parse())?;

    let registry = ClientRegistry::new(RegistryConfig {
        ranges: vec![ScanRange::new(prefix, first, last)],
        port,
    });

    let printer: Arc<dyn AlertStateListener> = Arc::new(ConsolePrinter);
    let scan_listener = Arc::new(AutoRegister {
        registry: registry.clone(),
        printer: printer.clone(),
    });

    println!("scanning {}.{}-{} port {}...", prefix, first, last, port);
    registry.start_scan_and_listen(scan_listener.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("list") => {
                for (index, device) in registry.get_device_list().iter().enumerate() {
                    println!(
                        "{}: '{}' {}:{} level={} {}",
                        index,
                        device.name(),
                        device.address(),
                        device.port(),
                        device.alert_level(),
                        if device.is_connected() { "up" } else { "down" },
                    );
                }
            }
            Some("toggle") => {
                let index: usize = match parts.next().and_then(|s| s.parse().ok()) {
                    Some(index) => index,
                    None => {
                        println!("usage: toggle <n>");
                        continue;
                    }
                };
                match registry.get_device_list().get(index) {
                    Some(device) => {
                        let level = if device.alert_level() > 0 { 0 } else { 1 };
                        device.set_alert_level_and_notify(level, None);
                        println!("set {} to level {}", device.address(), level);
                    }
                    None => println!("no device {}", index),
                }
            }
            Some("scan") => {
                println!("scanning...");
                registry.start_scan_and_listen(scan_listener.clone());
            }
            Some("quit") => break,
            Some(other) => println!("unknown command '{}'", other),
            None => {}
        }
    }

    registry.shutdown();
    Ok(())
}
