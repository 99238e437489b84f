use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;

use crate::client::AlertClient;
use crate::config::RegistryConfig;
use crate::device::AlertDevice;
use crate::discovery::{DeviceScanListener, DeviceScanner};

/// Manages the set of alert device clients and drives discovery scans
///
/// The registry owns one [`AlertClient`] per registered device, keyed by the
/// device's address (one client per address, ports are not part of the key),
/// and at most one active scan across all configured ranges. All operations
/// are safe to call concurrently from any thread; control operations hand
/// work off to background tasks and return promptly.
///
/// Construct one explicitly with [`ClientRegistry::new`] and pass it to
/// whatever needs it; [`ClientRegistry::shutdown`] stops and releases
/// everything it owns. Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct ClientRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    config: RegistryConfig,
    runtime: Handle,
    clients: Mutex<Vec<AlertClient>>,
    scanners: Mutex<Vec<Arc<DeviceScanner>>>,
    scan_active: AtomicBool,
    scan_listener: Mutex<Option<Arc<dyn DeviceScanListener>>>,
}

impl ClientRegistry {
    /// Create a registry with the given scan configuration
    ///
    /// Must be called from within a tokio runtime; the runtime handle is
    /// captured so that control operations can be invoked from any thread
    /// afterwards.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                runtime: Handle::current(),
                clients: Mutex::new(Vec::new()),
                scanners: Mutex::new(Vec::new()),
                scan_active: AtomicBool::new(false),
                scan_listener: Mutex::new(None),
            }),
        }
    }

    /// Whether a scan is currently active
    pub fn is_scan_active(&self) -> bool {
        self.inner.scan_active.load(Ordering::Acquire)
    }

    /// Begin a scan over all configured ranges, reporting results to
    /// `listener`
    ///
    /// A no-op while a scan is already active: concurrent callers race on
    /// the active flag and only one wins; losers neither reset nor replace
    /// the stored listener. `listener` receives every found device from
    /// every range and a single completion once all ranges have concluded.
    pub fn start_scan_and_listen(&self, listener: Arc<dyn DeviceScanListener>) {
        let inner = &self.inner;

        if inner
            .scan_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        // Lazily create one scanner per configured range
        let scanners: Vec<Arc<DeviceScanner>> = {
            let mut scanners = inner.scanners.lock().unwrap();
            if scanners.is_empty() {
                for range in &inner.config.ranges {
                    scanners.push(Arc::new(DeviceScanner::new(
                        range.clone(),
                        inner.config.port,
                        inner.runtime.clone(),
                    )));
                }
            }
            scanners.clone()
        };

        *inner.scan_listener.lock().unwrap() = Some(listener);

        if scanners.is_empty() {
            // Nothing to sweep; report completion and reset so future
            // attempts are not blocked
            self.stop_scan();
            return;
        }

        let forwarder: Arc<dyn DeviceScanListener> = inner.clone();
        for scanner in scanners {
            if !scanner.is_running() {
                scanner.start(forwarder.clone());
            }
        }
    }

    /// Cancel any running scan
    ///
    /// The stored listener, if any, receives its completion callback exactly
    /// once, whether or not a scan was actually running, and the active flag
    /// is reset. Safe to call at any time.
    pub fn stop_scan(&self) {
        let inner = &self.inner;

        let stored = inner.scan_listener.lock().unwrap().take();

        let scanners: Vec<Arc<DeviceScanner>> = inner.scanners.lock().unwrap().clone();
        for scanner in scanners {
            if scanner.is_running() {
                scanner.stop();
            }
        }

        if let Some(listener) = stored {
            listener.on_scan_finished();
        }

        inner.scan_active.store(false, Ordering::Release);
    }

    /// Snapshot of all registered devices, in registration order
    pub fn get_device_list(&self) -> Vec<Arc<AlertDevice>> {
        self.inner
            .clients
            .lock()
            .unwrap()
            .iter()
            .map(|client| client.device())
            .collect()
    }

    /// Add a device to the registry without starting its client
    ///
    /// If a client already exists for the device's address it is shut down
    /// and removed first, and the superseded device's registered flag is
    /// cleared, so re-registration at the same address replaces rather than
    /// duplicates.
    pub fn add_device(&self, device: Arc<AlertDevice>) {
        let mut clients = self.inner.clients.lock().unwrap();

        clients.retain(|client| {
            let existing = client.device();
            if existing.address() == device.address() {
                client.shutdown();
                existing.set_registered(false);
                false
            } else {
                true
            }
        });

        clients.push(AlertClient::new(device.clone(), self.inner.runtime.clone()));
        device.set_registered(true);
    }

    /// Remove the client matching the device's address; no-op if none
    pub fn remove_device_by_addr(&self, device: &AlertDevice) {
        let mut clients = self.inner.clients.lock().unwrap();

        clients.retain(|client| {
            let existing = client.device();
            if existing.address() == device.address() {
                if client.is_running() {
                    client.shutdown();
                }
                existing.set_registered(false);
                false
            } else {
                true
            }
        });
    }

    /// Start the client matching the device's address; no-op if none or
    /// already running
    pub fn start_client(&self, device: &AlertDevice) {
        let clients = self.inner.clients.lock().unwrap();

        if let Some(client) = clients
            .iter()
            .find(|client| client.device().address() == device.address())
        {
            if !client.is_running() {
                client.start();
            }
        }
    }

    /// Stop the client matching the device's address; no-op if none or not
    /// running
    pub fn stop_client(&self, device: &AlertDevice) {
        let clients = self.inner.clients.lock().unwrap();

        if let Some(client) = clients
            .iter()
            .find(|client| client.device().address() == device.address())
        {
            if client.is_running() {
                client.shutdown();
            }
        }
    }

    /// Add a device and immediately start its client
    pub fn add_device_and_start_client(&self, device: Arc<AlertDevice>) {
        self.add_device(device.clone());
        self.start_client(&device);
    }

    /// Stop every client but keep all of them registered for a later restart
    pub fn stop_all_clients(&self) {
        let clients = self.inner.clients.lock().unwrap();
        for client in clients.iter() {
            client.shutdown();
        }
    }

    /// Start every client that is not currently running
    pub fn start_all_clients(&self) {
        let clients = self.inner.clients.lock().unwrap();
        for client in clients.iter() {
            if !client.is_running() {
                client.start();
            }
        }
    }

    /// Stop every client, clear every registered flag, and empty the registry
    pub fn stop_all_clients_and_remove(&self) {
        let mut clients = self.inner.clients.lock().unwrap();

        for client in clients.iter() {
            if client.is_running() {
                client.shutdown();
            }
            client.device().set_registered(false);
        }

        clients.clear();
    }

    /// Stop any scan and release every client
    pub fn shutdown(&self) {
        self.stop_scan();
        self.stop_all_clients_and_remove();
    }
}

// Internal forwarding listener between the scanners and the caller-supplied
// listener. Every found device is relayed; completion is a barrier reported
// only once the last scanner has stopped.
impl DeviceScanListener for RegistryInner {
    fn on_device_found(&self, device: Arc<AlertDevice>) {
        let listener = self.scan_listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener.on_device_found(device);
        }
    }

    fn on_scan_finished(&self) {
        let all_finished = {
            let scanners = self.scanners.lock().unwrap();
            scanners.iter().all(|scanner| !scanner.is_running())
        };

        if all_finished {
            self.scan_active.store(false, Ordering::Release);

            let listener = self.scan_listener.lock().unwrap().take();
            if let Some(listener) = listener {
                listener.on_scan_finished();
            }
        }
    }
}
