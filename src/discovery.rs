use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::config::ScanRange;
use crate::connection::Session;
use crate::device::AlertDevice;

// Cap on concurrent outstanding probes; keeps a full /24 sweep well under
// default fd limits even with several ranges scanning at once
const MAX_CONCURRENT_PROBES: usize = 32;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Callback interface for scan results
///
/// Both methods are invoked on the scan's background task; callers that need
/// to touch thread-bound state are responsible for handing off.
pub trait DeviceScanListener: Send + Sync {
    /// A live alert device answered a probe
    fn on_device_found(&self, device: Arc<AlertDevice>);

    /// The scan concluded, by exhaustion or cancellation; fires exactly once
    /// per scan run
    fn on_scan_finished(&self);
}

/// Sweeps one address range for live alert devices
///
/// Probes every `prefix.suffix:port` for suffixes in the configured range,
/// ascending, with a bounded number of probes in flight. A probe that cannot
/// connect and complete the handshake in time means "no device there" and is
/// not an error. The sweep runs on a background task and can be cancelled at
/// any point; completion is reported exactly once either way.
pub struct DeviceScanner {
    range: ScanRange,
    port: u16,
    running: Arc<AtomicBool>,
    stop_tx: Mutex<Option<broadcast::Sender<()>>>,
    runtime: Handle,
}

impl DeviceScanner {
    /// Create a scanner for `range` probing `port`; work runs on `runtime`
    pub fn new(range: ScanRange, port: u16, runtime: Handle) -> Self {
        Self {
            range,
            port,
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: Mutex::new(None),
            runtime,
        }
    }

    /// Whether the sweep task is still active; callable from any thread
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start the sweep; no-op if one is already running
    pub fn start(&self, listener: Arc<dyn DeviceScanListener>) {
        // The stop channel mutex also serializes the flag transition so a
        // concurrent stop cannot observe a stale channel
        let mut stop_slot = self.stop_tx.lock().unwrap();

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let (stop_tx, stop_rx) = broadcast::channel(1);
        *stop_slot = Some(stop_tx);

        let range = self.range.clone();
        let port = self.port;
        let running = self.running.clone();

        self.runtime
            .spawn(run_sweep(range, port, running, listener, stop_rx));
    }

    /// Cancel the sweep; outstanding probes are dropped, discoveries already
    /// reported are not retracted
    pub fn stop(&self) {
        if let Some(stop_tx) = self.stop_tx.lock().unwrap().take() {
            let _ = stop_tx.send(());
        }
    }
}

async fn run_sweep(
    range: ScanRange,
    port: u16,
    running: Arc<AtomicBool>,
    listener: Arc<dyn DeviceScanListener>,
    mut stop_rx: broadcast::Receiver<()>,
) {
    tracing::info!(
        "Scanning {}.{}-{} port {}",
        range.network_prefix,
        range.first_host,
        range.last_host,
        port
    );

    let prefix = range.network_prefix.clone();
    let addresses =
        (range.first_host..=range.last_host).map(move |suffix| format!("{}.{}", prefix, suffix));

    let mut probes = stream::iter(addresses)
        .map(|address| probe(address, port))
        .buffer_unordered(MAX_CONCURRENT_PROBES);

    let mut found = 0usize;
    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                tracing::info!("Scan of {}.* cancelled", range.network_prefix);
                break;
            }
            next = probes.next() => match next {
                Some(Some(device)) => {
                    found += 1;
                    listener.on_device_found(device);
                }
                Some(None) => {}
                None => break,
            }
        }
    }

    // In-flight probe connections are dropped with the stream
    drop(probes);

    tracing::info!(
        "Scan of {}.* finished, {} device(s) found",
        range.network_prefix,
        found
    );

    // Clear the running flag before the completion callback so a listener
    // checking is_running from inside it observes this scanner as stopped
    running.store(false, Ordering::Release);
    listener.on_scan_finished();
}

async fn probe(address: String, port: u16) -> Option<Arc<AlertDevice>> {
    let attempt = async {
        let mut session = Session::connect(&address, port).await?;
        session.handshake().await
    };

    match timeout(PROBE_TIMEOUT, attempt).await {
        Ok(Ok(hello)) => {
            tracing::info!("Found alert device {} at {}", hello.id, address);
            let device = AlertDevice::discovered(hello.id, address, port);
            if let Some(name) = hello.name {
                device.set_name(name);
            }
            Some(Arc::new(device))
        }
        Ok(Err(e)) => {
            tracing::debug!("No alert device at {}:{}: {}", address, port, e);
            None
        }
        Err(_) => {
            tracing::debug!("Probe of {}:{} timed out", address, port);
            None
        }
    }
}
