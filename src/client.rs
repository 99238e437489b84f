use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};

use crate::connection::Session;
use crate::device::{AlertDevice, AlertStateEvent, AlertStateListener, DEVICE_NAME_DEFAULT};
use crate::error::Result;
use crate::protocol::Message;

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_SHUTTING_DOWN: u8 = 2;
const STATE_STOPPED: u8 = 3;

/// Long-lived client owning the session to one alert device
///
/// An `AlertClient` wraps exactly one [`AlertDevice`] for its whole lifetime.
/// `start` spawns a background task that connects, performs the handshake,
/// and then applies inbound level updates and connectivity transitions to the
/// device with itself as event source. The client also listens on its device:
/// when any other source changes the alert level, the new level is pushed to
/// the remote endpoint over the active session. With no active session the
/// push is dropped.
pub struct AlertClient {
    device: Arc<AlertDevice>,
    listener: Arc<dyn AlertStateListener>,
    push: Arc<PushListener>,
    state: Arc<AtomicU8>,
    stop_tx: Mutex<Option<broadcast::Sender<()>>>,
    runtime: Handle,
}

impl AlertClient {
    /// Create a client for `device`; spawned work runs on `runtime`
    pub fn new(device: Arc<AlertDevice>, runtime: Handle) -> Self {
        let push = Arc::new(PushListener {
            session_tx: Mutex::new(None),
        });
        let listener: Arc<dyn AlertStateListener> = push.clone();
        device.add_listener(listener.clone());

        Self {
            device,
            listener,
            push,
            state: Arc::new(AtomicU8::new(STATE_IDLE)),
            stop_tx: Mutex::new(None),
            runtime,
        }
    }

    /// The device this client manages
    pub fn device(&self) -> Arc<AlertDevice> {
        self.device.clone()
    }

    /// Whether the session task is still active
    ///
    /// Remains true while a shutdown is in progress; flips to false only
    /// once the session has been closed.
    pub fn is_running(&self) -> bool {
        matches!(
            self.state.load(Ordering::Acquire),
            STATE_RUNNING | STATE_SHUTTING_DOWN
        )
    }

    /// Start the session task; no-op unless the client is idle or stopped
    pub fn start(&self) {
        // The stop channel mutex also serializes the state transition so a
        // concurrent shutdown cannot observe a stale channel
        let mut stop_slot = self.stop_tx.lock().unwrap();

        let started = self
            .state
            .compare_exchange(
                STATE_IDLE,
                STATE_RUNNING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
            || self
                .state
                .compare_exchange(
                    STATE_STOPPED,
                    STATE_RUNNING,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok();

        if !started {
            return;
        }

        let (stop_tx, stop_rx) = broadcast::channel(1);
        *stop_slot = Some(stop_tx);

        let device = self.device.clone();
        let listener = self.listener.clone();
        let push = self.push.clone();
        let state = self.state.clone();

        self.runtime
            .spawn(run_session(device, push, listener, state, stop_rx));
    }

    /// Request shutdown of the session task; no-op unless running
    pub fn shutdown(&self) {
        let mut stop_slot = self.stop_tx.lock().unwrap();

        let requested = self
            .state
            .compare_exchange(
                STATE_RUNNING,
                STATE_SHUTTING_DOWN,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if requested {
            if let Some(stop_tx) = stop_slot.take() {
                let _ = stop_tx.send(());
            }
        }
    }
}

impl Drop for AlertClient {
    fn drop(&mut self) {
        self.shutdown();
        self.device.remove_listener(&self.listener);
    }
}

/// Listener half of the client: forwards level changes made by other sources
/// to the remote endpoint
struct PushListener {
    session_tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

impl AlertStateListener for PushListener {
    fn on_alert_level_event(&self, device: &AlertDevice, _event: &AlertStateEvent) {
        let session_tx = self.session_tx.lock().unwrap();
        match session_tx.as_ref() {
            Some(tx) => {
                let level = device.alert_level();
                if tx.send(Message::Alert { level }).is_err() {
                    tracing::debug!(
                        "Session to {} gone, dropping alert level push",
                        device.address()
                    );
                }
            }
            None => {
                tracing::debug!(
                    "No active session to {}, dropping alert level push",
                    device.address()
                );
            }
        }
    }

    fn on_connection_state_event(&self, _device: &AlertDevice, _event: &AlertStateEvent) {}
}

async fn run_session(
    device: Arc<AlertDevice>,
    push: Arc<PushListener>,
    listener: Arc<dyn AlertStateListener>,
    state: Arc<AtomicU8>,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let (outcome, session) = drive_session(&device, &push, &listener, &mut stop_rx).await;

    // Drop the push handle first so the writer can drain and exit
    *push.session_tx.lock().unwrap() = None;
    if let Some(session) = session {
        session.close().await;
    }

    if let Err(e) = outcome {
        tracing::warn!("Session with {} ended: {}", device.address(), e);
    }

    if device.is_connected() {
        device.set_connected_and_notify(false, Some(&listener));
    }

    // The session is closed at this point, so is_running may report false
    state.store(STATE_STOPPED, Ordering::Release);
}

async fn drive_session(
    device: &Arc<AlertDevice>,
    push: &PushListener,
    listener: &Arc<dyn AlertStateListener>,
    stop_rx: &mut broadcast::Receiver<()>,
) -> (Result<()>, Option<Session>) {
    let mut session = tokio::select! {
        _ = stop_rx.recv() => return (Ok(()), None),
        connected = Session::connect(device.address(), device.port()) => match connected {
            Ok(session) => session,
            Err(e) => return (Err(e), None),
        },
    };

    // A stop request drops the interaction mid-read; the session is closed
    // by the caller either way
    let outcome = tokio::select! {
        _ = stop_rx.recv() => Ok(()),
        result = interact(device, push, listener, &mut session) => result,
    };

    (outcome, Some(session))
}

async fn interact(
    device: &Arc<AlertDevice>,
    push: &PushListener,
    listener: &Arc<dyn AlertStateListener>,
    session: &mut Session,
) -> Result<()> {
    let hello = session.handshake().await?;

    device.set_id(hello.id);
    if let Some(name) = hello.name {
        // Keep a name the user already assigned
        if device.name() == DEVICE_NAME_DEFAULT {
            device.set_name(name);
        }
    }

    *push.session_tx.lock().unwrap() = Some(session.sender());
    device.set_connected_and_notify(true, Some(listener));
    tracing::info!("Connected to alert device {} at {}", device.id(), session.peer());

    loop {
        match session.next_message().await? {
            Some(Message::Alert { level }) => {
                tracing::debug!("Alert level {} from {}", level, session.peer());
                device.set_alert_level_and_notify(level, Some(listener));
            }
            Some(Message::Hello { .. }) => {
                tracing::debug!("Ignoring repeated hello from {}", session.peer());
            }
            Some(Message::Bye) | None => {
                tracing::info!("Alert device at {} disconnected", session.peer());
                return Ok(());
            }
        }
    }
}
