use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

/// Default device name until the user assigns one
pub const DEVICE_NAME_DEFAULT: &str = "Alert device";

/// Listener for alert state changes on a device
///
/// Callbacks are invoked synchronously on whatever thread performed the
/// mutating call, in listener registration order. The listener that caused a
/// change (the event source) is skipped, so an originator never re-processes
/// its own change. Callbacks must not add or remove listeners on the same
/// device or mutate its state through the notifying setters.
pub trait AlertStateListener: Send + Sync {
    /// Called when the device's alert level changed
    fn on_alert_level_event(&self, device: &AlertDevice, event: &AlertStateEvent);

    /// Called when the connection state between client and device changed
    fn on_connection_state_event(&self, device: &AlertDevice, event: &AlertStateEvent);
}

/// Kind of a state-change event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertEventKind {
    /// The alert level changed
    AlertLevel,
    /// The connection state changed
    ConnectionState,
}

/// Descriptor passed to listeners along with the device
#[derive(Clone)]
pub struct AlertStateEvent {
    /// What changed
    pub kind: AlertEventKind,
    /// The listener that caused the change, if any
    pub source: Option<Arc<dyn AlertStateListener>>,
}

impl AlertStateEvent {
    fn new(kind: AlertEventKind, source: Option<&Arc<dyn AlertStateListener>>) -> Self {
        Self {
            kind,
            source: source.cloned(),
        }
    }

    /// Whether `listener` is the source of this event
    pub fn is_from(&self, listener: &Arc<dyn AlertStateListener>) -> bool {
        self.source
            .as_ref()
            .is_some_and(|source| Arc::ptr_eq(source, listener))
    }
}

impl fmt::Debug for AlertStateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertStateEvent")
            .field("kind", &self.kind)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

struct DeviceState {
    id: String,
    name: String,
    alert_level: u32,
    connected: bool,
    registered: bool,
}

/// Representation of a remote alert device
///
/// Address and port never change after creation; the identity is assigned by
/// the server during the connect handshake. All other state is mutable and
/// safe to access from any thread. State changes made through the
/// `*_and_notify` setters are fanned out to every registered listener except
/// the one that caused the change.
pub struct AlertDevice {
    address: String,
    port: u16,
    state: Mutex<DeviceState>,
    listeners: Mutex<Vec<Arc<dyn AlertStateListener>>>,
    // Serializes mutation + dispatch so two concurrent notifications on the
    // same device cannot interleave their listener callbacks
    notify_lock: Mutex<()>,
}

impl AlertDevice {
    /// Create a device that has not been identified by a server yet
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self::build(String::new(), address.into(), port)
    }

    /// Create a device from a successful discovery probe
    pub fn discovered(id: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self::build(id.into(), address.into(), port)
    }

    fn build(id: String, address: String, port: u16) -> Self {
        Self {
            address,
            port,
            state: Mutex::new(DeviceState {
                id,
                name: DEVICE_NAME_DEFAULT.to_string(),
                alert_level: 0,
                connected: false,
                registered: false,
            }),
            listeners: Mutex::new(Vec::new()),
            notify_lock: Mutex::new(()),
        }
    }

    /// Remote IP address of the device
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Remote port of the alert service
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Server-assigned device identity; empty until the first handshake
    pub fn id(&self) -> String {
        self.state.lock().unwrap().id.clone()
    }

    pub(crate) fn set_id(&self, id: impl Into<String>) {
        self.state.lock().unwrap().id = id.into();
    }

    /// User-assigned device name
    pub fn name(&self) -> String {
        self.state.lock().unwrap().name.clone()
    }

    /// Assign a device name
    pub fn set_name(&self, name: impl Into<String>) {
        self.state.lock().unwrap().name = name.into();
    }

    /// Current alert level; 0 is inactive, any nonzero value is active
    pub fn alert_level(&self) -> u32 {
        self.state.lock().unwrap().alert_level
    }

    /// Set the alert level without notifying listeners
    pub fn set_alert_level(&self, alert_level: u32) {
        self.state.lock().unwrap().alert_level = alert_level;
    }

    /// Set the alert level and notify all listeners except `source`
    pub fn set_alert_level_and_notify(
        &self,
        alert_level: u32,
        source: Option<&Arc<dyn AlertStateListener>>,
    ) {
        let _dispatch = self.notify_lock.lock().unwrap();
        self.state.lock().unwrap().alert_level = alert_level;
        self.dispatch(AlertStateEvent::new(AlertEventKind::AlertLevel, source));
    }

    /// Whether a client currently holds a live session to this device
    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    /// Set the connection state without notifying listeners
    pub fn set_connected(&self, connected: bool) {
        self.state.lock().unwrap().connected = connected;
    }

    /// Set the connection state and notify all listeners except `source`
    pub fn set_connected_and_notify(
        &self,
        connected: bool,
        source: Option<&Arc<dyn AlertStateListener>>,
    ) {
        let _dispatch = self.notify_lock.lock().unwrap();
        self.state.lock().unwrap().connected = connected;
        self.dispatch(AlertStateEvent::new(AlertEventKind::ConnectionState, source));
    }

    /// Whether this device is currently managed by a registry
    pub fn is_registered(&self) -> bool {
        self.state.lock().unwrap().registered
    }

    // The registry is the sole writer of the registered flag
    pub(crate) fn set_registered(&self, registered: bool) {
        self.state.lock().unwrap().registered = registered;
    }

    /// Register a listener; adding one that is already present is a no-op
    pub fn add_listener(&self, listener: Arc<dyn AlertStateListener>) {
        let mut listeners = self.listeners.lock().unwrap();
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// Remove a listener; removing one that is absent is a no-op
    pub fn remove_listener(&self, listener: &Arc<dyn AlertStateListener>) {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn dispatch(&self, event: AlertStateEvent) {
        // Snapshot so dispatch does not hold the listener lock
        let listeners: Vec<_> = self.listeners.lock().unwrap().clone();

        for listener in &listeners {
            if event.is_from(listener) {
                continue;
            }

            // One faulty observer must not abort dispatch to the rest
            let outcome = catch_unwind(AssertUnwindSafe(|| match event.kind {
                AlertEventKind::AlertLevel => listener.on_alert_level_event(self, &event),
                AlertEventKind::ConnectionState => {
                    listener.on_connection_state_event(self, &event)
                }
            }));

            if outcome.is_err() {
                tracing::error!(
                    "Listener panicked during {:?} dispatch for {}",
                    event.kind,
                    self.address
                );
            }
        }
    }
}

impl fmt::Debug for AlertDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("AlertDevice")
            .field("id", &state.id)
            .field("name", &state.name)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("alert_level", &state.alert_level)
            .field("connected", &state.connected)
            .field("registered", &state.registered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<(AlertEventKind, u32, bool)>>,
    }

    impl RecordingListener {
        fn events(&self) -> Vec<(AlertEventKind, u32, bool)> {
            self.events.lock().unwrap().clone()
        }
    }

    impl AlertStateListener for RecordingListener {
        fn on_alert_level_event(&self, device: &AlertDevice, _event: &AlertStateEvent) {
            self.events.lock().unwrap().push((
                AlertEventKind::AlertLevel,
                device.alert_level(),
                device.is_connected(),
            ));
        }

        fn on_connection_state_event(&self, device: &AlertDevice, _event: &AlertStateEvent) {
            self.events.lock().unwrap().push((
                AlertEventKind::ConnectionState,
                device.alert_level(),
                device.is_connected(),
            ));
        }
    }

    fn listener() -> (Arc<RecordingListener>, Arc<dyn AlertStateListener>) {
        let concrete = Arc::new(RecordingListener::default());
        let dynamic: Arc<dyn AlertStateListener> = concrete.clone();
        (concrete, dynamic)
    }

    #[test]
    fn defaults() {
        let device = AlertDevice::new("10.0.0.5", 12321);
        assert_eq!(device.name(), DEVICE_NAME_DEFAULT);
        assert_eq!(device.alert_level(), 0);
        assert!(!device.is_connected());
        assert!(!device.is_registered());
        assert_eq!(device.id(), "");
    }

    #[test]
    fn notifies_all_but_source() {
        let device = AlertDevice::discovered("d1", "10.0.0.5", 12321);
        let (ui, ui_dyn) = listener();
        let (worker, worker_dyn) = listener();
        device.add_listener(ui_dyn.clone());
        device.add_listener(worker_dyn.clone());

        device.set_alert_level_and_notify(3, Some(&worker_dyn));

        assert_eq!(ui.events(), vec![(AlertEventKind::AlertLevel, 3, false)]);
        assert!(worker.events().is_empty());
    }

    #[test]
    fn no_source_notifies_everyone_in_order() {
        let device = AlertDevice::new("10.0.0.5", 12321);
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        struct Tagged {
            tag: &'static str,
            order: Arc<Mutex<Vec<&'static str>>>,
        }

        impl AlertStateListener for Tagged {
            fn on_alert_level_event(&self, _: &AlertDevice, _: &AlertStateEvent) {
                self.order.lock().unwrap().push(self.tag);
            }
            fn on_connection_state_event(&self, _: &AlertDevice, _: &AlertStateEvent) {}
        }

        for tag in ["first", "second", "third"] {
            device.add_listener(Arc::new(Tagged {
                tag,
                order: order.clone(),
            }));
        }

        device.set_alert_level_and_notify(1, None);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn add_listener_is_idempotent() {
        let device = AlertDevice::new("10.0.0.5", 12321);
        let (recorder, dynamic) = listener();

        device.add_listener(dynamic.clone());
        device.add_listener(dynamic.clone());
        device.set_connected_and_notify(true, None);

        assert_eq!(
            recorder.events(),
            vec![(AlertEventKind::ConnectionState, 0, true)]
        );
    }

    #[test]
    fn remove_absent_listener_is_noop() {
        let device = AlertDevice::new("10.0.0.5", 12321);
        let (recorder, dynamic) = listener();

        device.remove_listener(&dynamic);
        device.add_listener(dynamic.clone());
        device.remove_listener(&dynamic);
        device.set_alert_level_and_notify(2, None);

        assert!(recorder.events().is_empty());
    }

    #[test]
    fn panicking_listener_does_not_abort_dispatch() {
        struct Panicking;
        impl AlertStateListener for Panicking {
            fn on_alert_level_event(&self, _: &AlertDevice, _: &AlertStateEvent) {
                panic!("boom");
            }
            fn on_connection_state_event(&self, _: &AlertDevice, _: &AlertStateEvent) {}
        }

        let device = AlertDevice::new("10.0.0.5", 12321);
        let (recorder, dynamic) = listener();
        device.add_listener(Arc::new(Panicking));
        device.add_listener(dynamic);

        device.set_alert_level_and_notify(7, None);

        assert_eq!(recorder.events(), vec![(AlertEventKind::AlertLevel, 7, false)]);
    }
}
