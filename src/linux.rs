//! Linux implementation using udev for display hotplug and evdev uinput for keys.

use crate::error::{GuardError, InjectionError};
use crate::event::{DeviceClassId, DeviceRemovalEvent, KeyPhase, SyntheticKeyEvent};
use crate::inject::InputInjector;
use crate::key::{Key, VirtualKey};
use crate::source::{Delivery, PumpedSource, Subscription};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Sender, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Name of the virtual keyboard, so other listeners can tell our presses
/// from physical ones.
const VIRTUAL_KEYBOARD_NAME: &str = "display-guard virtual keyboard";

/// Properties tried in order for a human-readable device name.
const NAME_PROPERTIES: [&str; 3] = ["ID_MODEL_FROM_DATABASE", "ID_MODEL", "DEVNAME"];

/// udev device type of a DRM connector (`cardN-DP-1`, ...).
const CONNECTOR_DEVTYPE: &str = "drm_connector";

/// How long the pump waits on the socket before checking for stop.
const PUMP_POLL: Duration = Duration::from_millis(100);

/// Convert our platform-agnostic Key to evdev Key.
fn to_evdev_key(key: Key) -> evdev::Key {
    match key {
        Key::Escape => evdev::Key::KEY_ESC,
        Key::Space => evdev::Key::KEY_SPACE,
        Key::Pause => evdev::Key::KEY_PAUSE,
        Key::F1 => evdev::Key::KEY_F1,
        Key::F2 => evdev::Key::KEY_F2,
        Key::F3 => evdev::Key::KEY_F3,
        Key::F4 => evdev::Key::KEY_F4,
        Key::F5 => evdev::Key::KEY_F5,
        Key::F6 => evdev::Key::KEY_F6,
        Key::F7 => evdev::Key::KEY_F7,
        Key::F8 => evdev::Key::KEY_F8,
        Key::F9 => evdev::Key::KEY_F9,
        Key::F10 => evdev::Key::KEY_F10,
        Key::F11 => evdev::Key::KEY_F11,
        Key::F12 => evdev::Key::KEY_F12,
        Key::ScrollLock => evdev::Key::KEY_SCROLLLOCK,
        Key::Insert => evdev::Key::KEY_INSERT,
    }
}

/// evdev key code for `key`.
pub fn virtual_key(key: Key) -> VirtualKey {
    VirtualKey(to_evdev_key(key).code())
}

/// What a uevent means for the watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Uevent {
    /// A device of the class went away.
    Removed,
    /// The kernel saw a connector change; statuses must be re-read.
    Hotplug,
    Other,
}

/// Classify a uevent by its action and `HOTPLUG` property.
///
/// Unplugging a monitor removes nothing: the card emits `change` with
/// `HOTPLUG=1`. `remove` covers connectors that disappear (DP-MST) and
/// devices of non-DRM classes.
fn classify(action: udev::EventType, hotplug: Option<&str>) -> Uevent {
    match action {
        udev::EventType::Remove => Uevent::Removed,
        udev::EventType::Change if hotplug == Some("1") => Uevent::Hotplug,
        _ => Uevent::Other,
    }
}

/// Connector status (`connected`, `disconnected`, `unknown`) by connector name.
type ConnectorStates = BTreeMap<String, String>;

/// Connectors that were connected in `before` and are present but no
/// longer connected in `after`.
///
/// Connectors missing from `after` were removed and arrive as `remove`
/// uevents of their own.
fn newly_disconnected(before: &ConnectorStates, after: &ConnectorStates) -> Vec<String> {
    before
        .iter()
        .filter(|(_, status)| status.as_str() == "connected")
        .filter(|(name, _)| {
            after
                .get(name.as_str())
                .map_or(false, |status| status != "connected")
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Best-effort device name: the first naming property present, else the
/// sysname.
fn event_name<'a>(
    property: impl Fn(&str) -> Option<&'a str>,
    sysname: Option<&'a str>,
) -> Option<String> {
    NAME_PROPERTIES
        .iter()
        .find_map(|name| property(*name))
        .or(sysname)
        .map(str::to_owned)
}

/// Read the status of every connector in subsystem `class`.
fn connector_states(class: &DeviceClassId) -> std::io::Result<ConnectorStates> {
    let mut enumerator = udev::Enumerator::new()?;
    enumerator.match_subsystem(class.as_str())?;

    let mut states = ConnectorStates::new();
    for device in enumerator.scan_devices()? {
        if device.devtype().and_then(OsStr::to_str) != Some(CONNECTOR_DEVTYPE) {
            continue;
        }
        let status = device.attribute_value("status").and_then(OsStr::to_str);
        if let (Some(name), Some(status)) = (device.sysname().to_str(), status) {
            states.insert(name.to_owned(), status.trim().to_owned());
        }
    }
    Ok(states)
}

/// Monitors udev for removals and connector disconnects of one subsystem.
///
/// Lives on the pump thread because udev's MonitorSocket is not Send.
struct UdevMonitor {
    socket: udev::MonitorSocket,
    class: DeviceClassId,
    connectors: ConnectorStates,
}

impl UdevMonitor {
    fn new(class: &DeviceClassId) -> std::io::Result<Self> {
        let socket = udev::MonitorBuilder::new()?
            .match_subsystem(class.as_str())?
            .listen()?;
        let connectors = connector_states(class)?;
        log::debug!(
            "Monitoring udev subsystem {} ({} connectors)",
            class,
            connectors.len()
        );
        Ok(Self {
            socket,
            class: class.clone(),
            connectors,
        })
    }

    /// Wait up to `timeout` and return the disconnects that arrived.
    fn poll(&mut self, timeout: Duration) -> Result<Vec<DeviceRemovalEvent>, String> {
        let mut poll_fd = libc::pollfd {
            fd: self.socket.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;

        // Block until the socket has data or the timeout passes
        let ready = unsafe { libc::poll(&mut poll_fd, 1, timeout_ms) };
        if ready < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(format!("poll error: {}", err));
        }
        if ready == 0 {
            return Ok(Vec::new());
        }
        if poll_fd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            return Err(format!(
                "udev monitor socket closed (revents {:#x})",
                poll_fd.revents
            ));
        }

        let observed_at = Instant::now();
        let mut removals = Vec::new();
        let mut rescan = false;
        for event in self.socket.iter() {
            log::debug!(
                "udev event: type={:?}, subsystem={:?}, devtype={:?}, syspath={:?}",
                event.event_type(),
                event.subsystem(),
                event.devtype(),
                event.syspath()
            );
            let hotplug = event.property_value("HOTPLUG").and_then(OsStr::to_str);
            match classify(event.event_type(), hotplug) {
                Uevent::Removed => {
                    let sysname = event.sysname().to_str();
                    if let Some(sysname) = sysname {
                        self.connectors.remove(sysname);
                    }
                    let class = event
                        .subsystem()
                        .and_then(OsStr::to_str)
                        .map(DeviceClassId::new)
                        .unwrap_or_else(|| self.class.clone());
                    let name = event_name(
                        |property| event.property_value(property).and_then(OsStr::to_str),
                        sysname,
                    );
                    removals.push(DeviceRemovalEvent::new(name, observed_at, class));
                }
                Uevent::Hotplug => rescan = true,
                Uevent::Other => {}
            }
        }

        if rescan {
            match connector_states(&self.class) {
                Ok(after) => {
                    for connector in newly_disconnected(&self.connectors, &after) {
                        removals.push(DeviceRemovalEvent::new(
                            Some(connector),
                            observed_at,
                            self.class.clone(),
                        ));
                    }
                    self.connectors = after;
                }
                Err(e) => log::warn!("Failed to read connector status after hotplug: {}", e),
            }
        }
        Ok(removals)
    }
}

fn run_pump(
    class: DeviceClassId,
    ready: SyncSender<Result<(), String>>,
    events: Sender<Delivery>,
    stop: Arc<AtomicBool>,
) {
    let mut monitor = match UdevMonitor::new(&class) {
        Ok(monitor) => monitor,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    while !stop.load(Ordering::SeqCst) {
        match monitor.poll(PUMP_POLL) {
            Ok(removals) => {
                for removal in removals {
                    if events.send(Ok(removal)).is_err() {
                        return;
                    }
                }
            }
            Err(reason) => {
                let _ = events.send(Err(GuardError::SubscriptionLost(reason)));
                return;
            }
        }
    }
    // Dropping the monitor closes the netlink socket on this thread.
}

/// Subscribe to disconnects in the udev subsystem `class`.
pub fn subscribe(class: &DeviceClassId) -> Result<Subscription, GuardError> {
    let stop = Arc::new(AtomicBool::new(false));
    let pump_stop = Arc::clone(&stop);
    let pump_class = class.clone();

    let source = PumpedSource::spawn(
        "display-guard-udev",
        class,
        move || stop.store(true, Ordering::SeqCst),
        move |ready, events| run_pump(pump_class, ready, events, pump_stop),
    )?;
    Ok(Subscription::new(source))
}

/// Create the uinput virtual keyboard used for injection.
pub fn injector() -> Result<Arc<dyn InputInjector>, GuardError> {
    Ok(Arc::new(UinputInjector::new()?))
}

/// Injects keys through a uinput virtual keyboard.
struct UinputInjector {
    device: Mutex<VirtualDevice>,
}

impl UinputInjector {
    fn new() -> Result<Self, GuardError> {
        let mut keys = AttributeSet::<evdev::Key>::new();
        for key in Key::ALL {
            keys.insert(to_evdev_key(key));
        }

        let device = VirtualDeviceBuilder::new()
            .and_then(|builder| builder.name(VIRTUAL_KEYBOARD_NAME).with_keys(&keys))
            .and_then(|builder| builder.build())
            .map_err(|e| {
                GuardError::InjectorInit(format!(
                    "cannot create uinput keyboard ({}); make sure /dev/uinput is writable",
                    e
                ))
            })?;

        Ok(Self {
            device: Mutex::new(device),
        })
    }
}

/// Convert a synthetic key event to an evdev key event.
fn to_input_event(event: SyntheticKeyEvent) -> InputEvent {
    let value = match event.phase {
        KeyPhase::Down => 1,
        KeyPhase::Up => 0,
    };
    InputEvent::new(EventType::KEY, event.key.0, value)
}

impl InputInjector for UinputInjector {
    fn inject_key(&self, key: VirtualKey) -> Result<(), InjectionError> {
        let events = SyntheticKeyEvent::press(key).map(to_input_event);
        // Key-down and key-up go out in one write and SYN_REPORT follows.
        // The device is private to us and held under the lock, so nothing
        // can land between them.
        let mut device = self.device.lock().unwrap_or_else(PoisonError::into_inner);
        device
            .emit(&events)
            .map_err(|e| InjectionError::new(key, e.raw_os_error().unwrap_or(-1)))
    }
}
