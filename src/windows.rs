//! Windows implementation using WMI for removals and SendInput for keys.

use crate::error::{GuardError, InjectionError};
use crate::event::{DeviceClassId, DeviceRemovalEvent, KeyPhase, SyntheticKeyEvent};
use crate::inject::InputInjector;
use crate::key::{Key, VirtualKey};
use crate::source::{Delivery, PumpedSource, Subscription};
use futures::channel::oneshot;
use futures::executor::block_on;
use futures::future::{select, Either};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::mpsc::{Sender, SyncSender};
use std::sync::Arc;
use std::time::Instant;
use windows_sys::Win32::Foundation::GetLastError;
use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYEVENTF_KEYUP, VIRTUAL_KEY,
    VK_ESCAPE, VK_F1, VK_F10, VK_F11, VK_F12, VK_F2, VK_F3, VK_F4, VK_F5, VK_F6, VK_F7, VK_F8,
    VK_F9, VK_INSERT, VK_PAUSE, VK_SCROLL, VK_SPACE,
};
use wmi::{COMLibrary, WMIConnection};

/// Value stored in `dwExtraInfo` of every injected key ("DGRD").
pub const SYNTHETIC_INPUT_TAG: usize = 0x4447_5244;

#[derive(Deserialize, Debug)]
#[serde(rename = "__InstanceDeletionEvent")]
#[serde(rename_all = "PascalCase")]
struct InstanceDeletion {
    target_instance: PnpEntity,
}

#[derive(Deserialize, Debug)]
#[serde(rename = "Win32_PnPEntity")]
#[serde(rename_all = "PascalCase")]
struct PnpEntity {
    caption: Option<String>,
    class_guid: Option<String>,
}

/// WQL for removals of class `class`, polled once per second.
fn removal_query(class: &DeviceClassId) -> String {
    format!(
        "SELECT * FROM __InstanceDeletionEvent WITHIN 1 \
         WHERE TargetInstance ISA 'Win32_PnPEntity' \
         AND TargetInstance.ClassGuid = '{}'",
        class.as_str().replace('\'', "")
    )
}

/// Subscribe to WMI removal notifications for device class `class`.
///
/// COM objects live on a dedicated pump thread; this returns once the
/// query has been accepted or rejected.
pub fn subscribe(class: &DeviceClassId) -> Result<Subscription, GuardError> {
    let query = removal_query(class);
    let (stop_tx, stop_rx) = oneshot::channel();
    let pump_class = class.clone();

    let source = PumpedSource::spawn(
        "display-guard-wmi",
        class,
        move || {
            let _ = stop_tx.send(());
        },
        move |ready, events| run_pump(query, pump_class, ready, events, stop_rx),
    )?;

    log::debug!("WMI removal query registered for class {}", class);
    Ok(Subscription::new(source))
}

fn run_pump(
    query: String,
    class: DeviceClassId,
    ready: SyncSender<Result<(), String>>,
    events: Sender<Delivery>,
    stop: oneshot::Receiver<()>,
) {
    let connection = match COMLibrary::new().and_then(WMIConnection::new) {
        Ok(connection) => connection,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };
    let stream = match connection.async_raw_notification::<InstanceDeletion>(&query) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let mut stream = Box::pin(stream);
    let mut stop = stop;
    block_on(async {
        loop {
            let event = match select(stream.next(), &mut stop).await {
                Either::Left((Some(Ok(deletion)), _)) => {
                    removal_event(Some(deletion.target_instance), &class)
                }
                // The query only matches removals of `class`, so a payload
                // we cannot read is still a removal.
                Either::Left((Some(Err(e)), _)) => {
                    log::warn!("Unreadable WMI removal notification: {}", e);
                    removal_event(None, &class)
                }
                Either::Left((None, _)) => {
                    let _ = events.send(Err(GuardError::SubscriptionLost(
                        "WMI notification stream ended".to_string(),
                    )));
                    break;
                }
                // Stop requested, or the source was dropped.
                Either::Right(_) => break,
            };
            if events.send(Ok(event)).is_err() {
                break;
            }
        }
    });
    // Dropping the stream cancels the WMI sink before COM is torn down.
    drop(stream);
    drop(connection);
}

fn removal_event(entity: Option<PnpEntity>, subscribed: &DeviceClassId) -> DeviceRemovalEvent {
    let (caption, class_guid) = match entity {
        Some(entity) => (entity.caption, entity.class_guid),
        None => (None, None),
    };
    let class = class_guid
        .map(DeviceClassId::new)
        .unwrap_or_else(|| subscribed.clone());
    DeviceRemovalEvent::new(caption, Instant::now(), class)
}

/// Virtual-key code for `key`.
fn to_vk(key: Key) -> VIRTUAL_KEY {
    match key {
        Key::Escape => VK_ESCAPE,
        Key::Space => VK_SPACE,
        Key::Pause => VK_PAUSE,
        Key::F1 => VK_F1,
        Key::F2 => VK_F2,
        Key::F3 => VK_F3,
        Key::F4 => VK_F4,
        Key::F5 => VK_F5,
        Key::F6 => VK_F6,
        Key::F7 => VK_F7,
        Key::F8 => VK_F8,
        Key::F9 => VK_F9,
        Key::F10 => VK_F10,
        Key::F11 => VK_F11,
        Key::F12 => VK_F12,
        Key::ScrollLock => VK_SCROLL,
        Key::Insert => VK_INSERT,
    }
}

pub fn virtual_key(key: Key) -> VirtualKey {
    VirtualKey(to_vk(key))
}

/// SendInput-based injector.
pub fn injector() -> Result<Arc<dyn InputInjector>, GuardError> {
    Ok(Arc::new(SendInputInjector))
}

struct SendInputInjector;

fn keyboard_input(event: SyntheticKeyEvent) -> INPUT {
    let flags = match event.phase {
        KeyPhase::Down => 0,
        KeyPhase::Up => KEYEVENTF_KEYUP,
    };
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: event.key.0,
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: SYNTHETIC_INPUT_TAG,
            },
        },
    }
}

impl InputInjector for SendInputInjector {
    fn inject_key(&self, key: VirtualKey) -> Result<(), InjectionError> {
        let inputs = SyntheticKeyEvent::press(key).map(keyboard_input);
        // Both halves in one call so nothing else can land between them.
        let sent = unsafe {
            SendInput(
                inputs.len() as u32,
                inputs.as_ptr(),
                std::mem::size_of::<INPUT>() as i32,
            )
        };
        if sent as usize == inputs.len() {
            Ok(())
        } else {
            Err(InjectionError::new(key, unsafe { GetLastError() } as i32))
        }
    }
}
