//! Presses a key when a display is disconnected.
//!
//! The guard subscribes to OS notifications for removed devices of one
//! device class (monitors by default) and, when one arrives, sends a
//! synthetic key press (Escape by default) so the focused game or player
//! pauses itself. Bursts of notifications for the same unplug are
//! collapsed by a cooldown.
//!
//! # Features
//!
//! - **Windows** - WMI `__InstanceDeletionEvent` on `Win32_PnPEntity`, keys via `SendInput`
//! - **Linux** - udev removals and connector hotplugs for a subsystem (`drm` by default), keys via uinput
//! - **Non-blocking listener** - every notification is handled on its own worker thread
//! - **Automatic cleanup** - the subscription is released when the handle is dropped
//!
//! # Example
//!
//! ```no_run
//! use display_guard::{DisplayGuardBuilder, Key};
//! use std::time::Duration;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut handle = DisplayGuardBuilder::new()
//!         .key(Key::Escape)
//!         .cooldown(Duration::from_secs(3))
//!         .build()?
//!         .start()?;
//!
//!     while handle.is_running() {
//!         std::thread::sleep(Duration::from_millis(250));
//!     }
//!
//!     // Reports why the listener stopped, e.g. a lost subscription
//!     handle.stop()?;
//!     Ok(())
//! }
//! ```
//!
//! # Linux Requirements
//!
//! Injection goes through `/dev/uinput`, which usually needs root or
//! membership in the `input` group.

mod config;
mod debounce;
mod dispatch;
mod error;
mod event;
mod inject;
mod key;
mod listener;
mod report;
mod source;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
use linux as platform;

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "windows")]
use windows as platform;

#[cfg(test)]
mod testing;

pub use config::GuardConfig;
pub use debounce::{DebounceGate, DEFAULT_COOLDOWN};
pub use dispatch::Dispatcher;
pub use error::{GuardError, InjectionError};
pub use event::{DeviceClassId, DeviceRemovalEvent, KeyPhase, SyntheticKeyEvent, UNKNOWN_DEVICE};
pub use inject::InputInjector;
pub use key::{Key, VirtualKey};
pub use listener::{DisplayGuard, DisplayGuardBuilder, GuardHandle, DEFAULT_DEVICE_CLASS};
pub use report::{LogReporter, Reporter, Severity};
pub use source::{DeviceEventSource, Subscription};

#[cfg(target_os = "windows")]
pub use windows::SYNTHETIC_INPUT_TAG;
