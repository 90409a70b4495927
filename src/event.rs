//! Events flowing through the guard: device removals in, synthetic keys out.

use crate::key::VirtualKey;
use std::time::Instant;

/// Name used when the removed device did not report one.
pub const UNKNOWN_DEVICE: &str = "Unknown Device";

/// Identifier of a device category, e.g. a class GUID on Windows or a
/// udev subsystem on Linux.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceClassId(String);

impl DeviceClassId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison that ignores surrounding braces.
    pub fn matches(&self, other: &DeviceClassId) -> bool {
        normalized(&self.0).eq_ignore_ascii_case(normalized(&other.0))
    }
}

fn normalized(id: &str) -> &str {
    let id = id.trim();
    id.strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(id)
}

impl std::fmt::Display for DeviceClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceClassId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceClassId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A device of a watched class was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRemovalEvent {
    device_name: Option<String>,
    observed_at: Instant,
    device_class: DeviceClassId,
}

impl DeviceRemovalEvent {
    pub fn new(
        device_name: Option<String>,
        observed_at: Instant,
        device_class: DeviceClassId,
    ) -> Self {
        let device_name = device_name.filter(|name| !name.trim().is_empty());
        Self {
            device_name,
            observed_at,
            device_class,
        }
    }

    /// The device name, if the OS reported one.
    pub fn reported_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    /// The device name, or [`UNKNOWN_DEVICE`].
    pub fn device_name(&self) -> &str {
        self.reported_name().unwrap_or(UNKNOWN_DEVICE)
    }

    pub fn observed_at(&self) -> Instant {
        self.observed_at
    }

    pub fn device_class(&self) -> &DeviceClassId {
        &self.device_class
    }
}

/// Whether a synthetic key event presses or releases the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPhase {
    Down,
    Up,
}

/// One half of a synthetic key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticKeyEvent {
    pub key: VirtualKey,
    pub phase: KeyPhase,
}

impl SyntheticKeyEvent {
    /// Key-down followed by key-up for the same key.
    pub fn press(key: VirtualKey) -> [SyntheticKeyEvent; 2] {
        [
            SyntheticKeyEvent {
                key,
                phase: KeyPhase::Down,
            },
            SyntheticKeyEvent {
                key,
                phase: KeyPhase::Up,
            },
        ]
    }
}
