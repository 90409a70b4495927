//! Platform-agnostic key representation.

use anyhow::{anyhow, Result};

/// Opaque key code understood by the platform input facility.
///
/// On Windows this is a virtual-key code, on Linux an evdev key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualKey(pub u16);

impl std::fmt::Display for VirtualKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Keys that can be sent when a display disappears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Escape,
    Space,
    Pause,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    ScrollLock,
    Insert,
}

impl Key {
    /// Every supported key, in declaration order.
    pub const ALL: [Key; 17] = [
        Key::Escape,
        Key::Space,
        Key::Pause,
        Key::F1,
        Key::F2,
        Key::F3,
        Key::F4,
        Key::F5,
        Key::F6,
        Key::F7,
        Key::F8,
        Key::F9,
        Key::F10,
        Key::F11,
        Key::F12,
        Key::ScrollLock,
        Key::Insert,
    ];

    /// Parse a key from a string like "Escape" or "F8".
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "ESCAPE" | "ESC" => Ok(Key::Escape),
            "SPACE" => Ok(Key::Space),
            "PAUSE" => Ok(Key::Pause),
            "F1" => Ok(Key::F1),
            "F2" => Ok(Key::F2),
            "F3" => Ok(Key::F3),
            "F4" => Ok(Key::F4),
            "F5" => Ok(Key::F5),
            "F6" => Ok(Key::F6),
            "F7" => Ok(Key::F7),
            "F8" => Ok(Key::F8),
            "F9" => Ok(Key::F9),
            "F10" => Ok(Key::F10),
            "F11" => Ok(Key::F11),
            "F12" => Ok(Key::F12),
            "SCROLLLOCK" | "SCROLL_LOCK" => Ok(Key::ScrollLock),
            "INSERT" => Ok(Key::Insert),
            _ => Err(anyhow!("Unknown key: {}", s)),
        }
    }

    /// Key code for the platform this crate was compiled for.
    #[cfg(any(target_os = "linux", target_os = "windows"))]
    pub fn virtual_key(self) -> VirtualKey {
        crate::platform::virtual_key(self)
    }

    /// Without a platform backend the code is the key's position in
    /// [`Key::ALL`].
    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    pub fn virtual_key(self) -> VirtualKey {
        VirtualKey(self as u16)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Escape => write!(f, "Escape"),
            Key::Space => write!(f, "Space"),
            Key::Pause => write!(f, "Pause"),
            Key::F1 => write!(f, "F1"),
            Key::F2 => write!(f, "F2"),
            Key::F3 => write!(f, "F3"),
            Key::F4 => write!(f, "F4"),
            Key::F5 => write!(f, "F5"),
            Key::F6 => write!(f, "F6"),
            Key::F7 => write!(f, "F7"),
            Key::F8 => write!(f, "F8"),
            Key::F9 => write!(f, "F9"),
            Key::F10 => write!(f, "F10"),
            Key::F11 => write!(f, "F11"),
            Key::F12 => write!(f, "F12"),
            Key::ScrollLock => write!(f, "ScrollLock"),
            Key::Insert => write!(f, "Insert"),
        }
    }
}
