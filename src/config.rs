//! Optional TOML configuration for the guard binary.
//!
//! ```toml
//! device_class = "{4d36e96e-e325-11ce-bfc1-08002be10318}"
//! key = "Escape"
//! cooldown_ms = 3000
//! ```

use crate::debounce::DEFAULT_COOLDOWN;
use crate::key::Key;
use crate::listener::{DisplayGuardBuilder, DEFAULT_DEVICE_CLASS};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Guard settings; every field falls back to the platform default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardConfig {
    /// Device class to watch (class GUID on Windows, udev subsystem on Linux).
    pub device_class: String,
    /// Name of the key to press, e.g. "Escape".
    pub key: String,
    /// Minimum time between two key presses, in milliseconds.
    pub cooldown_ms: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            device_class: DEFAULT_DEVICE_CLASS.to_string(),
            key: Key::Escape.to_string(),
            cooldown_ms: DEFAULT_COOLDOWN.as_millis() as u64,
        }
    }
}

impl GuardConfig {
    /// Parse a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid guard configuration")
    }

    /// Read and parse a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("In config file {}", path.display()))
    }

    /// Turn the config into a builder, validating the key name.
    pub fn builder(&self) -> Result<DisplayGuardBuilder> {
        let key = Key::parse(&self.key)?;
        if self.device_class.trim().is_empty() {
            anyhow::bail!("device_class must not be empty");
        }
        Ok(DisplayGuardBuilder::new()
            .device_class(self.device_class.trim())
            .key(key)
            .cooldown(Duration::from_millis(self.cooldown_ms)))
    }
}
