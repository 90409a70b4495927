//! Error types for the guard.

use crate::key::VirtualKey;
use thiserror::Error;

/// Errors that end the guard or prevent it from starting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// The OS refused the device removal subscription.
    #[error("Failed to subscribe to removals of device class {class}: {reason}")]
    Subscription { class: String, reason: String },

    /// The OS tore down a running subscription.
    #[error("Device removal subscription lost: {0}")]
    SubscriptionLost(String),

    /// The platform input facility could not be opened.
    #[error("Failed to initialize input injection: {0}")]
    InjectorInit(String),

    /// The listening thread could not be started or crashed.
    #[error("Listener failure: {0}")]
    Listener(String),
}

/// The OS rejected a synthetic key press.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Input injection failed for key {key}. Code: {os_error}")]
pub struct InjectionError {
    pub key: VirtualKey,
    pub os_error: i32,
}

impl InjectionError {
    pub fn new(key: VirtualKey, os_error: i32) -> Self {
        Self { key, os_error }
    }
}
