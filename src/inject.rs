//! Synthetic key injection.

use crate::error::InjectionError;
use crate::key::VirtualKey;

/// Submits a key-down/key-up pair to the OS input stream.
///
/// Implementations must submit both halves as one batch so no other input
/// can land between them.
pub trait InputInjector: Send + Sync {
    fn inject_key(&self, key: VirtualKey) -> Result<(), InjectionError>;
}
