//! Cooldown gate that collapses bursts of removal notifications.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Default time that must pass between two accepted triggers.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3);

#[derive(Debug)]
struct DebounceState {
    last_trigger_at: Option<Instant>,
    cooldown: Duration,
}

/// Accepts at most one trigger per cooldown window.
#[derive(Debug)]
pub struct DebounceGate {
    state: Mutex<DebounceState>,
}

impl DebounceGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(DebounceState {
                last_trigger_at: None,
                cooldown,
            }),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cooldown
    }

    /// Returns true and records `now` if no trigger was accepted within the
    /// cooldown before `now`.
    ///
    /// The compare and the update happen under one lock, so concurrent
    /// callers can never both win the same window. A `now` earlier than the
    /// last accepted trigger counts as inside the window.
    pub fn should_trigger(&self, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = match state.last_trigger_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= state.cooldown,
        };
        if expired {
            state.last_trigger_at = Some(now);
        }
        expired
    }
}

impl Default for DebounceGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}
