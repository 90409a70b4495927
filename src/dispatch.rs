//! Hands accepted removals to worker threads.

use crate::debounce::DebounceGate;
use crate::event::DeviceRemovalEvent;
use crate::inject::InputInjector;
use crate::key::Key;
use crate::report::{Reporter, Severity};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

struct Inner {
    gate: DebounceGate,
    injector: Arc<dyn InputInjector>,
    reporter: Arc<dyn Reporter>,
    key: Key,
}

/// Runs the response to a removal on its own thread.
///
/// Cloning is cheap; all clones share one debounce gate.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(
        gate: DebounceGate,
        injector: Arc<dyn InputInjector>,
        reporter: Arc<dyn Reporter>,
        key: Key,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                gate,
                injector,
                reporter,
                key,
            }),
        }
    }

    pub fn reporter(&self) -> &dyn Reporter {
        self.inner.reporter.as_ref()
    }

    /// Spawn a worker for `event` and return without waiting for it.
    ///
    /// The debounce check runs on the worker, never on the caller.
    pub fn dispatch(&self, event: DeviceRemovalEvent) -> Option<JoinHandle<()>> {
        let dispatcher = self.clone();
        let spawned = thread::Builder::new()
            .name("display-guard-worker".to_string())
            .spawn(move || {
                dispatcher.handle(&event);
            });
        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                self.reporter()
                    .report(Severity::Error, &format!("Failed to spawn worker: {}", e));
                None
            }
        }
    }

    /// Debounce `event` and, if it wins, inject the configured key.
    ///
    /// Returns whether the event was accepted.
    pub fn handle(&self, event: &DeviceRemovalEvent) -> bool {
        let inner = &self.inner;
        if !inner.gate.should_trigger(event.observed_at()) {
            log::debug!(
                "Ignoring removal of {} within {:?} cooldown",
                event.device_name(),
                inner.gate.cooldown()
            );
            return false;
        }

        inner.reporter.report(
            Severity::Info,
            &format!("Disconnection Detected: {}", event.device_name()),
        );

        let code = inner.key.virtual_key();
        log::debug!("Sending {} key ({})", inner.key, code);
        match inner.injector.inject_key(code) {
            Ok(()) => inner.reporter.report(
                Severity::Info,
                &format!("Success: {} command sent to the OS.", inner.key),
            ),
            Err(e) => inner
                .reporter
                .report(Severity::Error, &format!("Error: {}", e)),
        }
        true
    }
}
