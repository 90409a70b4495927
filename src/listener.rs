//! Platform-agnostic guard builder and listening loop.

use crate::debounce::{DebounceGate, DEFAULT_COOLDOWN};
use crate::dispatch::Dispatcher;
use crate::error::GuardError;
use crate::event::DeviceClassId;
use crate::inject::InputInjector;
use crate::key::Key;
use crate::report::{LogReporter, Reporter, Severity};
use crate::source::Subscription;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long the listener waits for a notification before re-checking
/// whether it should stop.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Device class watched when none is configured.
#[cfg(target_os = "windows")]
pub const DEFAULT_DEVICE_CLASS: &str = "{4d36e96e-e325-11ce-bfc1-08002be10318}";

/// Device class watched when none is configured.
#[cfg(not(target_os = "windows"))]
pub const DEFAULT_DEVICE_CLASS: &str = "drm";

/// Builder for creating a display guard.
pub struct DisplayGuardBuilder {
    device_class: DeviceClassId,
    key: Key,
    cooldown: Duration,
    reporter: Arc<dyn Reporter>,
}

impl Default for DisplayGuardBuilder {
    fn default() -> Self {
        Self {
            device_class: DeviceClassId::new(DEFAULT_DEVICE_CLASS),
            key: Key::Escape,
            cooldown: DEFAULT_COOLDOWN,
            reporter: Arc::new(LogReporter),
        }
    }
}

impl DisplayGuardBuilder {
    /// Create a new builder with platform defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch removals of this device class.
    pub fn device_class(mut self, class: impl Into<DeviceClassId>) -> Self {
        self.device_class = class.into();
        self
    }

    /// Key to press when a device is removed.
    pub fn key(mut self, key: Key) -> Self {
        self.key = key;
        self
    }

    /// Minimum time between two key presses.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Where status lines go. Defaults to the `log` facade.
    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Build the guard on top of the platform subscription and injector.
    #[cfg(any(target_os = "linux", target_os = "windows"))]
    pub fn build(self) -> Result<DisplayGuard, GuardError> {
        let injector = crate::platform::injector()?;
        let subscription = crate::platform::subscribe(&self.device_class)?;
        Ok(self.build_with(subscription, injector))
    }

    /// Build the guard (unsupported platform stub).
    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    pub fn build(self) -> Result<DisplayGuard, GuardError> {
        Err(GuardError::Subscription {
            class: self.device_class.to_string(),
            reason: "device removal notifications are not supported on this platform".to_string(),
        })
    }

    /// Build the guard on top of the given collaborators.
    pub fn build_with(
        self,
        subscription: Subscription,
        injector: Arc<dyn InputInjector>,
    ) -> DisplayGuard {
        let dispatcher = Dispatcher::new(
            DebounceGate::new(self.cooldown),
            injector,
            self.reporter,
            self.key,
        );
        DisplayGuard {
            subscription,
            dispatcher,
            filter: self.device_class,
            key: self.key,
        }
    }
}

/// A subscribed guard that has not started listening yet.
pub struct DisplayGuard {
    subscription: Subscription,
    dispatcher: Dispatcher,
    filter: DeviceClassId,
    key: Key,
}

impl DisplayGuard {
    /// Start listening for removals in a background thread.
    ///
    /// The listener stops when the returned handle is stopped or dropped,
    /// or when the OS drops the subscription.
    pub fn start(self) -> Result<GuardHandle, GuardError> {
        let DisplayGuard {
            mut subscription,
            dispatcher,
            filter,
            key,
        } = self;

        dispatcher.reporter().report(
            Severity::Info,
            &format!(
                "Listening for removals of device class {}; will press {}",
                filter, key
            ),
        );

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("display-guard-listener".to_string())
            .spawn(move || {
                let result = listen(&mut subscription, &filter, &dispatcher, &flag);
                subscription.release();
                flag.store(false, Ordering::SeqCst);
                if let Err(e) = &result {
                    dispatcher
                        .reporter()
                        .report(Severity::Error, &format!("Critical Error: {}", e));
                }
                result
            })
            .map_err(|e| GuardError::Listener(e.to_string()))?;

        Ok(GuardHandle {
            running,
            thread: Some(thread),
        })
    }
}

/// Forward matching removals to the dispatcher until `running` clears or
/// the subscription fails.
///
/// Never blocks on a worker: each event is handed off and the loop goes
/// straight back to waiting.
pub(crate) fn listen(
    subscription: &mut Subscription,
    filter: &DeviceClassId,
    dispatcher: &Dispatcher,
    running: &AtomicBool,
) -> Result<(), GuardError> {
    while running.load(Ordering::Relaxed) {
        let Some(event) = subscription.next_event(POLL_INTERVAL)? else {
            continue;
        };
        if !filter.matches(event.device_class()) {
            log::debug!(
                "Skipping removal from device class {}",
                event.device_class()
            );
            continue;
        }
        // Fire and forget; the worker owns the event from here.
        let _ = dispatcher.dispatch(event);
    }
    Ok(())
}

/// Handle for a running guard.
///
/// The background listener automatically stops when this handle is dropped.
pub struct GuardHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<(), GuardError>>>,
}

impl GuardHandle {
    /// Check if the listener is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the listener and wait for it to release the subscription.
    ///
    /// Returns the error that ended the listener, if any. Calling this
    /// again after the first time returns `Ok(())`.
    pub fn stop(&mut self) -> Result<(), GuardError> {
        self.running.store(false, Ordering::SeqCst);
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .unwrap_or_else(|_| Err(GuardError::Listener("listener thread panicked".to_string()))),
            None => Ok(()),
        }
    }
}

impl Drop for GuardHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::debug!("Listener ended with error during drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{removal, RecordingInjector, RecordingReporter, ScriptedSource};
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(2);

    fn builder(reporter: Arc<RecordingReporter>) -> DisplayGuardBuilder {
        DisplayGuardBuilder::new()
            .device_class("{4d36e96e-e325-11ce-bfc1-08002be10318}")
            .key(Key::Escape)
            .cooldown(Duration::from_secs(3))
            .reporter(reporter)
    }

    #[test]
    fn test_non_matching_class_is_ignored() {
        let injector = RecordingInjector::new();
        let reporter = RecordingReporter::new();
        let (source, _probe) = ScriptedSource::new(vec![removal(
            "{36fc9e60-c465-11cf-8056-444553540000}",
            "USB Hub",
            Instant::now(),
        )]);
        let guard = builder(reporter.clone()).build_with(Subscription::new(source), injector.clone());
        let mut handle = guard.start().unwrap();
        let startup_lines = reporter.lines().len();

        assert!(!injector.wait_for_calls(1, Duration::from_millis(400)));
        handle.stop().unwrap();
        assert!(injector.calls().is_empty());
        assert_eq!(reporter.lines().len(), startup_lines);
    }

    #[test]
    fn test_matching_class_with_different_case_triggers() {
        let injector = RecordingInjector::new();
        let reporter = RecordingReporter::new();
        let (source, _probe) = ScriptedSource::new(vec![removal(
            "{4D36E96E-E325-11CE-BFC1-08002BE10318}",
            "Generic PnP Monitor",
            Instant::now(),
        )]);
        let guard = builder(reporter.clone()).build_with(Subscription::new(source), injector.clone());
        let _handle = guard.start().unwrap();

        assert!(injector.wait_for_calls(1, WAIT));
        assert!(reporter.wait_for(Severity::Info, 3, WAIT));
        assert!(reporter
            .lines()
            .iter()
            .any(|(_, line)| line == "Disconnection Detected: Generic PnP Monitor"));
    }

    #[test]
    fn test_burst_then_later_event() {
        let injector = RecordingInjector::new();
        let reporter = RecordingReporter::new();
        let t0 = Instant::now();
        let class = "{4d36e96e-e325-11ce-bfc1-08002be10318}";
        let (source, probe) = ScriptedSource::new(Vec::new());
        let guard = builder(reporter).build_with(Subscription::new(source), injector.clone());
        let mut handle = guard.start().unwrap();

        probe.push(removal(class, "Monitor", t0));
        assert!(injector.wait_for_calls(1, WAIT));
        probe.push(removal(class, "Monitor", t0 + Duration::from_secs(1)));
        assert!(!injector.wait_for_calls(2, Duration::from_millis(300)));
        probe.push(removal(class, "Monitor", t0 + Duration::from_secs(4)));
        assert!(injector.wait_for_calls(2, WAIT));

        handle.stop().unwrap();
        assert_eq!(injector.calls().len(), 2);
    }

    #[test]
    fn test_failed_injection_keeps_listening() {
        let injector = RecordingInjector::failing_first(1);
        let reporter = RecordingReporter::new();
        let t0 = Instant::now();
        let class = "{4d36e96e-e325-11ce-bfc1-08002be10318}";
        let (source, probe) = ScriptedSource::new(Vec::new());
        let guard = builder(reporter.clone()).build_with(Subscription::new(source), injector.clone());
        let mut handle = guard.start().unwrap();

        probe.push(removal(class, "Monitor", t0));
        assert!(reporter.wait_for(Severity::Error, 1, WAIT));
        assert!(handle.is_running());

        probe.push(removal(class, "Monitor", t0 + Duration::from_secs(4)));
        assert!(injector.wait_for_calls(2, WAIT));
        assert!(reporter.wait_for(Severity::Info, 4, WAIT));

        handle.stop().unwrap();
        assert_eq!(reporter.count(Severity::Error), 1);
    }

    #[test]
    fn test_listener_does_not_wait_for_slow_injector() {
        let injector = RecordingInjector::slow(Duration::from_millis(500));
        let reporter = RecordingReporter::new();
        let t0 = Instant::now();
        let class = "drm";
        let events = (0..5)
            .map(|i| removal(class, "card0", t0 + Duration::from_secs(i * 10)))
            .collect();
        let (source, mut probe) = ScriptedSource::new(events);
        probe.disconnect();

        let dispatcher = Dispatcher::new(
            DebounceGate::new(Duration::from_secs(3)),
            injector.clone(),
            reporter,
            Key::Escape,
        );
        let running = AtomicBool::new(true);
        let mut subscription = Subscription::new(source);

        let started = Instant::now();
        let result = listen(&mut subscription, &DeviceClassId::new(class), &dispatcher, &running);
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(GuardError::SubscriptionLost(_))));
        assert!(elapsed < Duration::from_millis(400), "listener took {:?}", elapsed);
        assert!(injector.wait_for_calls(5, WAIT));
    }

    #[test]
    fn test_lost_subscription_stops_listener() {
        let injector = RecordingInjector::new();
        let reporter = RecordingReporter::new();
        let (source, mut probe) = ScriptedSource::new(Vec::new());
        let guard = builder(reporter.clone()).build_with(Subscription::new(source), injector);
        let mut handle = guard.start().unwrap();

        probe.disconnect();
        assert!(reporter.wait_for(Severity::Error, 1, WAIT));
        assert!(matches!(handle.stop(), Err(GuardError::SubscriptionLost(_))));
        assert!(!handle.is_running());
        assert_eq!(probe.unsubscribed(), 1);
        assert!(handle.stop().is_ok());
    }

    #[test]
    fn test_start_stop_cycles_release_once_each() {
        for _ in 0..5 {
            let (source, probe) = ScriptedSource::new(Vec::new());
            let guard = builder(RecordingReporter::new())
                .build_with(Subscription::new(source), RecordingInjector::new());
            let mut handle = guard.start().unwrap();
            assert!(handle.is_running());
            handle.stop().unwrap();
            drop(handle);
            assert_eq!(probe.unsubscribed(), 1);
        }
    }

    #[test]
    fn test_dropping_handle_releases_subscription() {
        let (source, probe) = ScriptedSource::new(Vec::new());
        let guard = builder(RecordingReporter::new())
            .build_with(Subscription::new(source), RecordingInjector::new());
        drop(guard.start().unwrap());
        assert_eq!(probe.unsubscribed(), 1);
    }

    #[test]
    fn test_unstarted_guard_releases_subscription() {
        let (source, probe) = ScriptedSource::new(Vec::new());
        let guard = builder(RecordingReporter::new())
            .build_with(Subscription::new(source), RecordingInjector::new());
        drop(guard);
        assert_eq!(probe.unsubscribed(), 1);
    }
}
