//! Fakes shared by the unit tests.

use crate::error::{GuardError, InjectionError};
use crate::event::{DeviceClassId, DeviceRemovalEvent};
use crate::inject::InputInjector;
use crate::key::VirtualKey;
use crate::report::{Reporter, Severity};
use crate::source::DeviceEventSource;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub(crate) fn removal(class: &str, name: &str, observed_at: Instant) -> DeviceRemovalEvent {
    DeviceRemovalEvent::new(Some(name.to_string()), observed_at, DeviceClassId::new(class))
}

/// Source fed from a channel; disconnecting the feed ends the subscription.
pub(crate) struct ScriptedSource {
    rx: Receiver<DeviceRemovalEvent>,
    unsubscribed: Arc<AtomicUsize>,
}

/// Test-side end of a [`ScriptedSource`].
pub(crate) struct SourceProbe {
    tx: Option<Sender<DeviceRemovalEvent>>,
    unsubscribed: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub(crate) fn new(events: Vec<DeviceRemovalEvent>) -> (Self, SourceProbe) {
        let (tx, rx) = mpsc::channel();
        for event in events {
            tx.send(event).unwrap();
        }
        let unsubscribed = Arc::new(AtomicUsize::new(0));
        (
            Self {
                rx,
                unsubscribed: Arc::clone(&unsubscribed),
            },
            SourceProbe {
                tx: Some(tx),
                unsubscribed,
            },
        )
    }
}

impl DeviceEventSource for ScriptedSource {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<DeviceRemovalEvent>, GuardError> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(GuardError::SubscriptionLost("feed disconnected".to_string()))
            }
        }
    }

    fn unsubscribe(&mut self) {
        self.unsubscribed.fetch_add(1, Ordering::SeqCst);
    }
}

impl SourceProbe {
    pub(crate) fn push(&self, event: DeviceRemovalEvent) {
        if let Some(tx) = &self.tx {
            tx.send(event).unwrap();
        }
    }

    pub(crate) fn disconnect(&mut self) {
        self.tx = None;
    }

    pub(crate) fn unsubscribed(&self) -> usize {
        self.unsubscribed.load(Ordering::SeqCst)
    }
}

/// Records every injected key, optionally slow or failing.
#[derive(Default)]
pub(crate) struct RecordingInjector {
    calls: Mutex<Vec<VirtualKey>>,
    changed: Condvar,
    delay: Duration,
    failures_left: AtomicUsize,
}

impl RecordingInjector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub(crate) fn failing_first(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(failures),
            ..Self::default()
        })
    }

    pub(crate) fn calls(&self) -> Vec<VirtualKey> {
        self.calls.lock().unwrap().clone()
    }

    /// Block until at least `count` injections were attempted.
    pub(crate) fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
        let calls = self.calls.lock().unwrap();
        let (calls, _) = self
            .changed
            .wait_timeout_while(calls, timeout, |calls| calls.len() < count)
            .unwrap();
        calls.len() >= count
    }
}

impl InputInjector for RecordingInjector {
    fn inject_key(&self, key: VirtualKey) -> Result<(), InjectionError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.calls.lock().unwrap().push(key);
        self.changed.notify_all();
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            Err(InjectionError::new(key, 5))
        } else {
            Ok(())
        }
    }
}

/// Keeps every status line in memory.
#[derive(Default)]
pub(crate) struct RecordingReporter {
    lines: Mutex<Vec<(Severity, String)>>,
    changed: Condvar,
}

impl RecordingReporter {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn lines(&self) -> Vec<(Severity, String)> {
        self.lines.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, severity: Severity) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == severity)
            .count()
    }

    /// Block until at least `count` lines of `severity` were reported.
    pub(crate) fn wait_for(&self, severity: Severity, count: usize, timeout: Duration) -> bool {
        let lines = self.lines.lock().unwrap();
        let (lines, _) = self
            .changed
            .wait_timeout_while(lines, timeout, |lines| {
                lines.iter().filter(|(s, _)| *s == severity).count() < count
            })
            .unwrap();
        lines.iter().filter(|(s, _)| *s == severity).count() >= count
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, severity: Severity, message: &str) {
        self.lines.lock().unwrap().push((severity, message.to_string()));
        self.changed.notify_all();
    }
}
