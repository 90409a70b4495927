//! Device removal subscriptions.

use crate::error::GuardError;
use crate::event::{DeviceClassId, DeviceRemovalEvent};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A live OS subscription to removals of one device class.
pub trait DeviceEventSource: Send {
    /// Wait up to `timeout` for the next removal.
    ///
    /// `Ok(None)` means nothing arrived in time. An error means the
    /// subscription is gone and will not deliver anything else.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<DeviceRemovalEvent>, GuardError>;

    /// Release the OS resources behind the subscription.
    fn unsubscribe(&mut self);
}

/// Owns a [`DeviceEventSource`] and unsubscribes it exactly once.
///
/// Release happens on [`Subscription::release`] or on drop, whichever comes
/// first.
pub struct Subscription {
    source: Box<dyn DeviceEventSource>,
    released: bool,
}

impl Subscription {
    pub fn new(source: impl DeviceEventSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            released: false,
        }
    }

    pub fn next_event(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<DeviceRemovalEvent>, GuardError> {
        if self.released {
            return Err(GuardError::SubscriptionLost(
                "subscription already released".to_string(),
            ));
        }
        self.source.next_event(timeout)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.source.unsubscribe();
            log::debug!("Device removal subscription released");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// What a pump thread forwards: a removal, or the reason it gave up.
pub(crate) type Delivery = Result<DeviceRemovalEvent, GuardError>;

/// Source fed by a dedicated thread that owns the OS subscription.
///
/// OS handles are created, polled and dropped on the pump thread; only
/// channel ends cross threads.
#[cfg_attr(
    not(any(target_os = "linux", target_os = "windows")),
    allow(dead_code)
)]
pub(crate) struct PumpedSource {
    events: Receiver<Delivery>,
    stop: Option<Box<dyn FnOnce() + Send>>,
    pump: Option<JoinHandle<()>>,
}

#[cfg_attr(
    not(any(target_os = "linux", target_os = "windows")),
    allow(dead_code)
)]
impl PumpedSource {
    /// Run `pump` on a new thread and wait for it to report whether the
    /// subscription was set up.
    ///
    /// `stop` must make the pump return; it is called once on unsubscribe,
    /// before the pump is joined.
    pub(crate) fn spawn<P, S>(
        name: &str,
        class: &DeviceClassId,
        stop: S,
        pump: P,
    ) -> Result<Self, GuardError>
    where
        P: FnOnce(SyncSender<Result<(), String>>, Sender<Delivery>) + Send + 'static,
        S: FnOnce() + Send + 'static,
    {
        let subscription_error = |reason: String| GuardError::Subscription {
            class: class.to_string(),
            reason,
        };

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (events_tx, events_rx) = mpsc::channel();
        let pump = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || pump(ready_tx, events_tx))
            .map_err(|e| subscription_error(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                events: events_rx,
                stop: Some(Box::new(stop)),
                pump: Some(pump),
            }),
            Ok(Err(reason)) => {
                let _ = pump.join();
                Err(subscription_error(reason))
            }
            Err(_) => {
                let _ = pump.join();
                Err(subscription_error(format!("{} exited during startup", name)))
            }
        }
    }
}

impl DeviceEventSource for PumpedSource {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<DeviceRemovalEvent>, GuardError> {
        match self.events.recv_timeout(timeout) {
            Ok(delivery) => delivery.map(Some),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(GuardError::SubscriptionLost(
                "notification thread exited".to_string(),
            )),
        }
    }

    fn unsubscribe(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
        if let Some(pump) = self.pump.take() {
            if pump.join().is_err() {
                log::error!("Notification thread panicked");
            }
        }
    }
}
