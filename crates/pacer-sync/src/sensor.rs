//! # Sensor Adapter
//!
//! Push-style source of raw step counter readings. The host implements
//! [`SensorAdapter`] on top of the platform pedometer; the engine only
//! subscribes and forwards every reading into its ingestion channel.
//!
//! ```text
//! platform callback ──► SampleCallback ──► mpsc (unbounded) ──► ingest task
//!   (any thread)          (never blocks)                         (one writer)
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use pacer_core::RawSample;

/// Callback invoked for every reading. Must return quickly.
pub type SampleCallback = Box<dyn Fn(RawSample) + Send + Sync>;

/// Identifies one subscription so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn new(id: u64) -> Self {
        SubscriptionHandle(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Source of raw step counter readings.
pub trait SensorAdapter: Send + Sync {
    /// Starts delivering readings to `on_sample`.
    fn subscribe(&self, on_sample: SampleCallback) -> SubscriptionHandle;

    /// Returns false if the device has no usable step counter.
    fn is_available(&self) -> bool;

    /// Stops delivery for `handle`. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}

// =============================================================================
// Manual Sensor
// =============================================================================

/// Adapter fed by explicit [`push`](ManualSensor::push) calls.
///
/// For hosts whose platform API already delivers readings on its own
/// schedule, and for tests.
#[derive(Clone, Default)]
pub struct ManualSensor {
    inner: Arc<ManualSensorInner>,
}

#[derive(Default)]
struct ManualSensorInner {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionHandle, SampleCallback)>>,
    unavailable: AtomicBool,
}

impl ManualSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the sensor as missing (for hosts without a pedometer).
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Delivers one reading to every subscriber.
    pub fn push(&self, sample: RawSample) {
        match self.inner.subscribers.lock() {
            Ok(subscribers) => {
                for (_, callback) in subscribers.iter() {
                    callback(sample);
                }
            }
            Err(_) => warn!("Sensor subscriber list poisoned, dropping sample"),
        }
    }

    /// Delivers a reading observed now.
    pub fn push_value(&self, device_counter_value: i64) {
        self.push(RawSample::now(device_counter_value));
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}

impl SensorAdapter for ManualSensor {
    fn subscribe(&self, on_sample: SampleCallback) -> SubscriptionHandle {
        let handle = SubscriptionHandle::new(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        match self.inner.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push((handle, on_sample)),
            Err(_) => warn!("Sensor subscriber list poisoned, subscription ignored"),
        }
        debug!(handle = handle.id(), "Sensor subscription added");
        handle
    }

    fn is_available(&self) -> bool {
        !self.inner.unavailable.load(Ordering::SeqCst)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Ok(mut subscribers) = self.inner.subscribers.lock() {
            subscribers.retain(|(h, _)| *h != handle);
        }
        debug!(handle = handle.id(), "Sensor subscription removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;

    #[test]
    fn test_push_reaches_subscribers_until_unsubscribed() {
        let sensor = ManualSensor::new();
        let seen = Arc::new(AtomicI64::new(0));

        let sink = seen.clone();
        let handle = sensor.subscribe(Box::new(move |sample| {
            sink.store(sample.device_counter_value, Ordering::SeqCst);
        }));

        sensor.push_value(1050);
        assert_eq!(seen.load(Ordering::SeqCst), 1050);

        sensor.unsubscribe(handle);
        sensor.push_value(2000);
        assert_eq!(seen.load(Ordering::SeqCst), 1050);
        assert_eq!(sensor.subscriber_count(), 0);
    }

    #[test]
    fn test_availability_toggle() {
        let sensor = ManualSensor::new();
        assert!(sensor.is_available());
        sensor.set_available(false);
        assert!(!sensor.is_available());
    }
}
