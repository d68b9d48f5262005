//! # Ingestion Task
//!
//! Sequential consumer of sensor readings with a debounce window.
//!
//! ## Debounce
//! ```text
//!  samples:   s1  s2 s3        s4                     s5
//!  time:  ────┼───┼──┼─────────┼──────────────────────┼────────►
//!             │◄── window ──►│ │◄── window ──►│       │◄── ...
//!             armed          flush armed       flush   armed
//!
//!  One flush per window: s1..s3 become one delta and one queued write.
//! ```
//!
//! ## Lifecycle
//! - Background: readings are still observed, but no new window is armed.
//!   A window already armed still fires.
//! - Foreground: pending readings are flushed immediately.
//! - Shutdown: queued readings are drained and flushed before the task ends.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info};

use pacer_core::RawSample;

use crate::counter::StepCounter;
use crate::error::{SyncError, SyncResult};
use crate::sensor::SampleCallback;
use crate::session::AppLifecycle;

// =============================================================================
// Handle
// =============================================================================

/// Handle for feeding and stopping the ingestion task.
#[derive(Clone)]
pub struct IngestHandle {
    samples_tx: mpsc::UnboundedSender<RawSample>,
    shutdown_tx: mpsc::Sender<()>,
}

impl IngestHandle {
    /// Returns a callback suitable for [`SensorAdapter::subscribe`](crate::sensor::SensorAdapter::subscribe).
    ///
    /// The callback never blocks; readings arriving after the task stopped
    /// are dropped.
    pub fn sample_callback(&self) -> SampleCallback {
        let tx = self.samples_tx.clone();
        Box::new(move |sample| {
            if tx.send(sample).is_err() {
                debug!("Ingestion stopped, dropping sample");
            }
        })
    }

    /// Sends one reading to the task.
    pub fn send(&self, sample: RawSample) -> SyncResult<()> {
        self.samples_tx
            .send(sample)
            .map_err(|_| SyncError::ChannelError("Sample channel closed".into()))
    }

    /// Flushes pending readings and stops the task.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Shutdown channel closed".into()))
    }
}

// =============================================================================
// Task
// =============================================================================

/// The one writer of counter state for the active user.
pub struct IngestTask {
    counter: StepCounter,
    window: Duration,
    samples_rx: mpsc::UnboundedReceiver<RawSample>,
    lifecycle_rx: watch::Receiver<AppLifecycle>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl IngestTask {
    /// Creates the task and its handle.
    pub fn new(
        counter: StepCounter,
        window: Duration,
        lifecycle_rx: watch::Receiver<AppLifecycle>,
    ) -> (Self, IngestHandle) {
        let (samples_tx, samples_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let task = IngestTask {
            counter,
            window,
            samples_rx,
            lifecycle_rx,
            shutdown_rx,
        };

        (task, IngestHandle { samples_tx, shutdown_tx })
    }

    /// Runs until shutdown. Returns the counter so callers can inspect it.
    pub async fn run(mut self) -> StepCounter {
        info!(
            user_id = %self.counter.user_id(),
            window_ms = self.window.as_millis() as u64,
            "Ingestion task starting"
        );

        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Ingestion task shutting down");
                    break;
                }

                sample = self.samples_rx.recv() => {
                    let Some(sample) = sample else {
                        debug!("Sample channel closed");
                        break;
                    };
                    self.counter.observe(sample);
                    if deadline.is_none() && self.lifecycle_rx.borrow().is_foreground() {
                        deadline = Some(Instant::now() + self.window);
                    }
                }

                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    if !self.flush().await && self.lifecycle_rx.borrow().is_foreground() {
                        deadline = Some(Instant::now() + self.window);
                    }
                }

                changed = self.lifecycle_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let lifecycle = *self.lifecycle_rx.borrow_and_update();
                    debug!(%lifecycle, "Ingestion saw lifecycle change");
                    if lifecycle.is_foreground() && self.counter.has_pending() {
                        deadline = Some(Instant::now());
                    }
                }
            }
        }

        while let Ok(sample) = self.samples_rx.try_recv() {
            self.counter.observe(sample);
        }
        if self.counter.has_pending() {
            self.flush().await;
        }

        info!("Ingestion task stopped");
        self.counter
    }

    /// Returns false if the flush must be retried.
    async fn flush(&mut self) -> bool {
        match self.counter.flush().await {
            Ok(outcome) => {
                if let Some(entry) = outcome.entry {
                    info!(
                        id = entry.id,
                        steps = outcome.steps,
                        total = outcome.total_steps,
                        "Steps queued for sync"
                    );
                }
                true
            }
            Err(e) => {
                error!(error = %e, "Flush failed, will retry");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::{CounterSettings, StepCounter};
    use crate::notice::NoOpEmitter;
    use crate::queue::SyncQueue;
    use pacer_db::{Database, DbConfig};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    async fn spawn_task(
        db: &Database,
        window: Duration,
    ) -> (
        IngestHandle,
        watch::Sender<AppLifecycle>,
        tokio::task::JoinHandle<StepCounter>,
    ) {
        let counter = StepCounter::load_or_create(
            "user-1",
            async { 0 },
            CounterSettings::default(),
            db.counters(),
            SyncQueue::new(db.sync_queue()),
            Arc::new(RwLock::new(None)),
            Arc::new(NoOpEmitter),
        )
        .await
        .unwrap();

        let (lifecycle_tx, lifecycle_rx) = watch::channel(AppLifecycle::Foreground);
        let (task, handle) = IngestTask::new(counter, window, lifecycle_rx);
        (handle, lifecycle_tx, tokio::spawn(task.run()))
    }

    #[tokio::test]
    async fn test_burst_collapses_into_one_write() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (handle, _lifecycle, task) = spawn_task(&db, Duration::from_millis(100)).await;

        for value in [1000, 1010, 1020, 1030, 1050] {
            handle.send(RawSample::now(value)).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        let entries = db.sync_queue().list_for("user-1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].payload.contains("\"stepCount\":50"));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_background_defers_until_foreground() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (handle, lifecycle, task) = spawn_task(&db, Duration::from_millis(50)).await;

        lifecycle.send_replace(AppLifecycle::Background);
        handle.send(RawSample::now(100)).unwrap();
        handle.send(RawSample::now(130)).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(db.sync_queue().count("user-1").await.unwrap(), 0);

        lifecycle.send_replace(AppLifecycle::Foreground);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(db.sync_queue().count("user-1").await.unwrap(), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_flushes_pending_window() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (handle, _lifecycle, task) = spawn_task(&db, Duration::from_secs(60)).await;

        handle.send(RawSample::now(500)).unwrap();
        handle.send(RawSample::now(575)).unwrap();
        handle.shutdown().await.unwrap();
        let counter = task.await.unwrap();

        assert_eq!(counter.current_total().total_steps, 75);
        assert_eq!(db.sync_queue().count("user-1").await.unwrap(), 1);
    }
}
