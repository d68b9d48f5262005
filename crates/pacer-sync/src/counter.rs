//! # Step Counter
//!
//! The single writer of a user's [`CounterState`].
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        StepCounter                                      │
//! │                                                                         │
//! │  observe(sample)            (memory only, once per reading)            │
//! │     clamp → DeltaComputer → window.steps += delta                      │
//! │                                                                         │
//! │  flush()                    (once per debounce window)                 │
//! │     1. fold window into CounterState      ← memory is authoritative    │
//! │     2. persist state + daily history      ← one transaction            │
//! │     3. enqueue POST { stepCount: total }  ← cumulative, not a delta    │
//! │                                                                         │
//! │  A failed step 2 or 3 leaves flags set; the next flush repeats it.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use pacer_core::{
    AppliedDelta, CounterSnapshot, CounterState, DayBoundary, DeltaComputer, Observation,
    QueueEntry, RawSample, StepActivityRequest, TotalScope,
};
use pacer_db::CounterRepository;

use crate::config::IngestSettings;
use crate::error::SyncResult;
use crate::notice::NoticeEmitter;
use crate::queue::SyncQueue;

/// Shared read-only view of the running total.
pub type SharedSnapshot = Arc<RwLock<Option<CounterSnapshot>>>;

/// Policy knobs the counter needs from the config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterSettings {
    pub day_boundary: DayBoundary,
    pub total_scope: TotalScope,
    pub stride_length_m: Option<f64>,
    pub resume_from_persisted_counter: bool,
}

impl From<&IngestSettings> for CounterSettings {
    fn from(ingest: &IngestSettings) -> Self {
        CounterSettings {
            day_boundary: ingest.day_boundary,
            total_scope: ingest.total_scope,
            stride_length_m: ingest.stride_length_m,
            resume_from_persisted_counter: ingest.resume_from_persisted_counter,
        }
    }
}

impl Default for CounterSettings {
    fn default() -> Self {
        CounterSettings::from(&IngestSettings::default())
    }
}

/// Readings observed since the last flush.
#[derive(Debug, Default, Clone, Copy)]
struct Window {
    steps: u64,
    counter: Option<u64>,
    observed_at: Option<DateTime<Utc>>,
    samples: u32,
}

/// Result of one flush.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushOutcome {
    /// Steps folded into the total by this flush.
    pub steps: u64,

    /// Total after the flush.
    pub total_steps: u64,

    /// The queued write, if one was made.
    pub entry: Option<QueueEntry>,
}

/// Owns the counter state for one user.
pub struct StepCounter {
    state: CounterState,
    computer: DeltaComputer,
    window: Window,

    /// History steps applied in memory but not yet committed, per day key.
    unsaved_days: Vec<(String, u64)>,
    state_dirty: bool,
    needs_enqueue: bool,

    settings: CounterSettings,
    counters: CounterRepository,
    queue: SyncQueue,
    snapshot: SharedSnapshot,
    emitter: Arc<dyn NoticeEmitter>,
}

impl StepCounter {
    /// Wraps state loaded from the store.
    pub fn from_state(
        state: CounterState,
        settings: CounterSettings,
        counters: CounterRepository,
        queue: SyncQueue,
        snapshot: SharedSnapshot,
        emitter: Arc<dyn NoticeEmitter>,
    ) -> Self {
        let computer = if settings.resume_from_persisted_counter {
            DeltaComputer::seeded(state.last_device_counter_value)
        } else {
            DeltaComputer::new()
        };

        StepCounter {
            state,
            computer,
            window: Window::default(),
            unsaved_days: Vec::new(),
            state_dirty: false,
            needs_enqueue: false,
            settings,
            counters,
            queue,
            snapshot,
            emitter,
        }
    }

    /// Loads the user's state, creating it with `seed_total` if absent.
    ///
    /// `seed_total` is only awaited when there is no local row.
    pub async fn load_or_create<F>(
        user_id: &str,
        seed_total: F,
        settings: CounterSettings,
        counters: CounterRepository,
        queue: SyncQueue,
        snapshot: SharedSnapshot,
        emitter: Arc<dyn NoticeEmitter>,
    ) -> SyncResult<Self>
    where
        F: std::future::Future<Output = u64>,
    {
        let state = match counters.get(user_id).await? {
            Some(state) => {
                info!(
                    user_id = %user_id,
                    total = state.total_steps,
                    last_counter = state.last_device_counter_value,
                    "Counter state loaded"
                );
                state
            }
            None => {
                let total = seed_total.await;
                let now = Utc::now();
                let state = CounterState::new(
                    user_id,
                    total,
                    now,
                    settings.day_boundary.day_key(now),
                );
                counters.save(&state).await?;
                info!(user_id = %user_id, total, "Counter state created");
                state
            }
        };

        let counter = Self::from_state(state, settings, counters, queue, snapshot, emitter);
        counter.publish().await;
        Ok(counter)
    }

    /// Feeds one reading into the current window. Memory only.
    pub fn observe(&mut self, sample: RawSample) -> Observation {
        let (value, anomaly) = sample.clamped();
        if let Some(anomaly) = anomaly {
            warn!(
                user_id = %self.state.user_id,
                raw_value = anomaly.raw_value,
                observed_at = %anomaly.observed_at,
                "Sensor delivered a negative counter, clamped to zero"
            );
        }

        let observation = self.computer.observe(value);
        match observation {
            Observation::Seeded { counter } => {
                debug!(counter, "Delta computer seeded");
            }
            Observation::Reset { steps, previous, counter } => {
                info!(previous, counter, steps, "Step counter reset detected");
            }
            Observation::Advanced { .. } => {}
        }

        self.window.steps = self.window.steps.saturating_add(observation.delta());
        self.window.counter = Some(observation.counter());
        self.window.observed_at = Some(sample.observed_at);
        self.window.samples += 1;

        observation
    }

    /// True if a flush would change anything.
    pub fn has_pending(&self) -> bool {
        self.window.samples > 0 || self.state_dirty || self.needs_enqueue
    }

    /// Folds `steps` into the total and persists it with the day's history.
    ///
    /// On a storage error the in-memory total keeps the delta and the write
    /// is repeated by the next call to [`persist`](Self::persist).
    pub async fn apply_delta(
        &mut self,
        steps: u64,
        counter: u64,
        at: DateTime<Utc>,
    ) -> SyncResult<AppliedDelta> {
        let applied = self.fold(steps, counter, at);
        self.publish().await;
        self.persist().await?;
        Ok(applied)
    }

    /// Writes any state not yet committed. No-op when clean.
    pub async fn persist(&mut self) -> SyncResult<()> {
        if !self.state_dirty {
            return Ok(());
        }

        let result = if !self.unsaved_days.is_empty() {
            self.counters.apply(&self.state, &self.unsaved_days).await
        } else {
            self.counters.save(&self.state).await
        };

        match result {
            Ok(()) => {
                self.unsaved_days.clear();
                self.state_dirty = false;
                Ok(())
            }
            Err(e) => {
                warn!(
                    user_id = %self.state.user_id,
                    error = %e,
                    "Persisting counter state failed; keeping it in memory"
                );
                Err(e.into())
            }
        }
    }

    /// Closes the current window: apply, persist, enqueue.
    pub async fn flush(&mut self) -> SyncResult<FlushOutcome> {
        let window = std::mem::take(&mut self.window);
        let at = window.observed_at.unwrap_or_else(Utc::now);

        if window.steps > 0 {
            if let Some(counter) = window.counter {
                self.needs_enqueue = true;
                self.apply_delta(window.steps, counter, at).await?;
                debug!(
                    steps = window.steps,
                    samples = window.samples,
                    total = self.state.total_steps,
                    "Debounce window folded"
                );
            }
        } else if let Some(counter) = window.counter {
            if counter != self.state.last_device_counter_value {
                self.state.last_device_counter_value = counter;
                self.state.last_updated = at;
                self.state_dirty = true;
            }
        }

        self.persist().await?;

        let entry = if self.needs_enqueue {
            let request = StepActivityRequest::new(
                self.state.total_steps,
                self.settings.stride_length_m,
                self.state.last_updated,
            );
            let entry = self
                .queue
                .enqueue(&self.state.user_id, &request.into_operation()?)
                .await?;
            self.needs_enqueue = false;
            Some(entry)
        } else {
            None
        };

        Ok(FlushOutcome {
            steps: window.steps,
            total_steps: self.state.total_steps,
            entry,
        })
    }

    /// Current state, including changes not yet persisted.
    pub fn state(&self) -> &CounterState {
        &self.state
    }

    pub fn current_total(&self) -> CounterSnapshot {
        self.state.snapshot()
    }

    pub fn user_id(&self) -> &str {
        &self.state.user_id
    }

    fn fold(&mut self, steps: u64, counter: u64, at: DateTime<Utc>) -> AppliedDelta {
        let day_key = self.settings.day_boundary.day_key(at);
        let applied = self
            .state
            .apply_delta(steps, counter, at, &day_key, self.settings.total_scope);
        if applied.day_rolled {
            info!(
                user_id = %self.state.user_id,
                day = %day_key,
                scope = ?self.settings.total_scope,
                "New day started"
            );
        }

        match self.unsaved_days.last_mut() {
            Some((key, unsaved)) if *key == day_key => {
                *unsaved = unsaved.saturating_add(steps);
            }
            _ => self.unsaved_days.push((day_key, steps)),
        }
        self.state_dirty = true;
        applied
    }

    async fn publish(&self) {
        let snapshot = self.state.snapshot();
        self.emitter.emit_total(&snapshot);
        *self.snapshot.write().await = Some(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notice::NoOpEmitter;
    use chrono::TimeZone;
    use pacer_db::{Database, DbConfig};

    fn settings() -> CounterSettings {
        CounterSettings {
            day_boundary: DayBoundary::Utc,
            ..CounterSettings::default()
        }
    }

    fn sample(value: i64, h: u32, m: u32) -> RawSample {
        RawSample {
            device_counter_value: value,
            observed_at: Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap(),
        }
    }

    async fn counter_with(db: &Database, settings: CounterSettings, prior: Option<CounterState>) -> StepCounter {
        if let Some(state) = prior {
            db.counters().save(&state).await.unwrap();
        }
        StepCounter::load_or_create(
            "user-1",
            async { 0 },
            settings,
            db.counters(),
            SyncQueue::new(db.sync_queue()),
            Arc::new(RwLock::new(None)),
            Arc::new(NoOpEmitter),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_coalesced_window_yields_one_delta_and_one_enqueue() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut prior = CounterState::new("user-1", 4000, Utc::now(), "2024-05-01");
        prior.last_device_counter_value = 1000;
        let mut counter = counter_with(&db, settings(), Some(prior)).await;

        for value in [1000, 1000, 1050] {
            counter.observe(sample(value, 9, 0));
        }
        let outcome = counter.flush().await.unwrap();

        assert_eq!(outcome.steps, 50);
        assert_eq!(outcome.total_steps, 4050);
        let entry = outcome.entry.unwrap();
        assert!(entry.payload.contains("\"stepCount\":4050"));
        assert_eq!(db.sync_queue().count("user-1").await.unwrap(), 1);

        let stored = db.counters().get("user-1").await.unwrap().unwrap();
        assert_eq!(stored.total_steps, 4050);
        assert_eq!(stored.last_device_counter_value, 1050);
    }

    #[tokio::test]
    async fn test_reset_adds_value_after_reset() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut counter = counter_with(&db, settings(), None).await;

        counter.observe(sample(1000, 9, 0));
        let observation = counter.observe(sample(800, 9, 1));
        assert!(observation.is_reset());

        let outcome = counter.flush().await.unwrap();
        assert_eq!(outcome.steps, 800);
        assert_eq!(outcome.total_steps, 800);
    }

    #[tokio::test]
    async fn test_first_sample_after_load_only_seeds() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut counter = counter_with(&db, settings(), None).await;

        counter.observe(sample(52_000, 9, 0));
        let outcome = counter.flush().await.unwrap();

        assert_eq!(outcome.steps, 0);
        assert!(outcome.entry.is_none());
        let stored = db.counters().get("user-1").await.unwrap().unwrap();
        assert_eq!(stored.total_steps, 0);
        assert_eq!(stored.last_device_counter_value, 52_000);
    }

    #[tokio::test]
    async fn test_resume_from_persisted_counter() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut prior = CounterState::new("user-1", 100, Utc::now(), "2024-05-01");
        prior.last_device_counter_value = 1000;
        let resume = CounterSettings {
            resume_from_persisted_counter: true,
            ..settings()
        };
        let mut counter = counter_with(&db, resume, Some(prior)).await;

        counter.observe(sample(800, 9, 0));
        let outcome = counter.flush().await.unwrap();
        assert_eq!(outcome.steps, 800);
        assert_eq!(outcome.total_steps, 900);
    }

    #[tokio::test]
    async fn test_negative_sample_is_clamped() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut counter = counter_with(&db, settings(), None).await;

        counter.observe(sample(100, 9, 0));
        let observation = counter.observe(sample(-5, 9, 1));
        assert_eq!(observation.counter(), 0);
        assert_eq!(observation.delta(), 0);
        counter.observe(sample(30, 9, 2));

        let outcome = counter.flush().await.unwrap();
        assert_eq!(outcome.total_steps, 30);
    }

    #[tokio::test]
    async fn test_seed_total_used_only_without_local_state() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let counter = StepCounter::load_or_create(
            "user-1",
            async { 7_500 },
            settings(),
            db.counters(),
            SyncQueue::new(db.sync_queue()),
            Arc::new(RwLock::new(None)),
            Arc::new(NoOpEmitter),
        )
        .await
        .unwrap();
        assert_eq!(counter.current_total().total_steps, 7_500);

        let reloaded = StepCounter::load_or_create(
            "user-1",
            async { 99 },
            settings(),
            db.counters(),
            SyncQueue::new(db.sync_queue()),
            Arc::new(RwLock::new(None)),
            Arc::new(NoOpEmitter),
        )
        .await
        .unwrap();
        assert_eq!(reloaded.current_total().total_steps, 7_500);
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_memory_and_retries() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut counter = counter_with(&db, settings(), None).await;
        counter.observe(sample(0, 9, 0));
        counter.observe(sample(40, 9, 1));

        db.close().await;
        assert!(counter.flush().await.is_err());
        assert_eq!(counter.current_total().total_steps, 40);
        assert!(counter.has_pending());
    }

    #[tokio::test]
    async fn test_failed_save_before_midnight_keeps_steps_on_their_day() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut counter = counter_with(&db, settings(), None).await;
        counter.observe(sample(1000, 22, 0));
        counter.observe(sample(1300, 23, 0));

        sqlx::query("ALTER TABLE daily_history RENAME TO daily_history_offline")
            .execute(db.pool())
            .await
            .unwrap();
        assert!(counter.flush().await.is_err());
        sqlx::query("ALTER TABLE daily_history_offline RENAME TO daily_history")
            .execute(db.pool())
            .await
            .unwrap();

        counter.observe(RawSample {
            device_counter_value: 1340,
            observed_at: Utc.with_ymd_and_hms(2024, 5, 2, 7, 0, 0).unwrap(),
        });
        let outcome = counter.flush().await.unwrap();
        assert_eq!(outcome.total_steps, 340);
        assert!(outcome.entry.unwrap().payload.contains("\"stepCount\":340"));

        let history = db.history();
        let first = history.get("user-1", "2024-05-01").await.unwrap().unwrap();
        let second = history.get("user-1", "2024-05-02").await.unwrap().unwrap();
        assert_eq!(first.steps_for_day, 300);
        assert_eq!(second.steps_for_day, 40);
        assert_eq!(db.sync_queue().count("user-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_daily_scope_restarts_total_on_new_day() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let daily = CounterSettings {
            total_scope: TotalScope::Daily,
            ..settings()
        };
        let prior = CounterState::new("user-1", 9_000, Utc::now(), "2024-04-30");
        let mut counter = counter_with(&db, daily, Some(prior)).await;

        counter.observe(sample(500, 9, 0));
        counter.observe(sample(620, 9, 5));
        let outcome = counter.flush().await.unwrap();

        assert_eq!(outcome.total_steps, 120);
        let day = db.history().get("user-1", "2024-05-01").await.unwrap().unwrap();
        assert_eq!(day.steps_for_day, 120);
    }
}
