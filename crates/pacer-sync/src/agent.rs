//! # Step Sync Agent
//!
//! Entry point for hosts. Wires the sensor, the ingestion task and the
//! retry scheduler together for one signed-in user.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        StepSyncAgent                                    │
//! │                                                                         │
//! │   SensorAdapter ──callback──► IngestTask ──► StepCounter                │
//! │                                  ▲              │ persist + enqueue    │
//! │                                  │              ▼                      │
//! │   lifecycle (watch) ─────────────┤         SyncQueue ──Notify──┐       │
//! │                                  │                             ▼       │
//! │   session (watch) ───────────────┴──────────────────► RetryScheduler   │
//! │                                                          │             │
//! │                                                          ▼             │
//! │                                                   RemoteSyncClient     │
//! │                                                                         │
//! │  start(session)  load or seed counter, subscribe, spawn both tasks     │
//! │  shutdown()      unsubscribe, flush ingestion, stop the scheduler      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use pacer_core::{CounterSnapshot, DailyHistoryRecord, QueueEntry};
use pacer_db::{Database, DbConfig};

use crate::client::{HttpSyncClient, RemoteSyncClient};
use crate::config::PacerConfig;
use crate::counter::{CounterSettings, SharedSnapshot, StepCounter};
use crate::error::{SyncError, SyncResult};
use crate::ingest::{IngestHandle, IngestTask};
use crate::notice::{NoOpEmitter, NoticeEmitter};
use crate::queue::SyncQueue;
use crate::scheduler::{RetryScheduler, SchedulerConfig, SchedulerHandle, SchedulerStatus};
use crate::sensor::{SensorAdapter, SubscriptionHandle};
use crate::session::{AppLifecycle, Session};

// =============================================================================
// Agent Status
// =============================================================================

/// Point-in-time view of the agent for hosts and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub running: bool,
    pub lifecycle: AppLifecycle,
    pub session_active: bool,
    pub sync: SchedulerStatus,
    pub total: Option<CounterSnapshot>,
}

/// Tasks owned while the agent is started.
struct Running {
    user_id: String,
    subscription: Option<SubscriptionHandle>,
    ingest: IngestHandle,
    ingest_task: JoinHandle<StepCounter>,
    scheduler: SchedulerHandle,
    scheduler_task: JoinHandle<()>,
}

// =============================================================================
// Step Sync Agent
// =============================================================================

/// Owns the step pipeline for one user at a time.
pub struct StepSyncAgent {
    config: Arc<PacerConfig>,
    db: Database,
    client: Arc<dyn RemoteSyncClient>,
    sensor: Arc<dyn SensorAdapter>,
    emitter: Arc<dyn NoticeEmitter>,

    /// Shared by ingestion (enqueue) and the scheduler (drain).
    queue: SyncQueue,

    session_tx: watch::Sender<Option<Session>>,
    lifecycle_tx: watch::Sender<AppLifecycle>,
    snapshot: SharedSnapshot,
    sync_status: Arc<RwLock<SchedulerStatus>>,

    running: Option<Running>,
}

impl StepSyncAgent {
    /// Opens the database named by `config.storage` and creates an agent
    /// that talks to the configured remote over HTTP.
    pub async fn open(config: PacerConfig, sensor: Arc<dyn SensorAdapter>) -> SyncResult<Self> {
        config.validate()?;

        let path = config
            .storage
            .resolved_path()
            .ok_or_else(|| SyncError::InvalidConfig("No database path available".into()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::new(DbConfig::new(&path)).await?;
        Self::new(config, db, sensor)
    }

    /// Creates an agent that talks to the configured remote over HTTP.
    pub fn new(config: PacerConfig, db: Database, sensor: Arc<dyn SensorAdapter>) -> SyncResult<Self> {
        let client = Arc::new(HttpSyncClient::new(&config.remote)?);
        Self::with_emitter(config, db, client, sensor, Arc::new(NoOpEmitter))
    }

    /// Creates an agent with an explicit client and emitter.
    pub fn with_emitter(
        config: PacerConfig,
        db: Database,
        client: Arc<dyn RemoteSyncClient>,
        sensor: Arc<dyn SensorAdapter>,
        emitter: Arc<dyn NoticeEmitter>,
    ) -> SyncResult<Self> {
        config.validate()?;

        let (session_tx, _) = watch::channel(None);
        let (lifecycle_tx, _) = watch::channel(AppLifecycle::Foreground);

        Ok(StepSyncAgent {
            config: Arc::new(config),
            queue: SyncQueue::new(db.sync_queue()),
            db,
            client,
            sensor,
            emitter,
            session_tx,
            lifecycle_tx,
            snapshot: Arc::new(RwLock::new(None)),
            sync_status: Arc::new(RwLock::new(SchedulerStatus::default())),
            running: None,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Starts ingestion and sync for `session.user_id`.
    ///
    /// A user with no local counter state is seeded from the remote's latest
    /// total; if that lookup fails the total starts at zero.
    pub async fn start(&mut self, session: Session) -> SyncResult<()> {
        if self.running.is_some() {
            return Err(SyncError::AlreadyRunning);
        }

        let user_id = session.user_id.clone();
        info!(user_id = %user_id, "Starting step sync agent");

        let seed = self.remote_seed(&session);
        let counter = StepCounter::load_or_create(
            &user_id,
            seed,
            CounterSettings::from(&self.config.ingest),
            self.db.counters(),
            self.queue.clone(),
            self.snapshot.clone(),
            self.emitter.clone(),
        )
        .await?;

        let acknowledged = counter.state().last_acknowledged_total;
        self.session_tx.send_replace(Some(session));

        let (ingest_task, ingest) = IngestTask::new(
            counter,
            self.config.ingest.debounce_window(),
            self.lifecycle_tx.subscribe(),
        );

        let subscription = if self.sensor.is_available() {
            Some(self.sensor.subscribe(ingest.sample_callback()))
        } else {
            warn!(user_id = %user_id, "Step sensor unavailable, only queued entries will sync");
            None
        };

        {
            let mut s = self.sync_status.write().await;
            *s = SchedulerStatus {
                last_acknowledged_total: acknowledged,
                pending: self.queue.len(&user_id).await.unwrap_or(0),
                ..Default::default()
            };
        }

        let (scheduler, scheduler_handle) = RetryScheduler::new(
            self.queue.clone(),
            self.db.counters(),
            self.client.clone(),
            self.emitter.clone(),
            self.session_tx.subscribe(),
            self.lifecycle_tx.subscribe(),
            self.sync_status.clone(),
            SchedulerConfig::from(self.config.as_ref()),
        );

        let ingest_task = tokio::spawn(ingest_task.run());
        let scheduler_task = tokio::spawn(scheduler.run());

        self.running = Some(Running {
            user_id,
            subscription,
            ingest,
            ingest_task,
            scheduler: scheduler_handle,
            scheduler_task,
        });

        info!("Step sync agent started");
        Ok(())
    }

    /// Replaces the session, or clears it to suspend sync.
    ///
    /// While running, a session for a different user is refused; stop the
    /// agent and start it again to switch users.
    pub fn set_session(&self, session: Option<Session>) -> SyncResult<()> {
        if let (Some(running), Some(next)) = (&self.running, &session) {
            if running.user_id != next.user_id {
                return Err(SyncError::UserMismatch {
                    expected: running.user_id.clone(),
                    actual: next.user_id.clone(),
                });
            }
        }

        debug!(active = session.is_some(), "Session updated");
        self.session_tx.send_replace(session);
        Ok(())
    }

    /// Informs the agent of a foreground/background transition.
    pub fn lifecycle(&self, lifecycle: AppLifecycle) {
        let previous = self.lifecycle_tx.send_replace(lifecycle);
        if previous != lifecycle {
            info!(from = %previous, to = %lifecycle, "App lifecycle changed");
        }
    }

    /// The latest total, once the counter has been loaded.
    pub async fn current_total(&self) -> Option<CounterSnapshot> {
        self.snapshot.read().await.clone()
    }

    pub async fn status(&self) -> AgentStatus {
        AgentStatus {
            running: self.running.is_some(),
            lifecycle: *self.lifecycle_tx.borrow(),
            session_active: self.session_tx.borrow().is_some(),
            sync: self.sync_status.read().await.clone(),
            total: self.current_total().await,
        }
    }

    /// Entries not yet acknowledged by the remote, across users.
    pub async fn pending_entries(&self) -> SyncResult<Vec<QueueEntry>> {
        self.queue.list_all().await
    }

    /// Discards the running user's unsent entries. Returns how many were
    /// dropped.
    pub async fn purge_queue(&self) -> SyncResult<u64> {
        let running = self.running.as_ref().ok_or(SyncError::NotRunning)?;
        let removed = self.queue.purge(&running.user_id).await?;
        self.sync_status.write().await.pending = 0;
        Ok(removed)
    }

    /// Most recent days of history for the running user.
    pub async fn history(&self, limit: u32) -> SyncResult<Vec<DailyHistoryRecord>> {
        let running = self.running.as_ref().ok_or(SyncError::NotRunning)?;
        Ok(self.db.history().for_user(&running.user_id, limit).await?)
    }

    /// Stops both tasks. Pending readings are flushed to the queue first.
    pub async fn shutdown(&mut self) -> SyncResult<()> {
        let Some(running) = self.running.take() else {
            return Err(SyncError::NotRunning);
        };

        info!(user_id = %running.user_id, "Shutting down step sync agent");

        if let Some(subscription) = running.subscription {
            self.sensor.unsubscribe(subscription);
        }

        if let Err(e) = running.ingest.shutdown().await {
            debug!(error = %e, "Ingestion task already stopped");
        }
        let ingest_result = running.ingest_task.await;

        // The scheduler is stopped even when ingestion failed.
        if let Err(e) = running.scheduler.shutdown().await {
            debug!(error = %e, "Scheduler already stopped");
        }
        let scheduler_result = running.scheduler_task.await;

        let counter = ingest_result.map_err(|e| {
            error!(error = %e, "Ingestion task failed");
            SyncError::from(e)
        })?;
        if let Err(e) = scheduler_result {
            error!(error = %e, "Scheduler task failed");
            return Err(e.into());
        }

        info!(total = counter.current_total().total_steps, "Step sync agent stopped");
        Ok(())
    }

    async fn remote_seed(&self, session: &Session) -> u64 {
        let timeout = self.config.remote.request_timeout();
        match tokio::time::timeout(timeout, self.client.fetch_latest_total(session)).await {
            Ok(Ok(total)) => total.unwrap_or(0),
            Ok(Err(e)) => {
                warn!(error = %e, "Fetching remote total failed, starting from zero");
                0
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Fetching remote total timed out, starting from zero");
                0
            }
        }
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for [`StepSyncAgent`].
pub struct StepSyncAgentBuilder {
    config: PacerConfig,
    db: Option<Database>,
    client: Option<Arc<dyn RemoteSyncClient>>,
    sensor: Option<Arc<dyn SensorAdapter>>,
    emitter: Option<Arc<dyn NoticeEmitter>>,
}

impl StepSyncAgentBuilder {
    pub fn new(config: PacerConfig) -> Self {
        StepSyncAgentBuilder {
            config,
            db: None,
            client: None,
            sensor: None,
            emitter: None,
        }
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    /// Overrides the HTTP client built from the config.
    pub fn with_client(mut self, client: Arc<dyn RemoteSyncClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_sensor(mut self, sensor: Arc<dyn SensorAdapter>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn NoticeEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Validates the config and builds the agent.
    pub fn build(self) -> SyncResult<StepSyncAgent> {
        let db = self
            .db
            .ok_or_else(|| SyncError::InvalidConfig("Database required".into()))?;
        let sensor = self
            .sensor
            .ok_or_else(|| SyncError::InvalidConfig("Sensor adapter required".into()))?;
        let client: Arc<dyn RemoteSyncClient> = match self.client {
            Some(client) => client,
            None => Arc::new(HttpSyncClient::new(&self.config.remote)?),
        };
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));

        StepSyncAgent::with_emitter(self.config, db, client, sensor, emitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::ManualSensor;
    use pacer_core::DayBoundary;

    fn offline_config() -> PacerConfig {
        let mut config = PacerConfig::default();
        config.remote.base_url = "http://127.0.0.1:9".to_string();
        config.remote.request_timeout_secs = 1;
        config
    }

    #[tokio::test]
    async fn test_builder_requires_database() {
        let result = StepSyncAgentBuilder::new(PacerConfig::default())
            .with_sensor(Arc::new(ManualSensor::new()))
            .build();
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_operations_before_start() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut agent = StepSyncAgentBuilder::new(PacerConfig::default())
            .with_database(db)
            .with_sensor(Arc::new(ManualSensor::new()))
            .build()
            .unwrap();

        assert!(!agent.is_running());
        assert!(agent.current_total().await.is_none());
        assert!(matches!(agent.purge_queue().await, Err(SyncError::NotRunning)));
        assert!(matches!(agent.shutdown().await, Err(SyncError::NotRunning)));

        let status = agent.status().await;
        assert!(!status.running);
        assert!(!status.session_active);
        assert_eq!(status.lifecycle, AppLifecycle::Foreground);
    }

    #[tokio::test]
    async fn test_constructors_reject_invalid_config() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut config = offline_config();
        config.ingest.day_boundary = DayBoundary::FixedOffset { minutes: i32::MIN };

        let result = StepSyncAgent::new(config, db, Arc::new(ManualSensor::new()));
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_open_uses_configured_database_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pacer.db");
        let mut config = offline_config();
        config.storage.database_path = Some(path.clone());

        let mut agent = StepSyncAgent::open(config, Arc::new(ManualSensor::new()))
            .await
            .unwrap();
        agent.start(Session::new("user-1", "token")).await.unwrap();
        agent.shutdown().await.unwrap();

        assert!(path.exists());
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        assert!(db.counters().get("user-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_ingestion_still_stops_scheduler() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut agent = StepSyncAgent::new(offline_config(), db, Arc::new(ManualSensor::new())).unwrap();
        agent.start(Session::new("user-1", "token")).await.unwrap();
        assert!(agent.session_tx.receiver_count() > 0);

        if let Some(running) = agent.running.as_ref() {
            running.ingest_task.abort();
        }

        assert!(matches!(agent.shutdown().await, Err(SyncError::TaskFailed(_))));
        assert!(!agent.is_running());
        // The scheduler task ended and dropped its session receiver.
        assert_eq!(agent.session_tx.receiver_count(), 0);
    }
}
