//! # Retry Scheduler
//!
//! Drains the sync queue one entry at a time, oldest first.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │            enqueue / foreground                                         │
//! │   ┌──────┐ ───────────────────► ┌──────────┐  2xx, queue empty          │
//! │   │ Idle │                      │ Draining │ ─────────────────► Idle    │
//! │   └──────┘ ◄─────────────────── └──────────┘                            │
//! │                                   │   ▲  │                              │
//! │         503 / unreachable/timeout │   │  │ 401                          │
//! │                                   ▼   │  ▼                              │
//! │                      ┌──────────────────┐  ┌───────────┐                │
//! │                      │ Backoff(attempt) │  │ Suspended │                │
//! │                      └──────────────────┘  └───────────┘                │
//! │                        timer expiry or       new session                │
//! │                        foreground → Draining → Draining                 │
//! │                                                                         │
//! │  other 4xx/5xx: entry dropped with a notice, stay Draining             │
//! │  delay(attempt) = min(max, initial * 2^(attempt-1)), reset when empty  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The same entry is retried after every transient failure; it is never
//! skipped.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, info, warn};

use pacer_core::{HttpMethod, QueueEntry, StepActivityRequest, STEP_ACTIVITY_ENDPOINT};
use pacer_db::CounterRepository;

use crate::client::{RemoteFailure, RemoteSyncClient};
use crate::config::PacerConfig;
use crate::error::{SyncError, SyncResult};
use crate::notice::{NoticeEmitter, SyncNotice};
use crate::queue::SyncQueue;
use crate::session::{AppLifecycle, Session};

// =============================================================================
// State & Status
// =============================================================================

/// Where the scheduler is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchedulerState {
    /// Queue empty; waiting for an enqueue or foreground.
    #[default]
    Idle,

    /// Submitting the oldest entry.
    Draining,

    /// Waiting before retrying the oldest entry.
    Backoff { attempt: u32 },

    /// No usable session; the queue is kept as is.
    Suspended,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "idle"),
            SchedulerState::Draining => write!(f, "draining"),
            SchedulerState::Backoff { attempt } => write!(f, "backoff({})", attempt),
            SchedulerState::Suspended => write!(f, "suspended"),
        }
    }
}

/// Snapshot of scheduler progress for diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,

    /// Entries waiting for the active user.
    pub pending: u64,

    /// Most recent failure, cleared on success.
    pub last_error: Option<String>,

    /// When the remote last accepted an entry.
    pub last_sync: Option<DateTime<Utc>>,

    /// Highest total the remote has acknowledged.
    pub last_acknowledged_total: Option<u64>,

    /// Delay before the next retry while in backoff.
    #[serde(skip)]
    pub next_retry_in: Option<Duration>,

    /// Entries accepted by the remote since start.
    pub submitted: u64,

    /// Entries dropped after a permanent rejection since start.
    pub rejected: u64,
}

// =============================================================================
// Configuration
// =============================================================================

/// Timing for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,

    /// Bound on one remote call; exceeding it is a transient failure.
    pub request_timeout: Duration,
}

impl From<&PacerConfig> for SchedulerConfig {
    fn from(config: &PacerConfig) -> Self {
        SchedulerConfig {
            initial_backoff: config.retry.initial_backoff(),
            max_backoff: config.retry.max_backoff(),
            request_timeout: config.remote.request_timeout(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig::from(&PacerConfig::default())
    }
}

/// Deterministic doubling backoff capped at `max_backoff`, never giving up.
pub fn create_backoff(config: &SchedulerConfig) -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: config.initial_backoff,
        initial_interval: config.initial_backoff,
        max_interval: config.max_backoff,
        multiplier: 2.0,
        randomization_factor: 0.0,
        max_elapsed_time: None,
        ..Default::default()
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Handle for observing and stopping a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
    status: Arc<RwLock<SchedulerStatus>>,
}

impl SchedulerHandle {
    pub async fn status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }

    /// Stops the scheduler. An in-flight submit finishes first.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Shutdown channel closed".into()))
    }
}

// =============================================================================
// Scheduler
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Background task that drains the sync queue.
pub struct RetryScheduler {
    queue: SyncQueue,
    counters: CounterRepository,
    client: Arc<dyn RemoteSyncClient>,
    emitter: Arc<dyn NoticeEmitter>,
    session_rx: watch::Receiver<Option<Session>>,
    lifecycle_rx: watch::Receiver<AppLifecycle>,
    status: Arc<RwLock<SchedulerStatus>>,
    config: SchedulerConfig,
    shutdown_rx: mpsc::Receiver<()>,
}

impl RetryScheduler {
    /// Creates a scheduler and returns a handle.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: SyncQueue,
        counters: CounterRepository,
        client: Arc<dyn RemoteSyncClient>,
        emitter: Arc<dyn NoticeEmitter>,
        session_rx: watch::Receiver<Option<Session>>,
        lifecycle_rx: watch::Receiver<AppLifecycle>,
        status: Arc<RwLock<SchedulerStatus>>,
        config: SchedulerConfig,
    ) -> (Self, SchedulerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let scheduler = RetryScheduler {
            queue,
            counters,
            client,
            emitter,
            session_rx,
            lifecycle_rx,
            status: status.clone(),
            config,
            shutdown_rx,
        };

        (scheduler, SchedulerHandle { shutdown_tx, status })
    }

    /// Runs the drain loop until shutdown.
    pub async fn run(mut self) {
        info!(
            initial_backoff_ms = self.config.initial_backoff.as_millis() as u64,
            max_backoff_ms = self.config.max_backoff.as_millis() as u64,
            "Retry scheduler starting"
        );

        let mut backoff = create_backoff(&self.config);
        let mut attempt: u32 = 0;

        loop {
            let session = self.session_rx.borrow_and_update().clone();
            let Some(session) = session else {
                self.set_state(SchedulerState::Suspended).await;
                debug!("No session, scheduler suspended");
                if self.wait_for_session().await == Flow::Stop {
                    break;
                }
                continue;
            };

            let next = match self.queue.peek_oldest(&session.user_id).await {
                Ok(next) => next,
                Err(e) => {
                    attempt += 1;
                    error!(error = %e, attempt, "Reading sync queue failed");
                    self.record_error(e.to_string()).await;
                    if self.backoff_wait(&mut backoff, attempt).await == Flow::Stop {
                        break;
                    }
                    continue;
                }
            };

            let Some(entry) = next else {
                if attempt > 0 {
                    debug!(attempt, "Queue drained, backoff reset");
                }
                attempt = 0;
                backoff.reset();
                self.set_state(SchedulerState::Idle).await;
                if self.wait_for_work().await == Flow::Stop {
                    break;
                }
                continue;
            };

            self.set_state(SchedulerState::Draining).await;

            match self.submit(&session, &entry).await {
                Ok(()) => {
                    if let Err(e) = self.acknowledge(&session, &entry).await {
                        // Entry stays queued and will be sent again.
                        attempt += 1;
                        error!(id = entry.id, error = %e, "Removing acknowledged entry failed");
                        self.record_error(e.to_string()).await;
                        if self.backoff_wait(&mut backoff, attempt).await == Flow::Stop {
                            break;
                        }
                    }
                }

                Err(RemoteFailure::Transient(reason)) => {
                    attempt += 1;
                    warn!(id = entry.id, attempt, reason = %reason, "Sync failed, will retry");
                    self.record_error(reason).await;
                    let pending = self.refresh_pending(&session.user_id).await;
                    self.emitter.emit_notice(&SyncNotice::SavedLocally { pending });
                    if self.backoff_wait(&mut backoff, attempt).await == Flow::Stop {
                        break;
                    }
                }

                Err(RemoteFailure::Unauthorized) => {
                    warn!(id = entry.id, user_id = %session.user_id, "Session rejected, suspending sync");
                    self.record_error("unauthorized".to_string()).await;
                    self.emitter.emit_notice(&SyncNotice::SessionExpired);
                    self.set_state(SchedulerState::Suspended).await;
                    if self.wait_for_session().await == Flow::Stop {
                        break;
                    }
                }

                Err(RemoteFailure::Permanent { status, reason }) => {
                    error!(
                        id = entry.id,
                        status = ?status,
                        reason = %reason,
                        payload = %entry.payload,
                        "Remote rejected entry, dropping it"
                    );
                    if let Err(e) = self.queue.remove(entry.id).await {
                        // Reported once, after the entry is actually gone.
                        attempt += 1;
                        error!(id = entry.id, error = %e, "Removing rejected entry failed");
                        self.record_error(e.to_string()).await;
                        if self.backoff_wait(&mut backoff, attempt).await == Flow::Stop {
                            break;
                        }
                        continue;
                    }
                    {
                        let mut s = self.status.write().await;
                        s.rejected += 1;
                        s.last_error = Some(reason.clone());
                    }
                    self.refresh_pending(&session.user_id).await;
                    self.emitter.emit_notice(&SyncNotice::EntryRejected {
                        entry_id: entry.id,
                        status,
                        reason,
                    });
                }
            }
        }

        info!("Retry scheduler stopped");
    }

    async fn submit(&self, session: &Session, entry: &QueueEntry) -> Result<(), RemoteFailure> {
        debug!(id = entry.id, method = %entry.method, endpoint = %entry.endpoint, "Submitting entry");

        match tokio::time::timeout(self.config.request_timeout, self.client.submit(session, entry)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteFailure::Transient(format!(
                "timed out after {} ms",
                self.config.request_timeout.as_millis()
            ))),
        }
    }

    /// Removes a submitted entry and records the acknowledged total.
    async fn acknowledge(&self, session: &Session, entry: &QueueEntry) -> SyncResult<()> {
        self.queue.remove(entry.id).await?;

        let acknowledged = acknowledged_total(entry);
        if let Some(total) = acknowledged {
            if let Err(e) = self.counters.record_acknowledged(&session.user_id, total).await {
                warn!(error = %e, total, "Recording acknowledged total failed");
            }
        }

        {
            let mut s = self.status.write().await;
            s.submitted += 1;
            s.last_sync = Some(Utc::now());
            s.last_error = None;
            if let Some(total) = acknowledged {
                s.last_acknowledged_total = Some(s.last_acknowledged_total.map_or(total, |t| t.max(total)));
            }
        }

        info!(id = entry.id, acknowledged_total = ?acknowledged, "Entry synced");
        self.refresh_pending(&session.user_id).await;
        Ok(())
    }

    /// Sleeps for the next backoff delay, cut short by foreground or a
    /// session change.
    async fn backoff_wait(&mut self, backoff: &mut ExponentialBackoff, attempt: u32) -> Flow {
        let delay = backoff.next_backoff().unwrap_or(self.config.max_backoff);

        {
            let mut s = self.status.write().await;
            s.state = SchedulerState::Backoff { attempt };
            s.next_retry_in = Some(delay);
        }
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off");

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => return Flow::Stop,

                _ = &mut sleep => return Flow::Continue,

                changed = self.lifecycle_rx.changed() => {
                    if changed.is_err() {
                        return Flow::Stop;
                    }
                    if self.lifecycle_rx.borrow_and_update().is_foreground() {
                        info!(attempt, "App in foreground, retrying now");
                        return Flow::Continue;
                    }
                }

                changed = self.session_rx.changed() => {
                    if changed.is_err() {
                        return Flow::Stop;
                    }
                    return Flow::Continue;
                }
            }
        }
    }

    /// Waits for an enqueue, a foreground transition or a session change.
    async fn wait_for_work(&mut self) -> Flow {
        tokio::select! {
            _ = self.shutdown_rx.recv() => Flow::Stop,
            _ = self.queue.notified() => Flow::Continue,
            changed = self.lifecycle_rx.changed() => {
                if changed.is_err() { Flow::Stop } else { Flow::Continue }
            }
            changed = self.session_rx.changed() => {
                if changed.is_err() { Flow::Stop } else { Flow::Continue }
            }
        }
    }

    /// Waits until a session is present again.
    async fn wait_for_session(&mut self) -> Flow {
        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => return Flow::Stop,
                changed = self.session_rx.changed() => {
                    if changed.is_err() {
                        return Flow::Stop;
                    }
                    if self.session_rx.borrow().is_some() {
                        info!("Session available, resuming sync");
                        return Flow::Continue;
                    }
                }
            }
        }
    }

    async fn set_state(&self, state: SchedulerState) {
        let mut s = self.status.write().await;
        if s.state != state {
            debug!(from = %s.state, to = %state, "Scheduler state change");
        }
        s.state = state;
        if !matches!(state, SchedulerState::Backoff { .. }) {
            s.next_retry_in = None;
        }
    }

    async fn record_error(&self, message: String) {
        self.status.write().await.last_error = Some(message);
    }

    async fn refresh_pending(&self, user_id: &str) -> u64 {
        let pending = match self.queue.len(user_id).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Counting pending entries failed");
                return self.status.read().await.pending;
            }
        };

        let acknowledged = {
            let mut s = self.status.write().await;
            s.pending = pending;
            s.last_acknowledged_total
        };
        self.emitter.emit_progress(pending, acknowledged);
        pending
    }
}

/// The total a step-activity write carries, if the entry is one.
fn acknowledged_total(entry: &QueueEntry) -> Option<u64> {
    if entry.method != HttpMethod::Post || entry.endpoint != STEP_ACTIVITY_ENDPOINT {
        return None;
    }
    serde_json::from_str::<StepActivityRequest>(&entry.payload)
        .ok()
        .map(|request| request.step_count)
}
