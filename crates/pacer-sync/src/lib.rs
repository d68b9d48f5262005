//! # pacer-sync: Ingestion & Sync Engine for Pacer
//!
//! Turns raw pedometer readings into a durable running total and keeps the
//! remote step-activity service up to date, offline first.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Pacer Sync Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 StepSyncAgent (Main Orchestrator)                │  │
//! │  │                                                                  │  │
//! │  │  start(session) / lifecycle(..) / set_session(..) / shutdown()   │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  IngestTask    │  │   SyncQueue    │  │  RetryScheduler        │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Debounces      │─►│ SQLite FIFO    │─►│ Oldest entry first     │    │
//! │  │ sensor samples │  │ + wake signal  │  │ Exponential backoff    │    │
//! │  │ into one write │  │                │  │ Suspends on 401        │    │
//! │  └────────────────┘  └────────────────┘  └──────────┬─────────────┘    │
//! │                                                     ▼                   │
//! │                                          ┌────────────────────────┐    │
//! │                                          │ RemoteSyncClient       │    │
//! │                                          │ (reqwest, JSON)        │    │
//! │                                          └────────────────────────┘    │
//! │                                                                         │
//! │  NOTICES (to the host via NoticeEmitter):                              │
//! │  • emit_total     - running total after every applied delta            │
//! │  • emit_progress  - pending entries and acknowledged total             │
//! │  • emit_notice    - saved locally / entry rejected / session expired   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`agent`] - `StepSyncAgent` orchestrator and builder
//! - [`client`] - Remote step-activity client and failure classes
//! - [`config`] - TOML configuration with environment overrides
//! - [`counter`] - `StepCounter`, the single writer of counter state
//! - [`error`] - Sync error types
//! - [`ingest`] - Debounced ingestion task
//! - [`notice`] - Host-facing notices
//! - [`queue`] - Durable sync queue with wake-up signal
//! - [`scheduler`] - Retry scheduler with backoff
//! - [`sensor`] - Sensor adapter trait and a manual implementation
//! - [`session`] - Session and app lifecycle types
//! - [`telemetry`] - Tracing subscriber setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pacer_sync::{PacerConfig, Session, StepSyncAgentBuilder, ManualSensor};
//! use pacer_db::{Database, DbConfig};
//!
//! pacer_sync::telemetry::init_tracing();
//!
//! let config = PacerConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new("pacer.db")).await?;
//! let sensor = Arc::new(ManualSensor::new());
//!
//! let mut agent = StepSyncAgentBuilder::new(config)
//!     .with_database(db)
//!     .with_sensor(sensor.clone())
//!     .build()?;
//!
//! agent.start(Session::new("user-1", "token")).await?;
//! sensor.push_value(1050);
//! println!("{:?}", agent.current_total().await);
//! agent.shutdown().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod client;
pub mod config;
pub mod counter;
pub mod error;
pub mod ingest;
pub mod notice;
pub mod queue;
pub mod scheduler;
pub mod sensor;
pub mod session;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{AgentStatus, StepSyncAgent, StepSyncAgentBuilder};
pub use client::{HttpSyncClient, RemoteFailure, RemoteSyncClient};
pub use config::{IngestSettings, PacerConfig, RemoteSettings, RetrySettings, StorageSettings};
pub use counter::{CounterSettings, FlushOutcome, StepCounter};
pub use error::{SyncError, SyncResult};
pub use ingest::{IngestHandle, IngestTask};
pub use notice::{NoOpEmitter, NoticeEmitter, SyncNotice};
pub use queue::SyncQueue;
pub use scheduler::{RetryScheduler, SchedulerConfig, SchedulerHandle, SchedulerState, SchedulerStatus};
pub use sensor::{ManualSensor, SampleCallback, SensorAdapter, SubscriptionHandle};
pub use session::{AppLifecycle, Session};
