//! # pacer-db: Database Layer for Pacer
//!
//! This crate is the durable store for the step counter. It uses SQLite for
//! local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Pacer Data Flow                                │
//! │                                                                         │
//! │  Ingestion task (apply delta)        Retry scheduler (drain queue)     │
//! │       │                                    │                            │
//! │       ▼                                    ▼                            │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     pacer-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │  Repositories      │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │    │                    │  │ (embedded) │  │   │
//! │  │   │               │    │ CounterRepository  │  │            │  │   │
//! │  │   │ SqlitePool    │◄───│ HistoryRepository  │  │ 001_init   │  │   │
//! │  │   │               │    │ SyncQueueRepository│  │            │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Counter state, daily history and sync queue access
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pacer_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/pacer.db")).await?;
//!
//! let state = db.counters().get("user-1").await?;
//! let pending = db.sync_queue().count("user-1").await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::counter::CounterRepository;
pub use repository::history::HistoryRepository;
pub use repository::queue::SyncQueueRepository;
