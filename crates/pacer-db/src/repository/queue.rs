//! # Sync Queue Repository
//!
//! Durable FIFO of remote writes that have not been acknowledged yet.
//!
//! ## Queue Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Sync Queue Lifecycle                                 │
//! │                                                                         │
//! │  INGESTION (debounce window closes)                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT INTO sync_queue (user_id, method, endpoint, payload)           │
//! │       │          id = AUTOINCREMENT ← enqueue order                    │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            RETRY SCHEDULER (one entry at a time)                │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT ... WHERE user_id = ? ORDER BY id LIMIT 1           │   │
//! │  │                                                                 │   │
//! │  │  2. Submit to the remote service                               │   │
//! │  │     a. 2xx: DELETE WHERE id = ?                                │   │
//! │  │     b. rejected: DELETE WHERE id = ? (after a notice)          │   │
//! │  │     c. transient / 401: leave the row untouched                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • Rows are only deleted by id, so an insert during a drain is safe    │
//! │  • Identical payloads are distinct rows                                │
//! │  • A crash between submit and delete replays the entry (at-least-once) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, warn};

use pacer_core::{HttpMethod, QueueEntry, SyncOperation};

use super::from_sql_int;
use crate::error::{DbError, DbResult};

#[derive(Debug, FromRow)]
struct QueueRow {
    id: i64,
    user_id: String,
    method: String,
    endpoint: String,
    payload: String,
    enqueued_at: DateTime<Utc>,
}

impl TryFrom<QueueRow> for QueueEntry {
    type Error = DbError;

    fn try_from(row: QueueRow) -> DbResult<Self> {
        Ok(QueueEntry {
            id: row.id,
            user_id: row.user_id,
            method: row.method.parse::<HttpMethod>()?,
            endpoint: row.endpoint,
            payload: row.payload,
            enqueued_at: row.enqueued_at,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, user_id, method, endpoint, payload, enqueued_at FROM sync_queue";

/// Repository for sync queue operations.
#[derive(Debug, Clone)]
pub struct SyncQueueRepository {
    pool: SqlitePool,
}

impl SyncQueueRepository {
    /// Creates a new SyncQueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncQueueRepository { pool }
    }

    /// Appends an operation for a user.
    ///
    /// ## Returns
    /// The stored entry, carrying its assigned sequence id.
    pub async fn enqueue(&self, user_id: &str, operation: &SyncOperation) -> DbResult<QueueEntry> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO sync_queue (user_id, method, endpoint, payload, enqueued_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(user_id)
        .bind(operation.method.as_str())
        .bind(&operation.endpoint)
        .bind(&operation.payload)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let entry = QueueEntry {
            id: result.last_insert_rowid(),
            user_id: user_id.to_string(),
            method: operation.method,
            endpoint: operation.endpoint.clone(),
            payload: operation.payload.clone(),
            enqueued_at: now,
        };

        debug!(
            id = entry.id,
            user_id = %user_id,
            method = %entry.method,
            endpoint = %entry.endpoint,
            "Queued for sync"
        );

        Ok(entry)
    }

    /// Returns the oldest entry for a user without removing it.
    pub async fn peek_oldest(&self, user_id: &str) -> DbResult<Option<QueueEntry>> {
        let row = sqlx::query_as::<_, QueueRow>(&format!(
            "{} WHERE user_id = ?1 ORDER BY id ASC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(QueueEntry::try_from).transpose()
    }

    /// Removes one entry by id.
    ///
    /// ## Returns
    /// `false` if the entry was already gone.
    pub async fn remove(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM sync_queue WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes and returns the oldest entry for a user.
    pub async fn remove_oldest(&self, user_id: &str) -> DbResult<Option<QueueEntry>> {
        let row = sqlx::query_as::<_, QueueRow>(
            r#"
            DELETE FROM sync_queue
            WHERE id = (SELECT MIN(id) FROM sync_queue WHERE user_id = ?1)
            RETURNING id, user_id, method, endpoint, payload, enqueued_at
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(QueueEntry::try_from).transpose()
    }

    /// Every entry for every user, in processing order.
    pub async fn list_all(&self) -> DbResult<Vec<QueueEntry>> {
        let rows = sqlx::query_as::<_, QueueRow>(&format!("{} ORDER BY id ASC", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(QueueEntry::try_from).collect()
    }

    /// Entries for one user, in processing order.
    pub async fn list_for(&self, user_id: &str) -> DbResult<Vec<QueueEntry>> {
        let rows = sqlx::query_as::<_, QueueRow>(&format!(
            "{} WHERE user_id = ?1 ORDER BY id ASC",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QueueEntry::try_from).collect()
    }

    /// Counts pending entries for a user.
    pub async fn count(&self, user_id: &str) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        from_sql_int("count", count)
    }

    /// Counts pending entries across all users.
    pub async fn count_all(&self) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&self.pool)
            .await?;

        from_sql_int("count", count)
    }

    /// Drops every pending entry for a user without sending it.
    ///
    /// Operator-level; the data in those entries is lost to the remote.
    pub async fn purge(&self, user_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM sync_queue WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        warn!(user_id = %user_id, removed, "Sync queue purged");

        Ok(removed)
    }
}
