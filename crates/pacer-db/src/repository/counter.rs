//! # Counter Repository
//!
//! Persists [`CounterState`] and folds deltas into the daily history.
//!
//! ## Apply Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   SINGLE TRANSACTION (apply)                            │
//! │                                                                         │
//! │  1. UPSERT counter_state (total, last counter, day key, updated)       │
//! │                                                                         │
//! │  2. UPSERT daily_history (user, day) steps_for_day += delta, per day   │
//! │                                                                         │
//! │  COMMIT ← total and history never disagree on disk                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use pacer_core::CounterState;

use super::{from_sql_int, to_sql_int};
use crate::error::{DbError, DbResult};

/// Row shape of `counter_state`.
#[derive(Debug, FromRow)]
struct CounterRow {
    user_id: String,
    total_steps: i64,
    last_device_counter: i64,
    day_key: String,
    last_updated: DateTime<Utc>,
    last_acknowledged_total: Option<i64>,
}

impl TryFrom<CounterRow> for CounterState {
    type Error = DbError;

    fn try_from(row: CounterRow) -> DbResult<Self> {
        Ok(CounterState {
            user_id: row.user_id,
            total_steps: from_sql_int("total_steps", row.total_steps)?,
            last_device_counter_value: from_sql_int("last_device_counter", row.last_device_counter)?,
            day_key: row.day_key,
            last_updated: row.last_updated,
            last_acknowledged_total: row
                .last_acknowledged_total
                .map(|v| from_sql_int("last_acknowledged_total", v))
                .transpose()?,
        })
    }
}

const UPSERT_COUNTER: &str = r#"
    INSERT INTO counter_state (
        user_id, total_steps, last_device_counter, day_key, last_updated, last_acknowledged_total
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
    ON CONFLICT (user_id) DO UPDATE SET
        total_steps = excluded.total_steps,
        last_device_counter = excluded.last_device_counter,
        day_key = excluded.day_key,
        last_updated = excluded.last_updated
"#;

/// Repository for counter state operations.
#[derive(Debug, Clone)]
pub struct CounterRepository {
    pool: SqlitePool,
}

impl CounterRepository {
    /// Creates a new CounterRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CounterRepository { pool }
    }

    /// Loads the persisted state for a user, if any.
    pub async fn get(&self, user_id: &str) -> DbResult<Option<CounterState>> {
        let row = sqlx::query_as::<_, CounterRow>(
            r#"
            SELECT user_id, total_steps, last_device_counter, day_key,
                   last_updated, last_acknowledged_total
            FROM counter_state
            WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CounterState::try_from).transpose()
    }

    /// Writes the state without touching daily history.
    ///
    /// Used for seeding and for persisting a new raw counter that carried
    /// no steps. The acknowledged total is only written on first insert; use
    /// [`record_acknowledged`](Self::record_acknowledged) afterwards.
    pub async fn save(&self, state: &CounterState) -> DbResult<()> {
        sqlx::query(UPSERT_COUNTER)
            .bind(&state.user_id)
            .bind(to_sql_int("total_steps", state.total_steps)?)
            .bind(to_sql_int("last_device_counter", state.last_device_counter_value)?)
            .bind(&state.day_key)
            .bind(state.last_updated)
            .bind(
                state
                    .last_acknowledged_total
                    .map(|v| to_sql_int("last_acknowledged_total", v))
                    .transpose()?,
            )
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Persists the state after one or more deltas and adds each day's steps
    /// to that day's record, in one transaction.
    ///
    /// `state` must already contain the deltas. `days` holds
    /// `(date_key, steps)` pairs; zero entries are skipped.
    pub async fn apply(&self, state: &CounterState, days: &[(String, u64)]) -> DbResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        sqlx::query(UPSERT_COUNTER)
            .bind(&state.user_id)
            .bind(to_sql_int("total_steps", state.total_steps)?)
            .bind(to_sql_int("last_device_counter", state.last_device_counter_value)?)
            .bind(&state.day_key)
            .bind(state.last_updated)
            .bind(
                state
                    .last_acknowledged_total
                    .map(|v| to_sql_int("last_acknowledged_total", v))
                    .transpose()?,
            )
            .execute(&mut *tx)
            .await?;

        for (date_key, steps) in days.iter().filter(|(_, steps)| *steps > 0) {
            sqlx::query(
                r#"
                INSERT INTO daily_history (user_id, date_key, steps_for_day, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?4)
                ON CONFLICT (user_id, date_key) DO UPDATE SET
                    steps_for_day = steps_for_day + excluded.steps_for_day,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&state.user_id)
            .bind(date_key)
            .bind(to_sql_int("steps", *steps)?)
            .bind(state.last_updated)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(
            user_id = %state.user_id,
            days = days.len(),
            total = state.total_steps,
            day = %state.day_key,
            "Counter state persisted"
        );

        Ok(())
    }

    /// Records a total the remote service acknowledged.
    ///
    /// Never lowers a previously acknowledged total.
    pub async fn record_acknowledged(&self, user_id: &str, total: u64) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE counter_state SET
                last_acknowledged_total = MAX(COALESCE(last_acknowledged_total, 0), ?2)
            WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .bind(to_sql_int("last_acknowledged_total", total)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

}
