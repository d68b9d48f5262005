//! # Daily History Repository
//!
//! Read access to per-day step records. Writes happen inside
//! [`CounterRepository::apply`](super::counter::CounterRepository::apply).

use sqlx::{FromRow, SqlitePool};

use pacer_core::DailyHistoryRecord;

use super::from_sql_int;
use crate::error::{DbError, DbResult};

#[derive(Debug, FromRow)]
struct HistoryRow {
    user_id: String,
    date_key: String,
    steps_for_day: i64,
}

impl TryFrom<HistoryRow> for DailyHistoryRecord {
    type Error = DbError;

    fn try_from(row: HistoryRow) -> DbResult<Self> {
        Ok(DailyHistoryRecord {
            user_id: row.user_id,
            date_key: row.date_key,
            steps_for_day: from_sql_int("steps_for_day", row.steps_for_day)?,
        })
    }
}

/// Repository for daily history queries.
#[derive(Debug, Clone)]
pub struct HistoryRepository {
    pool: SqlitePool,
}

impl HistoryRepository {
    /// Creates a new HistoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        HistoryRepository { pool }
    }

    /// Returns the record for one day.
    pub async fn get(&self, user_id: &str, date_key: &str) -> DbResult<Option<DailyHistoryRecord>> {
        let row = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT user_id, date_key, steps_for_day
            FROM daily_history
            WHERE user_id = ?1 AND date_key = ?2
            "#,
        )
        .bind(user_id)
        .bind(date_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DailyHistoryRecord::try_from).transpose()
    }

    /// Returns the most recent days first, at most `limit` of them.
    pub async fn for_user(&self, user_id: &str, limit: u32) -> DbResult<Vec<DailyHistoryRecord>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT user_id, date_key, steps_for_day
            FROM daily_history
            WHERE user_id = ?1
            ORDER BY date_key DESC
            LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DailyHistoryRecord::try_from).collect()
    }
}
