//! # Repository Module
//!
//! Database repository implementations for Pacer.
//!
//! ## Persisted State
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Logical key                         Table / column                     │
//! │  ─────────────────────────────────   ───────────────────────────────    │
//! │  current total                       counter_state.total_steps          │
//! │  last raw device counter             counter_state.last_device_counter  │
//! │  last remote-acknowledged total      counter_state.last_acknowledged_…  │
//! │  per-day history                     daily_history (user_id, date_key)  │
//! │  pending sync queue                  sync_queue (id AUTOINCREMENT)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CounterRepository`](counter::CounterRepository) - Counter state per user
//! - [`HistoryRepository`](history::HistoryRepository) - Daily step history
//! - [`SyncQueueRepository`](queue::SyncQueueRepository) - Ordered remote-write queue

pub mod counter;
pub mod history;
pub mod queue;

use crate::error::{DbError, DbResult};

/// SQLite stores integers as i64; step counts are u64 in the domain.
pub(crate) fn to_sql_int(field: &str, value: u64) -> DbResult<i64> {
    i64::try_from(value)
        .map_err(|_| DbError::InvalidData(format!("{} too large to store: {}", field, value)))
}

pub(crate) fn from_sql_int(field: &str, value: i64) -> DbResult<u64> {
    u64::try_from(value)
        .map_err(|_| DbError::InvalidData(format!("{} is negative in storage: {}", field, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_conversions() {
        assert_eq!(to_sql_int("total", 42).unwrap(), 42);
        assert!(to_sql_int("total", u64::MAX).is_err());
        assert_eq!(from_sql_int("total", 7).unwrap(), 7);
        assert!(from_sql_int("total", -1).is_err());
    }
}
