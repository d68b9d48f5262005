//! # Domain Types
//!
//! Core domain types used throughout Pacer.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   RawSample     │   │  CounterState   │   │   QueueEntry    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  counter (i64)  │   │  user_id        │   │  id (seq)       │       │
//! │  │  observed_at    │   │  total_steps    │   │  method         │       │
//! │  │                 │   │  last_counter   │   │  endpoint       │       │
//! │  │  never stored   │   │  day_key        │   │  payload (JSON) │       │
//! │  └─────────────────┘   └─────────────────┘   │  enqueued_at    │       │
//! │                                              └─────────────────┘       │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ DailyHistory    │   │ CounterSnapshot │   │   TotalScope    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  date_key       │   │  read-only view │   │  Lifetime       │       │
//! │  │  steps_for_day  │   │  for the UI     │   │  Daily          │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;

// =============================================================================
// Raw Sample
// =============================================================================

/// A single reading delivered by the sensor adapter.
///
/// The counter is signed because adapters have been observed to deliver
/// garbage; see [`RawSample::clamped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    /// Hardware step counter as reported by the device.
    pub device_counter_value: i64,

    /// When the adapter observed the reading.
    pub observed_at: DateTime<Utc>,
}

/// A reading that had to be clamped before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleAnomaly {
    /// The value the adapter actually delivered.
    pub raw_value: i64,

    /// When the adapter observed the reading.
    pub observed_at: DateTime<Utc>,
}

impl RawSample {
    /// Creates a sample observed now.
    pub fn now(device_counter_value: i64) -> Self {
        RawSample {
            device_counter_value,
            observed_at: Utc::now(),
        }
    }

    /// Returns the counter clamped to zero, plus the anomaly if clamping happened.
    pub fn clamped(&self) -> (u64, Option<SampleAnomaly>) {
        match u64::try_from(self.device_counter_value) {
            Ok(value) => (value, None),
            Err(_) => (
                0,
                Some(SampleAnomaly {
                    raw_value: self.device_counter_value,
                    observed_at: self.observed_at,
                }),
            ),
        }
    }
}

// =============================================================================
// Total Scope
// =============================================================================

/// What the logical total counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalScope {
    /// Steps since the user's state was created. Never decreases.
    #[default]
    Lifetime,

    /// Steps for the current day. The first delta of a new day starts the
    /// total from zero.
    Daily,
}

// =============================================================================
// Counter State
// =============================================================================

/// Authoritative logical step total for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    /// User the total belongs to.
    pub user_id: String,

    /// Logical step total.
    pub total_steps: u64,

    /// Last raw counter value folded into the total.
    pub last_device_counter_value: u64,

    /// Day key of the most recent mutation.
    pub day_key: String,

    /// When the state last changed.
    pub last_updated: DateTime<Utc>,

    /// Highest total the remote service has acknowledged.
    pub last_acknowledged_total: Option<u64>,
}

/// What happened when a delta was folded into a [`CounterState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedDelta {
    /// Steps added.
    pub steps: u64,

    /// Total after the delta.
    pub total_steps: u64,

    /// True if this delta opened a new day.
    pub day_rolled: bool,
}

impl CounterState {
    /// Creates state for a user that has never been seen locally.
    pub fn new(
        user_id: impl Into<String>,
        total_steps: u64,
        at: DateTime<Utc>,
        day_key: impl Into<String>,
    ) -> Self {
        CounterState {
            user_id: user_id.into(),
            total_steps,
            last_device_counter_value: 0,
            day_key: day_key.into(),
            last_updated: at,
            last_acknowledged_total: None,
        }
    }

    /// Folds a validated delta into the state.
    ///
    /// `counter` is the raw reading the delta was computed against and
    /// becomes the new `last_device_counter_value`.
    pub fn apply_delta(
        &mut self,
        steps: u64,
        counter: u64,
        at: DateTime<Utc>,
        day_key: &str,
        scope: TotalScope,
    ) -> AppliedDelta {
        let day_rolled = self.day_key != day_key;
        if day_rolled {
            self.day_key = day_key.to_string();
            if scope == TotalScope::Daily {
                self.total_steps = 0;
            }
        }

        self.total_steps = self.total_steps.saturating_add(steps);
        self.last_device_counter_value = counter;
        self.last_updated = at;

        AppliedDelta {
            steps,
            total_steps: self.total_steps,
            day_rolled,
        }
    }

    /// Returns a read-only snapshot for the UI.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            user_id: self.user_id.clone(),
            total_steps: self.total_steps,
            day_key: self.day_key.clone(),
            last_updated: self.last_updated,
        }
    }
}

/// Read-only view of the running total, consumed by the UI collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    pub user_id: String,
    #[ts(type = "number")]
    pub total_steps: u64,
    pub day_key: String,
    #[ts(as = "String")]
    pub last_updated: DateTime<Utc>,
}

// =============================================================================
// Daily History
// =============================================================================

/// Steps recorded for one user on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DailyHistoryRecord {
    pub user_id: String,
    /// `YYYY-MM-DD` under the configured day boundary.
    pub date_key: String,
    #[ts(type = "number")]
    pub steps_for_day: u64,
}

// =============================================================================
// Sync Operations
// =============================================================================

/// HTTP verb of a queued remote write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    /// Wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            other => Err(CoreError::UnknownMethod(other.to_string())),
        }
    }
}

/// A remote write that has not been queued yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub method: HttpMethod,
    pub endpoint: String,
    /// JSON request body.
    pub payload: String,
}

/// A remote write owned by the sync queue.
///
/// Entries are ordered by `id`, which the store assigns in enqueue order.
/// Two entries with identical payloads are still distinct entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Store-assigned sequence number (FIFO key).
    pub id: i64,

    /// User whose data this write carries.
    pub user_id: String,

    pub method: HttpMethod,
    pub endpoint: String,

    /// JSON request body.
    pub payload: String,

    pub enqueued_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_clamp_negative_sample() {
        let sample = RawSample {
            device_counter_value: -12,
            observed_at: ts(8),
        };
        let (value, anomaly) = sample.clamped();
        assert_eq!(value, 0);
        assert_eq!(anomaly.unwrap().raw_value, -12);

        let (value, anomaly) = RawSample::now(44).clamped();
        assert_eq!(value, 44);
        assert!(anomaly.is_none());
    }

    #[test]
    fn test_apply_delta_lifetime_scope_keeps_total_across_days() {
        let mut state = CounterState::new("user-1", 100, ts(8), "2024-05-01");

        let applied = state.apply_delta(50, 1050, ts(9), "2024-05-01", TotalScope::Lifetime);
        assert_eq!(applied.total_steps, 150);
        assert!(!applied.day_rolled);

        let applied = state.apply_delta(10, 1060, ts(10), "2024-05-02", TotalScope::Lifetime);
        assert_eq!(applied.total_steps, 160);
        assert!(applied.day_rolled);
        assert_eq!(state.day_key, "2024-05-02");
        assert_eq!(state.last_device_counter_value, 1060);
    }

    #[test]
    fn test_apply_delta_daily_scope_restarts_on_new_day() {
        let mut state = CounterState::new("user-1", 4000, ts(8), "2024-05-01");

        let applied = state.apply_delta(25, 25, ts(9), "2024-05-02", TotalScope::Daily);
        assert_eq!(applied.total_steps, 25);
        assert!(applied.day_rolled);
    }

    #[test]
    fn test_snapshot_is_camel_case() {
        let state = CounterState::new("user-1", 7, ts(8), "2024-05-01");
        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["totalSteps"], 7);
        assert_eq!(json["userId"], "user-1");
    }

    #[test]
    fn test_http_method_parse() {
        assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert_eq!(HttpMethod::Get.to_string(), "GET");
        assert!("PATCH".parse::<HttpMethod>().is_err());
    }
}
