//! # Step Activity Payloads
//!
//! Wire types for the remote step-activity API.
//!
//! ```text
//! POST /step-activity
//!   { "stepCount": 1050, "distance": null, "timestamp": "2024-05-01T09:00:00Z" }
//!
//! GET /step-activity          (most recent first)
//!   { "data": [ { "step_count": 1050, ... }, { "step_count": 990, ... } ] }
//! ```
//!
//! Note the two directions disagree on casing; both are kept as the server
//! speaks them.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::types::{HttpMethod, SyncOperation};
use crate::STEP_ACTIVITY_ENDPOINT;

/// Body of `POST /step-activity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepActivityRequest {
    /// Cumulative logical total (not a delta).
    pub step_count: u64,

    /// Distance in metres, when a stride length is configured.
    pub distance: Option<f64>,

    /// ISO-8601 timestamp of the newest reading folded into the total.
    pub timestamp: String,
}

impl StepActivityRequest {
    /// Builds the request for a total observed at `at`.
    pub fn new(step_count: u64, stride_length_m: Option<f64>, at: DateTime<Utc>) -> Self {
        StepActivityRequest {
            step_count,
            distance: stride_length_m.map(|stride| step_count as f64 * stride),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Wraps the request into a queueable operation.
    pub fn into_operation(self) -> CoreResult<SyncOperation> {
        Ok(SyncOperation {
            method: HttpMethod::Post,
            endpoint: STEP_ACTIVITY_ENDPOINT.to_string(),
            payload: serde_json::to_string(&self)?,
        })
    }
}

/// One record of `GET /step-activity`.
///
/// Only `step_count` is consumed; the server sends more fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepActivityRecord {
    pub step_count: i64,
}

/// Body of `GET /step-activity`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepActivityList {
    #[serde(default)]
    pub data: Vec<StepActivityRecord>,
}

impl StepActivityList {
    /// The server's most recent total, if it has any.
    ///
    /// Negative totals from the server are treated as zero.
    pub fn latest_total(&self) -> Option<u64> {
        self.data
            .first()
            .map(|record| u64::try_from(record.step_count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_request_wire_shape() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let request = StepActivityRequest::new(1050, None, at);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["stepCount"], 1050);
        assert!(json["distance"].is_null());
        assert_eq!(json["timestamp"], "2024-05-01T09:00:00.000Z");
    }

    #[test]
    fn test_request_distance_from_stride() {
        let request = StepActivityRequest::new(2000, Some(0.75), Utc::now());
        assert_eq!(request.distance, Some(1500.0));
    }

    #[test]
    fn test_into_operation() {
        let op = StepActivityRequest::new(10, None, Utc::now())
            .into_operation()
            .unwrap();
        assert_eq!(op.method, HttpMethod::Post);
        assert_eq!(op.endpoint, "/step-activity");
        assert!(op.payload.contains("\"stepCount\":10"));
    }

    #[test]
    fn test_list_latest_total_is_first_record() {
        let list: StepActivityList = serde_json::from_str(
            r#"{"data":[{"step_count":5120,"distance":null},{"step_count":4000}]}"#,
        )
        .unwrap();
        assert_eq!(list.latest_total(), Some(5120));

        let empty: StepActivityList = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert_eq!(empty.latest_total(), None);
    }
}
