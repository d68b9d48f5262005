//! # Day Boundary Policy
//!
//! Decides which calendar day a timestamp belongs to.
//!
//! Daily history is keyed by a `YYYY-MM-DD` string. The key is always derived
//! through one fixed policy so that a delta recorded at 23:59 and one at
//! 00:01 land in different records no matter where the process runs.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Policy              2024-03-09T23:30:00Z maps to                       │
//! │  ──────────────────  ─────────────────────────────                      │
//! │  Utc                 2024-03-09                                         │
//! │  FixedOffset(+60)    2024-03-10   (00:30 local)                         │
//! │  FixedOffset(-300)   2024-03-09   (18:30 local)                         │
//! │  Local               device time zone at the moment of the call         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, FixedOffset, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::DATE_KEY_FORMAT;

/// Largest accepted offset from UTC, in minutes (±18h, same bound as chrono).
const MAX_OFFSET_MINUTES: i32 = 18 * 60;

/// Which midnight closes a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayBoundary {
    /// Device-local midnight, using the host time zone.
    #[default]
    Local,

    /// Midnight UTC.
    Utc,

    /// Midnight at a fixed offset from UTC.
    FixedOffset { minutes: i32 },
}

impl DayBoundary {
    /// Creates a fixed-offset policy, rejecting offsets chrono cannot represent.
    pub fn fixed_offset(minutes: i32) -> CoreResult<Self> {
        if minutes.unsigned_abs() >= MAX_OFFSET_MINUTES.unsigned_abs() {
            return Err(CoreError::InvalidUtcOffset { minutes });
        }
        Ok(DayBoundary::FixedOffset { minutes })
    }

    /// Returns the day key for the given instant.
    pub fn day_key(&self, at: DateTime<Utc>) -> String {
        match self {
            DayBoundary::Local => at.with_timezone(&Local).format(DATE_KEY_FORMAT).to_string(),
            DayBoundary::Utc => at.format(DATE_KEY_FORMAT).to_string(),
            DayBoundary::FixedOffset { minutes } => {
                match minutes.checked_mul(60).and_then(FixedOffset::east_opt) {
                    Some(offset) => at.with_timezone(&offset).format(DATE_KEY_FORMAT).to_string(),
                    // Out-of-range offsets are rejected by `fixed_offset`; a
                    // hand-built value falls back to UTC.
                    None => at.format(DATE_KEY_FORMAT).to_string(),
                }
            }
        }
    }
}

impl std::fmt::Display for DayBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DayBoundary::Local => write!(f, "local"),
            DayBoundary::Utc => write!(f, "utc"),
            DayBoundary::FixedOffset { minutes } => write!(f, "utc{:+}m", minutes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, h, m, 0).unwrap()
    }

    #[test]
    fn test_utc_day_key() {
        assert_eq!(DayBoundary::Utc.day_key(at(23, 30)), "2024-03-09");
        assert_eq!(DayBoundary::Utc.day_key(at(0, 0)), "2024-03-09");
    }

    #[test]
    fn test_fixed_offset_crosses_midnight() {
        let east = DayBoundary::fixed_offset(60).unwrap();
        assert_eq!(east.day_key(at(23, 30)), "2024-03-10");

        let west = DayBoundary::fixed_offset(-300).unwrap();
        assert_eq!(west.day_key(at(23, 30)), "2024-03-09");
        assert_eq!(west.day_key(at(3, 0)), "2024-03-08");
    }

    #[test]
    fn test_fixed_offset_rejects_out_of_range() {
        assert!(DayBoundary::fixed_offset(18 * 60).is_err());
        assert!(DayBoundary::fixed_offset(-(18 * 60)).is_err());
        assert!(DayBoundary::fixed_offset(17 * 60).is_ok());
    }

    #[test]
    fn test_extreme_offsets_do_not_panic() {
        assert!(DayBoundary::fixed_offset(i32::MIN).is_err());
        assert!(DayBoundary::fixed_offset(i32::MAX).is_err());

        // Bypasses `fixed_offset`, as a deserialized config can.
        let huge = DayBoundary::FixedOffset { minutes: 40_000_000 };
        assert_eq!(huge.day_key(at(23, 30)), "2024-03-09");
        let lowest = DayBoundary::FixedOffset { minutes: i32::MIN };
        assert_eq!(lowest.day_key(at(23, 30)), "2024-03-09");
    }

    #[test]
    fn test_serde_representation() {
        let json = serde_json::to_string(&DayBoundary::Utc).unwrap();
        assert_eq!(json, r#""utc""#);

        let parsed: DayBoundary =
            serde_json::from_str(r#"{"fixed_offset":{"minutes":120}}"#).unwrap();
        assert_eq!(parsed, DayBoundary::FixedOffset { minutes: 120 });
    }
}
