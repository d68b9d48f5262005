//! # Error Types
//!
//! Domain-specific error types for pacer-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  pacer-core errors (this file)                                         │
//! │  └── CoreError        - Domain failures (payloads, policies)           │
//! │                                                                         │
//! │  pacer-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  pacer-sync errors (separate crate)                                    │
//! │  └── SyncError        - Config, storage, remote, lifecycle failures    │
//! │                                                                         │
//! │  Flow: CoreError → DbError / SyncError → NoticeEmitter → UI            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Raw sample anomalies (negative counter values) are deliberately NOT an
//! error: they are clamped at the edge and reported as [`crate::SampleAnomaly`].

use thiserror::Error;

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Payload could not be encoded or decoded.
    #[error("Payload serialization failed: {0}")]
    Serialization(String),

    /// Day boundary offset outside the representable range.
    #[error("UTC offset of {minutes} minutes is out of range")]
    InvalidUtcOffset { minutes: i32 },

    /// Unknown HTTP method name in a persisted queue entry.
    #[error("Unknown HTTP method: {0}")]
    UnknownMethod(String),

    /// A user identifier was empty.
    #[error("User id is required")]
    MissingUserId,
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidUtcOffset { minutes: 2000 };
        assert_eq!(err.to_string(), "UTC offset of 2000 minutes is out of range");

        let err = CoreError::UnknownMethod("PATCH".into());
        assert_eq!(err.to_string(), "Unknown HTTP method: PATCH");
    }

    #[test]
    fn test_serde_error_converts() {
        let err: CoreError = serde_json::from_str::<u64>("nope").unwrap_err().into();
        assert!(matches!(err, CoreError::Serialization(_)));
    }
}
