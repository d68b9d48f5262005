//! # Sync Error Types
//!
//! Error types for the ingestion and sync runtime.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Client      │  │       Storage           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  HttpClient     │  │  Storage                │ │
//! │  │  InvalidUrl     │  │                 │  │  SerializationFailed    │ │
//! │  │  ConfigLoad/Save│  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Session      │  │    Lifecycle    │                              │
//! │  │                 │  │                 │                              │
//! │  │  UserMismatch   │  │  AlreadyRunning │                              │
//! │  │                 │  │  NotRunning     │                              │
//! │  │                 │  │  TaskFailed     │                              │
//! │  │                 │  │  ChannelError   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Remote submit outcomes are not errors of this type. The scheduler
//! classifies them with [`RemoteFailure`](crate::client::RemoteFailure).

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering every failure the runtime can report.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid remote API URL.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Client Errors
    // =========================================================================
    /// Failed to build the HTTP client.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// A store write or read failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Failed to serialize a payload.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// The session changed to a different user while running.
    #[error("Session belongs to {actual}, agent is running for {expected}")]
    UserMismatch { expected: String, actual: String },

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// `start` called twice.
    #[error("Agent is already running")]
    AlreadyRunning,

    /// An operation needed a started agent.
    #[error("Agent is not running")]
    NotRunning,

    /// A background task ended unexpectedly.
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<pacer_db::DbError> for SyncError {
    fn from(err: pacer_db::DbError) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<pacer_core::CoreError> for SyncError {
    fn from(err: pacer_core::CoreError) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::TaskFailed(err.to_string())
    }
}
