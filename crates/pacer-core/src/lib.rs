//! # pacer-core: Pure Step Logic for Pacer
//!
//! This crate holds everything about step counting that can be expressed
//! without I/O: turning raw hardware counter readings into step deltas,
//! deciding which calendar day a delta belongs to, and the payloads that end
//! up on the wire.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Pacer Data Flow                                │
//! │                                                                         │
//! │  Sensor Adapter (host)                                                  │
//! │       │ RawSample                                                       │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ pacer-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   delta   │  │    day    │  │   types   │  │  payload  │  │   │
//! │  │   │  Delta    │  │ DayBound- │  │ Counter-  │  │ StepAct-  │  │   │
//! │  │   │  Computer │  │ ary       │  │ State     │  │ ivity     │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  pacer-db (persistence) ──► pacer-sync (ingestion + retry scheduler)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`delta`] - Raw counter → step delta conversion with reset detection
//! - [`day`] - Day boundary policy and date keys
//! - [`types`] - Domain types (RawSample, CounterState, QueueEntry, ...)
//! - [`payload`] - Step-activity wire payloads
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use pacer_core::delta::{DeltaComputer, Observation};
//!
//! let mut computer = DeltaComputer::seeded(1000);
//!
//! // Counter advanced normally
//! assert_eq!(computer.observe(1050).delta(), 50);
//!
//! // Device rebooted: the counter restarted near zero
//! assert_eq!(computer.observe(800).delta(), 800);
//! assert!(matches!(computer.observe(800), Observation::Advanced { steps: 0, .. }));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod day;
pub mod delta;
pub mod error;
pub mod payload;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use day::DayBoundary;
pub use delta::{compute_delta, DeltaComputer, Observation};
pub use error::{CoreError, CoreResult};
pub use payload::{StepActivityList, StepActivityRecord, StepActivityRequest};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Remote endpoint that receives and serves step activity.
pub const STEP_ACTIVITY_ENDPOINT: &str = "/step-activity";

/// Format of the calendar day keys used by [`DailyHistoryRecord`].
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";
