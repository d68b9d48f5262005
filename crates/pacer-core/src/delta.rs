//! # Delta Computer
//!
//! Converts raw hardware step-counter readings into non-negative step deltas.
//!
//! ## Counter Behaviour
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Hardware Counter Over Time                          │
//! │                                                                         │
//! │  counter                                                                │
//! │    ▲                                                                    │
//! │    │            ┌──1050                                                 │
//! │    │      ┌─1000┘       (reboot)                                        │
//! │    │  ────┘               │                                             │
//! │    │                      ▼      ┌──900                                 │
//! │    │                      800────┘                                      │
//! │    └──────────────────────────────────────────────────────► time        │
//! │                                                                         │
//! │  1000 → 1050  Advanced { steps: 50 }     new >= last: new - last        │
//! │  1050 → 800   Reset    { steps: 800 }    new <  last: new               │
//! │   800 → 900   Advanced { steps: 100 }                                   │
//! │                                                                         │
//! │  The tail of the old counter between the last reading and the reboot   │
//! │  is not recoverable and is not counted.                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Seeding
//! The very first reading after the counter state is (re)loaded only seeds
//! the computer. Attributing the device's lifetime counter to the user on
//! first observation would inflate the total by months of steps.

use serde::{Deserialize, Serialize};

// =============================================================================
// Pure Delta Function
// =============================================================================

/// Computes the step delta between two hardware counter readings.
///
/// A drop in the counter is a reset (device reboot): the new counter is
/// assumed to have started from zero, so the whole new value is the delta.
///
/// ## Example
/// ```rust
/// use pacer_core::compute_delta;
///
/// assert_eq!(compute_delta(1000, 1050), 50);
/// assert_eq!(compute_delta(1000, 800), 800);
/// ```
#[inline]
pub const fn compute_delta(last: u64, new: u64) -> u64 {
    if new >= last {
        new - last
    } else {
        new
    }
}

// =============================================================================
// Observation
// =============================================================================

/// Outcome of feeding one counter reading into a [`DeltaComputer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    /// First reading since load; no steps attributed.
    Seeded { counter: u64 },

    /// Counter moved forward (or stayed put).
    Advanced { steps: u64, counter: u64 },

    /// Counter dropped below the previous reading.
    Reset {
        steps: u64,
        previous: u64,
        counter: u64,
    },
}

impl Observation {
    /// Steps attributed to the user by this observation.
    pub fn delta(&self) -> u64 {
        match self {
            Observation::Seeded { .. } => 0,
            Observation::Advanced { steps, .. } | Observation::Reset { steps, .. } => *steps,
        }
    }

    /// The counter value the computer holds after this observation.
    pub fn counter(&self) -> u64 {
        match self {
            Observation::Seeded { counter }
            | Observation::Advanced { counter, .. }
            | Observation::Reset { counter, .. } => *counter,
        }
    }

    /// Returns true if the observation detected a counter reset.
    pub fn is_reset(&self) -> bool {
        matches!(self, Observation::Reset { .. })
    }
}

// =============================================================================
// Delta Computer
// =============================================================================

/// Stateful wrapper around [`compute_delta`] that remembers the last reading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaComputer {
    last_counter: Option<u64>,
}

impl DeltaComputer {
    /// Creates an unseeded computer. The next reading only seeds it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a computer that already knows the previous reading.
    pub fn seeded(last_counter: u64) -> Self {
        DeltaComputer {
            last_counter: Some(last_counter),
        }
    }

    /// The last reading seen, if any.
    pub fn last_counter(&self) -> Option<u64> {
        self.last_counter
    }

    /// Returns true once a reading has been observed (or seeded).
    pub fn is_seeded(&self) -> bool {
        self.last_counter.is_some()
    }

    /// Feeds a (already clamped) counter reading.
    pub fn observe(&mut self, counter: u64) -> Observation {
        let previous = self.last_counter.replace(counter);

        match previous {
            None => Observation::Seeded { counter },
            Some(last) if counter >= last => Observation::Advanced {
                steps: compute_delta(last, counter),
                counter,
            },
            Some(last) => Observation::Reset {
                steps: compute_delta(last, counter),
                previous: last,
                counter,
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_delta_forward() {
        assert_eq!(compute_delta(0, 0), 0);
        assert_eq!(compute_delta(1000, 1000), 0);
        assert_eq!(compute_delta(1000, 1050), 50);
    }

    #[test]
    fn test_compute_delta_reset_counts_new_value() {
        assert_eq!(compute_delta(1000, 800), 800);
        assert_eq!(compute_delta(1000, 0), 0);
    }

    #[test]
    fn test_first_reading_only_seeds() {
        let mut computer = DeltaComputer::new();
        assert!(!computer.is_seeded());

        let obs = computer.observe(52_000);
        assert_eq!(obs, Observation::Seeded { counter: 52_000 });
        assert_eq!(obs.delta(), 0);
        assert_eq!(computer.last_counter(), Some(52_000));
    }

    #[test]
    fn test_non_decreasing_sequence_sums_to_span() {
        let readings = [1000u64, 1000, 1010, 1200, 1200, 1437];
        let mut computer = DeltaComputer::new();
        let total: u64 = readings.iter().map(|r| computer.observe(*r).delta()).sum();

        assert_eq!(total, 1437 - 1000);
    }

    #[test]
    fn test_reset_contributes_value_after_reset() {
        let mut computer = DeltaComputer::seeded(1000);

        let obs = computer.observe(800);
        assert!(obs.is_reset());
        assert_eq!(obs.delta(), 800);
        assert_eq!(
            obs,
            Observation::Reset {
                steps: 800,
                previous: 1000,
                counter: 800
            }
        );

        // Continues from the new counter afterwards
        assert_eq!(computer.observe(850).delta(), 50);
    }

    #[test]
    fn test_total_never_decreases_across_resets() {
        let readings = [500u64, 900, 20, 60, 3, 3, 400];
        let mut computer = DeltaComputer::seeded(0);
        let mut total = 0u64;

        for reading in readings {
            let before = total;
            total += computer.observe(reading).delta();
            assert!(total >= before);
        }

        // 500 + 400 + 20 + 40 + 3 + 0 + 397
        assert_eq!(total, 1360);
    }

    #[test]
    fn test_observation_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Observation::Seeded { counter: 7 }).unwrap();
        assert_eq!(json, r#"{"kind":"seeded","counter":7}"#);
    }
}
