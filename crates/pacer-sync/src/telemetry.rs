//! Tracing subscriber setup for host processes and tests.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! host's call.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,pacer_db=debug,pacer_sync=debug,sqlx=warn";

/// Installs a fmt subscriber filtered by `RUST_LOG`.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=pacer_sync=trace` - Trace the sync engine only
/// - Default: [`DEFAULT_FILTER`]
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_tracing();
        assert!(!init_tracing());
    }
}
