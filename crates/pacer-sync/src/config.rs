//! # Pacer Configuration
//!
//! Configuration management for ingestion, retry and the remote API.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PACER_API_URL=https://api.example.com                              │
//! │     PACER_DEBOUNCE_MS=3000                                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pacer/pacer.toml (Linux)                                 │
//! │     ~/Library/Application Support/com.pacer.pacer/pacer.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [remote]
//! base_url = "https://api.example.com/v1"
//! request_timeout_secs = 10
//!
//! [ingest]
//! debounce_window_ms = 2000
//! day_boundary = "local"   # local | utc | { fixed_offset = { minutes = 60 } }
//! total_scope = "lifetime" # lifetime | daily
//! stride_length_m = 0.75
//!
//! [retry]
//! initial_backoff_ms = 1000
//! max_backoff_secs = 300
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use pacer_core::{DayBoundary, TotalScope};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Remote Settings
// =============================================================================

/// Where and how to reach the step-activity API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL; endpoints such as `/step-activity` are appended to it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound for one remote call (seconds). Exceeding it counts as a
    /// transient failure.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// User-Agent header sent with every call.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("pacer/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl RemoteSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Ingest Settings
// =============================================================================

/// How raw samples become totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    /// Bursts of samples arriving within this window collapse into one
    /// apply-and-enqueue cycle (milliseconds).
    #[serde(default = "default_debounce_window")]
    pub debounce_window_ms: u64,

    /// Which midnight closes a day.
    #[serde(default)]
    pub day_boundary: DayBoundary,

    /// Whether the total is lifetime or per day.
    #[serde(default)]
    pub total_scope: TotalScope,

    /// Stride length in metres. When set, payloads carry a distance.
    #[serde(default)]
    pub stride_length_m: Option<f64>,

    /// After a restart, compute the first delta against the persisted raw
    /// counter instead of only seeding from the first sample.
    ///
    /// Counts steps taken while the app was closed, at the cost of
    /// re-applying a delta that was applied but not persisted before a crash.
    #[serde(default)]
    pub resume_from_persisted_counter: bool,
}

fn default_debounce_window() -> u64 {
    2000
}

impl Default for IngestSettings {
    fn default() -> Self {
        IngestSettings {
            debounce_window_ms: default_debounce_window(),
            day_boundary: DayBoundary::default(),
            total_scope: TotalScope::default(),
            stride_length_m: None,
            resume_from_persisted_counter: false,
        }
    }
}

impl IngestSettings {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Backoff bounds for the retry scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Delay before the first retry (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Largest delay between retries (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    300
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl RetrySettings {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Where the SQLite database lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Explicit database file. Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl StorageSettings {
    /// Returns the configured path, or `<data dir>/pacer.db`.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.database_path.clone().or_else(|| {
            directories::ProjectDirs::from("com", "pacer", "pacer")
                .map(|dirs| dirs.data_dir().join("pacer.db"))
        })
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete Pacer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacerConfig {
    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub ingest: IngestSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl PacerConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (pacer.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading pacer config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load pacer config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Pacer config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let url = url::Url::parse(&self.remote.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "API URL must start with http:// or https://, got: {}",
                self.remote.base_url
            )));
        }

        if self.remote.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.retry.initial_backoff_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "initial_backoff_ms must be greater than 0".into(),
            ));
        }

        if self.retry.max_backoff() < self.retry.initial_backoff() {
            return Err(SyncError::InvalidConfig(
                "max_backoff_secs must not be below initial_backoff_ms".into(),
            ));
        }

        if let Some(stride) = self.ingest.stride_length_m {
            if !stride.is_finite() || stride <= 0.0 {
                return Err(SyncError::InvalidConfig(format!(
                    "stride_length_m must be a positive number, got {}",
                    stride
                )));
            }
        }

        if let DayBoundary::FixedOffset { minutes } = self.ingest.day_boundary {
            DayBoundary::fixed_offset(minutes)
                .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        }

        Ok(())
    }

    /// Applies `PACER_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("PACER_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.remote.base_url = url;
        }

        if let Some(secs) = lookup("PACER_REQUEST_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(s) => self.remote.request_timeout_secs = s,
                Err(_) => warn!(value = %secs, "Invalid PACER_REQUEST_TIMEOUT_SECS"),
            }
        }

        if let Some(ms) = lookup("PACER_DEBOUNCE_MS") {
            match ms.parse() {
                Ok(m) => self.ingest.debounce_window_ms = m,
                Err(_) => warn!(value = %ms, "Invalid PACER_DEBOUNCE_MS"),
            }
        }

        if let Some(boundary) = lookup("PACER_DAY_BOUNDARY") {
            match parse_day_boundary(&boundary) {
                Some(b) => {
                    debug!(boundary = %b, "Overriding day boundary from environment");
                    self.ingest.day_boundary = b;
                }
                None => warn!(value = %boundary, "Unknown day boundary in environment"),
            }
        }

        if let Some(scope) = lookup("PACER_TOTAL_SCOPE") {
            match scope.to_lowercase().as_str() {
                "lifetime" => self.ingest.total_scope = TotalScope::Lifetime,
                "daily" => self.ingest.total_scope = TotalScope::Daily,
                _ => warn!(value = %scope, "Unknown total scope in environment"),
            }
        }

        if let Some(stride) = lookup("PACER_STRIDE_LENGTH_M") {
            match stride.parse() {
                Ok(s) => self.ingest.stride_length_m = Some(s),
                Err(_) => warn!(value = %stride, "Invalid PACER_STRIDE_LENGTH_M"),
            }
        }

        if let Some(ms) = lookup("PACER_INITIAL_BACKOFF_MS") {
            match ms.parse() {
                Ok(m) => self.retry.initial_backoff_ms = m,
                Err(_) => warn!(value = %ms, "Invalid PACER_INITIAL_BACKOFF_MS"),
            }
        }

        if let Some(secs) = lookup("PACER_MAX_BACKOFF_SECS") {
            match secs.parse() {
                Ok(s) => self.retry.max_backoff_secs = s,
                Err(_) => warn!(value = %secs, "Invalid PACER_MAX_BACKOFF_SECS"),
            }
        }

        if let Some(path) = lookup("PACER_DB_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "pacer", "pacer")
            .map(|dirs| dirs.config_dir().join("pacer.toml"))
    }
}

/// `local`, `utc`, or a signed offset in minutes such as `-300`.
fn parse_day_boundary(value: &str) -> Option<DayBoundary> {
    match value.trim().to_lowercase().as_str() {
        "local" => Some(DayBoundary::Local),
        "utc" => Some(DayBoundary::Utc),
        other => other
            .parse::<i32>()
            .ok()
            .and_then(|minutes| DayBoundary::fixed_offset(minutes).ok()),
    }
}
