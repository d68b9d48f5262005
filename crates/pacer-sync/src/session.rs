//! # Host Context
//!
//! What the host application tells the engine about the outside world: who
//! is signed in, and whether the app is on screen.
//!
//! Both values are broadcast over `tokio::sync::watch` channels so the
//! ingestion task and the retry scheduler always see the latest value
//! without polling the host.

use serde::{Deserialize, Serialize};

/// Signed-in user and the bearer credential for the remote API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// User whose steps are counted and synced.
    pub user_id: String,

    /// Bearer token attached to every remote call.
    pub access_token: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Session {
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }
}

// Never print the token.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// App visibility as reported by the host.
///
/// ```text
/// Foreground ──(background)──► Background
///     ▲                            │
///     └────────(foreground)────────┘
///              forces an immediate drain and flushes pending steps
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppLifecycle {
    #[default]
    Foreground,

    /// No new debounce windows are armed; in-flight work completes.
    Background,
}

impl AppLifecycle {
    pub fn is_foreground(&self) -> bool {
        matches!(self, AppLifecycle::Foreground)
    }
}

impl std::fmt::Display for AppLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppLifecycle::Foreground => write!(f, "foreground"),
            AppLifecycle::Background => write!(f, "background"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_debug_hides_token() {
        let session = Session::new("user-1", "secret-token");
        let printed = format!("{:?}", session);
        assert!(printed.contains("user-1"));
        assert!(!printed.contains("secret-token"));
    }

    #[test]
    fn test_lifecycle_default_is_foreground() {
        assert!(AppLifecycle::default().is_foreground());
        assert_eq!(AppLifecycle::Background.to_string(), "background");
    }
}
