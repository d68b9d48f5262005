//! # Remote Sync Client
//!
//! Transport seam between the retry scheduler and the step-activity API.
//!
//! ## Response Classification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Outcome                          RemoteFailure      Scheduler action   │
//! │  ───────────────────────────────  ─────────────────  ─────────────────  │
//! │  2xx                              (success)          remove entry       │
//! │  503, unreachable, timeout        Transient          backoff, retry     │
//! │  401                              Unauthorized       suspend, keep      │
//! │  other 4xx / 5xx, bad response    Permanent          drop with notice   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, warn};
use url::Url;

use pacer_core::{HttpMethod, QueueEntry, StepActivityList, STEP_ACTIVITY_ENDPOINT};

use crate::config::RemoteSettings;
use crate::error::{SyncError, SyncResult};
use crate::session::Session;

// =============================================================================
// Failure Classification
// =============================================================================

/// Why a remote call did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteFailure {
    /// Worth retrying later: unreachable, 503, timeout.
    Transient(String),

    /// The server refused the request; retrying will not help.
    Permanent { status: Option<u16>, reason: String },

    /// The credential was refused (401).
    Unauthorized,
}

impl RemoteFailure {
    /// Maps a non-2xx status to a failure.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => RemoteFailure::Unauthorized,
            503 => RemoteFailure::Transient(format!("503 Service Unavailable {}", body).trim().to_string()),
            other => RemoteFailure::Permanent {
                status: Some(other),
                reason: if body.is_empty() {
                    format!("HTTP {}", other)
                } else {
                    body.to_string()
                },
            },
        }
    }
}

impl std::fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteFailure::Transient(reason) => write!(f, "transient: {}", reason),
            RemoteFailure::Permanent { status: Some(s), reason } => {
                write!(f, "rejected ({}): {}", s, reason)
            }
            RemoteFailure::Permanent { status: None, reason } => write!(f, "rejected: {}", reason),
            RemoteFailure::Unauthorized => write!(f, "unauthorized"),
        }
    }
}

impl From<reqwest::Error> for RemoteFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() || err.is_decode() {
            RemoteFailure::Permanent {
                status: err.status().map(|s| s.as_u16()),
                reason: err.to_string(),
            }
        } else {
            // connect, timeout, request and body errors are network trouble
            RemoteFailure::Transient(err.to_string())
        }
    }
}

// =============================================================================
// Client Trait
// =============================================================================

/// Network transport used by the retry scheduler and startup seeding.
#[async_trait]
pub trait RemoteSyncClient: Send + Sync {
    /// Sends one queued write.
    async fn submit(&self, session: &Session, entry: &QueueEntry) -> Result<(), RemoteFailure>;

    /// Reads the server's newest total for the session's user.
    async fn fetch_latest_total(&self, session: &Session) -> Result<Option<u64>, RemoteFailure>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// [`RemoteSyncClient`] over HTTPS with bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpSyncClient {
    client: Client,
    base_url: Url,
}

impl HttpSyncClient {
    /// Builds a client from the remote settings.
    pub fn new(settings: &RemoteSettings) -> SyncResult<Self> {
        let base_url = Url::parse(&settings.base_url)?;

        let client = Client::builder()
            .timeout(settings.request_timeout())
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| SyncError::HttpClient(e.to_string()))?;

        Ok(HttpSyncClient { client, base_url })
    }

    /// Appends `endpoint` to the base URL, keeping any base path.
    fn endpoint_url(&self, endpoint: &str) -> Result<Url, RemoteFailure> {
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );

        Url::parse(&joined).map_err(|e| RemoteFailure::Permanent {
            status: None,
            reason: format!("invalid endpoint {}: {}", endpoint, e),
        })
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteFailure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = if status == StatusCode::UNAUTHORIZED {
        String::new()
    } else {
        response.text().await.unwrap_or_default()
    };

    Err(RemoteFailure::from_status(status.as_u16(), &body))
}

#[async_trait]
impl RemoteSyncClient for HttpSyncClient {
    async fn submit(&self, session: &Session, entry: &QueueEntry) -> Result<(), RemoteFailure> {
        let url = self.endpoint_url(&entry.endpoint)?;

        let mut request = self
            .client
            .request(to_method(entry.method), url)
            .bearer_auth(&session.access_token);

        if entry.method == HttpMethod::Post {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(entry.payload.clone());
        }

        let result = request.send().await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                debug!(id = entry.id, error = %e, "Step activity request failed");
                return Err(e.into());
            }
        };

        check_status(response).await.map(|response| {
            debug!(id = entry.id, status = %response.status(), "Step activity accepted");
        })
    }

    async fn fetch_latest_total(&self, session: &Session) -> Result<Option<u64>, RemoteFailure> {
        let url = self.endpoint_url(STEP_ACTIVITY_ENDPOINT)?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        let response = check_status(response).await?;
        let list: StepActivityList = response.json().await.map_err(|e| {
            warn!(error = %e, "Malformed step activity list");
            RemoteFailure::Permanent {
                status: None,
                reason: format!("malformed response: {}", e),
            }
        })?;

        Ok(list.latest_total())
    }
}
