use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use snapslot_core::config::AutomationConfig;
use snapslot_scheduler::{
    CollaboratorError, Commit, ExecutionCollaborator, NotReadyKind, PreparationCollaborator,
    Preparation, PreparedHandle, Verification,
};

/// Client for a browser-automation service that holds one live page per session.
///
/// `prepare` opens a session and navigates up to the booking button; the
/// service answers once the page is positioned (or with why it is not).
pub struct RemoteBrowser {
    client: reqwest::Client,
    base_url: reqwest::Url,
    site_url: String,
    username: String,
    password: String,
    headless: bool,
}

impl RemoteBrowser {
    pub fn new(cfg: &AutomationConfig) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;
        let base_url = reqwest::Url::parse(&cfg.base_url).map_err(|e| {
            CollaboratorError::Other(format!("invalid automation base_url {}: {e}", cfg.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CollaboratorError::Other(format!(
                "automation base_url cannot carry a path: {}",
                cfg.base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            site_url: cfg.site_url.clone(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            headless: cfg.headless,
        })
    }

    /// Append `segments` to the base URL, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn post_json<T, B>(&self, segments: &[&str], body: &B) -> Result<T, CollaboratorError>
    where
        T: for<'de> Deserialize<'de>,
        B: Serialize + ?Sized,
    {
        let path = route(segments);
        let resp = self
            .client
            .post(self.url(segments))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = check_status(resp, &path).await?;
        resp.json()
            .await
            .map_err(|e| CollaboratorError::Parse(e.to_string()))
    }
}

#[async_trait]
impl PreparationCollaborator for RemoteBrowser {
    fn name(&self) -> &str {
        "remote-browser"
    }

    async fn prepare(&self, resource_id: &str) -> Result<Preparation, CollaboratorError> {
        if self.site_url.is_empty() || self.username.is_empty() || self.password.is_empty() {
            return Ok(Preparation::NotReady {
                kind: NotReadyKind::PreparationFailed,
                message: "automation site or credentials are not configured".to_string(),
            });
        }

        debug!(resource_id, site = %self.site_url, "opening automation session");
        let body = OpenSession {
            resource_id,
            site_url: &self.site_url,
            username: &self.username,
            password: &self.password,
            headless: self.headless,
        };
        let resp: SessionResponse = self.post_json(&["sessions"], &body).await?;
        into_preparation(resource_id, resp, Utc::now())
    }

    async fn cleanup(
        &self,
        resource_id: &str,
        handle: Option<PreparedHandle>,
    ) -> Result<(), CollaboratorError> {
        let segments = match &handle {
            Some(h) => vec!["sessions", h.session_id.as_str()],
            None => vec!["resources", resource_id, "sessions"],
        };
        let path = route(&segments);

        let resp = self
            .client
            .delete(self.url(&segments))
            .send()
            .await
            .map_err(transport_error)?;

        // Already gone is as good as closed.
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(resource_id, path = %path, "no session to close");
            return Ok(());
        }
        check_status(resp, &path).await?;
        info!(resource_id, path = %path, "automation session closed");
        Ok(())
    }
}

#[async_trait]
impl ExecutionCollaborator for RemoteBrowser {
    async fn commit(&self, handle: &PreparedHandle) -> Result<Commit, CollaboratorError> {
        let segments = ["sessions", handle.session_id.as_str(), "commit"];
        let resp: CommitResponse = self.post_json(&segments, &serde_json::json!({})).await?;
        Ok(if resp.committed {
            Commit::Committed
        } else {
            Commit::Failed(resp.message)
        })
    }

    async fn verify(&self, handle: &PreparedHandle) -> Result<Verification, CollaboratorError> {
        let segments = ["sessions", handle.session_id.as_str(), "verify"];
        let resp: VerifyResponse = self.post_json(&segments, &serde_json::json!({})).await?;
        Ok(if resp.confirmed {
            Verification::Confirmed(resp.message)
        } else {
            Verification::Unconfirmed(resp.message)
        })
    }
}

/// Unencoded route for logs and error messages.
fn route(segments: &[&str]) -> String {
    format!("/{}", segments.join("/"))
}

fn transport_error(e: reqwest::Error) -> CollaboratorError {
    if e.is_timeout() {
        CollaboratorError::Transport(format!("request timed out: {e}"))
    } else {
        CollaboratorError::Transport(e.to_string())
    }
}

async fn check_status(
    resp: reqwest::Response,
    path: &str,
) -> Result<reqwest::Response, CollaboratorError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), path, body = %text, "automation service error");
    if status == reqwest::StatusCode::NOT_FOUND && path.starts_with("/sessions/") {
        return Err(CollaboratorError::SessionNotFound(path.to_string()));
    }
    Err(CollaboratorError::Api {
        status: status.as_u16(),
        message: text,
    })
}

fn into_preparation(
    resource_id: &str,
    resp: SessionResponse,
    now: DateTime<Utc>,
) -> Result<Preparation, CollaboratorError> {
    let not_ready = |kind| Preparation::NotReady {
        kind,
        message: resp.message.clone(),
    };
    Ok(match resp.status {
        SessionStatus::Ready => {
            let session_id = resp.session_id.clone().ok_or_else(|| {
                CollaboratorError::Parse("ready session without session_id".to_string())
            })?;
            Preparation::Ready(PreparedHandle {
                session_id,
                resource_id: resource_id.to_string(),
                prepared_at: now,
            })
        }
        SessionStatus::NoCapacity => not_ready(NotReadyKind::NoCapacity),
        SessionStatus::AlreadyBooked => not_ready(NotReadyKind::AlreadyDone),
        SessionStatus::Failed => not_ready(NotReadyKind::PreparationFailed),
    })
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct OpenSession<'a> {
    resource_id: &'a str,
    site_url: &'a str,
    username: &'a str,
    password: &'a str,
    headless: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SessionStatus {
    Ready,
    NoCapacity,
    AlreadyBooked,
    Failed,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    status: SessionStatus,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    committed: bool,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    confirmed: bool,
    #[serde(default)]
    message: String,
}
