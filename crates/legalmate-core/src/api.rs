//! Client for the legal assistant backend.
//!
//! Every call goes through [`ApiClient::send`], which applies the request
//! deadline and normalizes non-success responses into [`ApiError`]. A
//! response that rejects the caller's API keys purges the stored keys and
//! broadcasts a [`HardReset`] before the error reaches the caller.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::credentials::{CredentialStore, Credentials};
use crate::error::ApiError;
use crate::message::{Answer, AssistantReply, HistoryRecord, UNPARSEABLE_ANSWER};
use crate::session::{SessionId, SessionRecord};

const UNKNOWN_ERROR: &str = "An unknown error occurred.";
const GENERIC_ERROR: &str = "The server returned an error.";
const HARD_RESET_CAPACITY: usize = 16;

/// Which assistant endpoint a turn is posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    /// `/chat/legal_assistant`: answer plus metadata.
    #[default]
    Adaptive,
    /// `/chat/legal_assistant/simple`: answer text only.
    Simple,
}

impl SendMode {
    fn segments(&self) -> &'static [&'static str] {
        match self {
            SendMode::Adaptive => &["chat", "legal_assistant"],
            SendMode::Simple => &["chat", "legal_assistant", "simple"],
        }
    }
}

/// Emitted when the backend rejects the stored API keys. The shell must
/// discard its conversation view and ask the user for keys again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardReset {
    pub reason: String,
}

/// Body of `GET /chat/health`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub adaptive_chatbot_service_initialized: bool,
    #[serde(default)]
    pub legacy_chatbot_service_initialized: bool,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Serialize)]
struct TurnRequest<'a> {
    query: &'a str,
    session_id: &'a str,
    google_api_key: &'a str,
    cohere_api_key: &'a str,
    tavily_api_key: &'a str,
}

impl<'a> TurnRequest<'a> {
    fn new(query: &'a str, session: &'a SessionId, keys: &'a Credentials) -> Self {
        Self {
            query,
            session_id: session.as_str(),
            google_api_key: &keys.google,
            cohere_api_key: &keys.cohere,
            tavily_api_key: &keys.tavily,
        }
    }
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<HistoryRecord>,
}

#[derive(Deserialize)]
struct SessionsResponse {
    #[serde(default)]
    sessions: Vec<SessionRecord>,
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: CredentialStore,
    hard_reset: broadcast::Sender<HardReset>,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, credentials: CredentialStore) -> Self {
        let (hard_reset, _) = broadcast::channel(HARD_RESET_CAPACITY);
        Self {
            client: Client::new(),
            base_url: config.normalized_base_url().to_string(),
            credentials,
            hard_reset,
            timeout: config.request_timeout(),
        }
    }

    /// Overrides the per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Receiver for [`HardReset`] signals raised after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<HardReset> {
        self.hard_reset.subscribe()
    }

    /// Posts a turn to the adaptive endpoint.
    pub async fn send_turn(&self, text: &str, session: &SessionId) -> Result<Answer, ApiError> {
        self.send_turn_with(SendMode::Adaptive, text, session, None)
            .await
    }

    /// Posts a turn to the simple endpoint.
    pub async fn send_turn_simple(
        &self,
        text: &str,
        session: &SessionId,
    ) -> Result<Answer, ApiError> {
        self.send_turn_with(SendMode::Simple, text, session, None)
            .await
    }

    /// Posts a turn, failing with `MissingCredentials` before touching the
    /// network if no complete key set is stored.
    pub async fn send_turn_with(
        &self,
        mode: SendMode,
        text: &str,
        session: &SessionId,
        cancel: Option<&CancellationToken>,
    ) -> Result<Answer, ApiError> {
        let keys = self.credentials.load().ok_or(ApiError::MissingCredentials)?;
        let url = self.url(mode.segments())?;
        let body = TurnRequest::new(text, session, &keys);

        debug!(session_id = %session, ?mode, "Sending turn");
        let reply: AssistantReply = self
            .run(cancel, async {
                let response = self.send(self.client.post(url.clone()).json(&body)).await?;
                decode(response).await
            })
            .await?;

        Ok(Answer::from_reply(reply))
    }

    /// Ordered message log of a session. `NotFound` when the backend has no
    /// such session.
    pub async fn get_history(&self, session: &SessionId) -> Result<Vec<HistoryRecord>, ApiError> {
        let url = self.url(&["chat", "history", session.as_str()])?;

        debug!(session_id = %session, "Fetching history");
        let history: HistoryResponse = self
            .run(None, async {
                let response = self.send(self.client.get(url.clone())).await?;
                decode(response).await
            })
            .await?;

        Ok(history.messages)
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>, ApiError> {
        let url = self.url(&["chat", "sessions"])?;

        let sessions: SessionsResponse = self
            .run(None, async {
                let response = self.send(self.client.get(url.clone())).await?;
                decode(response).await
            })
            .await?;

        Ok(sessions.sessions)
    }

    /// Removes a session and its history.
    pub async fn delete_session(&self, session: &SessionId) -> Result<(), ApiError> {
        self.delete(&["chat", "sessions", session.as_str()]).await
    }

    /// Empties a session's history but keeps the session.
    pub async fn clear_history(&self, session: &SessionId) -> Result<(), ApiError> {
        self.delete(&["chat", "history", session.as_str()]).await
    }

    pub async fn clear_all_histories(&self) -> Result<(), ApiError> {
        self.delete(&["chat", "history", "all"]).await
    }

    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        let url = self.url(&["chat", "health"])?;

        self.run(None, async {
            let response = self.send(self.client.get(url.clone())).await?;
            decode(response).await
        })
        .await
    }

    // Deletions are idempotent: a session that is already gone is success.
    async fn delete(&self, segments: &[&str]) -> Result<(), ApiError> {
        let url = self.url(segments)?;
        let path = url.path().to_string();

        debug!(path = %path, "Deleting");
        let result = self
            .run(None, async {
                self.send(self.client.delete(url.clone())).await.map(drop)
            })
            .await;

        match result {
            Err(ApiError::NotFound { detail }) => {
                debug!(path = %path, %detail, "Nothing to delete");
                Ok(())
            }
            other => other,
        }
    }

    /// Appends `segments` to the base URL. Each segment is percent-encoded, so
    /// an opaque session id always stays a single path segment.
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.base_url).map_err(|err| {
            ApiError::TransportFailure(format!("Invalid base URL {}: {}", self.base_url, err))
        })?;

        url.path_segments_mut()
            .map_err(|_| {
                ApiError::TransportFailure(format!("Invalid base URL {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn run<T, F>(&self, cancel: Option<&CancellationToken>, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(ApiError::TransportFailure("Request cancelled.".to_string())),
                result = call => result,
            },
            None => call.await,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ApiError::from_transport)?;

        self.check(response).await
    }

    async fn check(&self, response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = error_detail(&body);

        if is_credential_rejection(status, &detail) {
            self.invalidate_credentials(status, &detail);
            return Err(ApiError::AuthenticationFailure { detail });
        }

        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound { detail });
        }

        warn!(status = status.as_u16(), %detail, "Backend request failed");
        Err(ApiError::RemoteFailure {
            status: status.as_u16(),
            detail,
        })
    }

    fn invalidate_credentials(&self, status: StatusCode, detail: &str) {
        warn!(
            status = status.as_u16(),
            %detail,
            "Backend rejected API keys, clearing stored keys"
        );
        self.credentials.clear();
        // No subscribers is fine; the caller still gets AuthenticationFailure
        let _ = self.hard_reset.send(HardReset {
            reason: detail.to_string(),
        });
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(ApiError::from_transport)?;

    serde_json::from_slice(&bytes).map_err(|err| {
        warn!(error = %err, "Could not decode backend response");
        ApiError::RemoteFailure {
            status: status.as_u16(),
            detail: UNPARSEABLE_ANSWER.to_string(),
        }
    })
}

fn error_detail(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(obj)) => match obj.get("detail") {
            Some(Value::String(detail)) if !detail.is_empty() => detail.clone(),
            Some(Value::Null) | None => GENERIC_ERROR.to_string(),
            Some(Value::String(_)) => GENERIC_ERROR.to_string(),
            Some(other) => other.to_string(),
        },
        Ok(_) => GENERIC_ERROR.to_string(),
        Err(_) => UNKNOWN_ERROR.to_string(),
    }
}

fn is_credential_rejection(status: StatusCode, detail: &str) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
    ) || detail.to_lowercase().contains("api key")
}
