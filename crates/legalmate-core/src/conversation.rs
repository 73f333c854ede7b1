//! Conversation state machine.
//!
//! Owns the visible message list, the known-sessions list and the loading
//! phase, and drives them through [`SessionIdentity`] and [`ApiClient`].
//!
//! Sending and history loading come in two halves (`begin_*` and
//! `complete_*`) so a shell can run the network call on its own task and
//! keep handling input meanwhile. [`Conversation::send`] and
//! [`Conversation::select_session`] compose the halves for callers that can
//! simply await.
//!
//! A send is a two-phase append: the user message is committed when the send
//! begins and is never removed; the response phase only ever appends an
//! assistant or error message after it.
//!
//! At most one send per session is in flight. Sends started in sessions the
//! user has since left may still be pending and do not block the active one.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, SendMode};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::message::{Answer, HistoryRecord, Message};
use crate::session::{SessionId, SessionIdentity, SessionRecord};

/// What to do with a reply that arrives after the user has switched to a
/// different session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleResponsePolicy {
    /// Append it to whatever conversation is showing.
    #[default]
    AppendToCurrent,
    /// Drop it.
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Sending,
    LoadingHistory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationState {
    pub active_session: SessionId,
    pub messages: Vec<Message>,
    pub known_sessions: Vec<SessionRecord>,
    pub phase: Phase,
}

impl ConversationState {
    pub fn loading(&self) -> bool {
        self.phase != Phase::Idle
    }
}

/// A send that has been committed locally and awaits its reply.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    id: u64,
    pub session_id: SessionId,
    pub text: String,
    mode: SendMode,
    cancel: CancellationToken,
}

impl PendingTurn {
    /// Performs the network half of the send. Safe to run on another task.
    pub async fn dispatch(&self, api: &ApiClient) -> Result<Answer, ApiError> {
        api.send_turn_with(self.mode, &self.text, &self.session_id, Some(&self.cancel))
            .await
    }
}

/// A history load for a newly selected session.
#[derive(Debug, Clone)]
pub struct HistoryRequest {
    pub session_id: SessionId,
}

impl HistoryRequest {
    pub async fn dispatch(&self, api: &ApiClient) -> Result<Vec<HistoryRecord>, ApiError> {
        api.get_history(&self.session_id).await
    }
}

/// How a completed send changed the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// An assistant message was appended.
    Answered,
    /// An error message was appended.
    Failed(ApiError),
    /// The backend rejected the API keys. An error message was appended, the
    /// keys are gone and the shell must re-collect them.
    HardReset,
    /// The reply belonged to a session that is no longer active and was dropped.
    Discarded,
}

/// A dispatched send whose reply has not been applied yet.
#[derive(Debug)]
struct InFlight {
    turn: u64,
    session_id: SessionId,
    cancel: CancellationToken,
}

pub struct Conversation {
    api: ApiClient,
    identity: SessionIdentity,
    send_mode: SendMode,
    stale_policy: StaleResponsePolicy,
    state: ConversationState,
    in_flight: Vec<InFlight>,
    next_turn: u64,
}

impl Conversation {
    pub fn new(api: ApiClient, identity: SessionIdentity, config: &ClientConfig) -> Result<Self> {
        let active_session = identity.current()?;

        Ok(Self {
            api,
            identity,
            send_mode: config.send_mode,
            stale_policy: config.stale_responses,
            state: ConversationState {
                active_session,
                messages: Vec::new(),
                known_sessions: Vec::new(),
                phase: Phase::Idle,
            },
            in_flight: Vec::new(),
            next_turn: 0,
        })
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn messages(&self) -> &[Message] {
        &self.state.messages
    }

    pub fn known_sessions(&self) -> &[SessionRecord] {
        &self.state.known_sessions
    }

    pub fn active_session(&self) -> &SessionId {
        &self.state.active_session
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn loading(&self) -> bool {
        self.state.loading()
    }

    pub fn send_mode(&self) -> SendMode {
        self.send_mode
    }

    // ─────────────────────────────────────────────────────────────────────
    // Send
    // ─────────────────────────────────────────────────────────────────────

    /// Commits the user message and returns the turn to dispatch. `None` when
    /// the input is blank or the conversation is already loading.
    pub fn begin_send(&mut self, input: &str) -> Option<PendingTurn> {
        if input.trim().is_empty() || self.loading() {
            return None;
        }

        let session_id = self.state.active_session.clone();

        // First message of the session names it
        if self.state.messages.is_empty()
            && !self
                .state
                .known_sessions
                .iter()
                .any(|record| record.id == session_id)
        {
            let record = SessionRecord::from_first_message(session_id.clone(), input);
            debug!(session_id = %session_id, title = %record.title, "New session record");
            self.state.known_sessions.insert(0, record);
        }

        self.state.messages.push(Message::User(input.to_string()));
        self.state.phase = Phase::Sending;

        let id = self.next_turn;
        self.next_turn += 1;
        let cancel = CancellationToken::new();
        self.in_flight.push(InFlight {
            turn: id,
            session_id: session_id.clone(),
            cancel: cancel.clone(),
        });

        Some(PendingTurn {
            id,
            session_id,
            text: input.to_string(),
            mode: self.send_mode,
            cancel,
        })
    }

    /// Applies the reply of a turn started with [`begin_send`](Self::begin_send).
    pub fn complete_send(
        &mut self,
        turn: PendingTurn,
        result: Result<Answer, ApiError>,
    ) -> SendOutcome {
        self.in_flight.retain(|pending| pending.turn != turn.id);
        self.settle_phase();

        let stale = turn.session_id != self.state.active_session;
        let fatal = matches!(&result, Err(err) if err.is_fatal());

        if stale && !fatal && self.stale_policy == StaleResponsePolicy::Discard {
            debug!(
                session_id = %turn.session_id,
                active = %self.state.active_session,
                "Dropping reply for inactive session"
            );
            return SendOutcome::Discarded;
        }

        match result {
            Ok(answer) => {
                self.state.messages.push(Message::Assistant(answer));
                SendOutcome::Answered
            }
            Err(err) => {
                self.state.messages.push(Message::Error(err.to_string()));
                if err.is_fatal() {
                    SendOutcome::HardReset
                } else {
                    SendOutcome::Failed(err)
                }
            }
        }
    }

    /// Sends `input` and waits for the reply. `None` if the send was refused
    /// by the guard.
    pub async fn send(&mut self, input: &str) -> Option<SendOutcome> {
        let turn = self.begin_send(input)?;
        let result = turn.dispatch(&self.api).await;
        Some(self.complete_send(turn, result))
    }

    /// Cancels the in-flight sends of the active session, if any. Their
    /// replies will complete as transport failures.
    pub fn cancel_send(&self) -> bool {
        let mut cancelled = false;
        for pending in self
            .in_flight
            .iter()
            .filter(|pending| pending.session_id == self.state.active_session)
        {
            pending.cancel.cancel();
            cancelled = true;
        }
        cancelled
    }

    /// Leaves `LoadingHistory` alone; otherwise the phase is `Sending` only
    /// while the active session still has a send in flight.
    fn settle_phase(&mut self) {
        if self.state.phase == Phase::LoadingHistory {
            return;
        }
        let active = &self.state.active_session;
        self.state.phase = if self
            .in_flight
            .iter()
            .any(|pending| &pending.session_id == active)
        {
            Phase::Sending
        } else {
            Phase::Idle
        };
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────

    /// Makes `session` active and starts loading its history.
    pub fn begin_select(&mut self, session: SessionId) -> HistoryRequest {
        if let Err(err) = self.identity.adopt(&session) {
            warn!(error = %err, "Could not persist selected session");
        }

        info!(session_id = %session, "Switching session");
        self.state.active_session = session.clone();
        self.state.phase = Phase::LoadingHistory;

        HistoryRequest {
            session_id: session,
        }
    }

    /// Replaces the message list with the loaded history. A missing session
    /// is an empty conversation; any other failure leaves a single error
    /// message and is returned.
    pub fn complete_select(
        &mut self,
        request: HistoryRequest,
        result: Result<Vec<HistoryRecord>, ApiError>,
    ) -> Result<(), ApiError> {
        if request.session_id != self.state.active_session {
            debug!(session_id = %request.session_id, "Ignoring history of superseded selection");
            return Ok(());
        }

        if self.state.phase == Phase::LoadingHistory {
            self.state.phase = Phase::Idle;
        }
        self.settle_phase();

        match result {
            Ok(records) => {
                self.state.messages = records
                    .into_iter()
                    .filter_map(HistoryRecord::into_message)
                    .collect();
                Ok(())
            }
            Err(ApiError::NotFound { .. }) => {
                self.state.messages.clear();
                Ok(())
            }
            Err(err) => {
                self.state.messages = vec![Message::Error(err.to_string())];
                Err(err)
            }
        }
    }

    pub async fn select_session(&mut self, session: SessionId) -> Result<(), ApiError> {
        let request = self.begin_select(session);
        let result = request.dispatch(&self.api).await;
        self.complete_select(request, result)
    }

    /// Reloads the history of the active session.
    pub async fn load_active_history(&mut self) -> Result<(), ApiError> {
        let session = self.state.active_session.clone();
        self.select_session(session).await
    }

    /// Starts a fresh session. The known-sessions list is kept.
    pub fn new_session(&mut self) -> SessionId {
        if let Err(err) = self.identity.reset() {
            warn!(error = %err, "Could not clear persisted session");
        }

        let id = match self.identity.current() {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "Could not persist new session, keeping it in memory");
                SessionId::generate()
            }
        };

        self.state.active_session = id.clone();
        self.state.messages.clear();
        // A pending history load now belongs to a superseded session
        if self.state.phase == Phase::LoadingHistory {
            self.state.phase = Phase::Idle;
        }
        self.settle_phase();

        id
    }

    /// Reloads the known-sessions list from the backend. Failures are logged
    /// and returned, never added to the conversation.
    pub async fn refresh_sessions(&mut self) -> Result<(), ApiError> {
        match self.api.list_sessions().await {
            Ok(sessions) => {
                self.state.known_sessions = sessions;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Failed to load sessions");
                Err(err)
            }
        }
    }

    /// Deletes one session. Deleting the active session starts a new one.
    pub async fn delete_session(&mut self, session: &SessionId) -> Result<(), ApiError> {
        self.api.delete_session(session).await?;

        self.state
            .known_sessions
            .retain(|record| &record.id != session);
        if *session == self.state.active_session {
            self.new_session();
        }

        // The local removal above stands even if the reload fails
        let _ = self.refresh_sessions().await;
        Ok(())
    }

    /// Clears every session's history on the backend and starts fresh.
    pub async fn delete_all_sessions(&mut self) -> Result<(), ApiError> {
        self.api.clear_all_histories().await?;

        self.state.known_sessions.clear();
        self.new_session();
        Ok(())
    }

    /// Empties the active session's history but keeps the session.
    pub async fn clear_current_history(&mut self) -> Result<(), ApiError> {
        let session = self.state.active_session.clone();
        self.api.clear_history(&session).await?;

        if self.state.active_session == session {
            self.state.messages.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialStore, Credentials};
    use crate::store::{KeyValueStore, MemoryStore};
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    fn conversation_for(server: &MockServer, policy: StaleResponsePolicy) -> Conversation {
        let config = ClientConfig {
            base_url: server.base_url(),
            stale_responses: policy,
            ..ClientConfig::default()
        };
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let credentials = CredentialStore::new(store.clone());
        credentials
            .save(&Credentials::new("g", "c", "t"))
            .unwrap();

        let api = ApiClient::new(&config, credentials);
        Conversation::new(api, SessionIdentity::new(store), &config).unwrap()
    }

    async fn answering(server: &MockServer, text: &str) {
        let body = json!({"response": text, "metadata": {}});
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/legal_assistant");
                then.status(200).json_body(body);
            })
            .await;
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let server = MockServer::start_async().await;
        let mut conversation = conversation_for(&server, StaleResponsePolicy::default());

        assert!(conversation.begin_send("   \n").is_none());
        assert!(conversation.messages().is_empty());
        assert!(conversation.known_sessions().is_empty());
        assert!(!conversation.loading());
    }

    #[tokio::test]
    async fn second_send_while_loading_is_refused() {
        let server = MockServer::start_async().await;
        let mut conversation = conversation_for(&server, StaleResponsePolicy::default());

        let turn = conversation.begin_send("first").unwrap();
        assert!(conversation.loading());
        assert_eq!(conversation.phase(), Phase::Sending);
        assert!(conversation.begin_send("second").is_none());
        assert_eq!(conversation.messages().len(), 1);

        conversation.complete_send(turn, Ok(Answer::plain("reply")));
        assert!(!conversation.loading());
    }

    #[tokio::test]
    async fn failed_send_keeps_user_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/legal_assistant");
                then.status(500).json_body(json!({"detail": "LLM exploded"}));
            })
            .await;
        let mut conversation = conversation_for(&server, StaleResponsePolicy::default());

        let outcome = conversation.send("Explain Article 21").await.unwrap();

        assert!(matches!(outcome, SendOutcome::Failed(ApiError::RemoteFailure { status: 500, .. })));
        assert_eq!(
            conversation.messages(),
            &[
                Message::User("Explain Article 21".into()),
                Message::Error("LLM exploded".into())
            ]
        );
        assert!(!conversation.loading());
    }

    #[tokio::test]
    async fn title_is_fixed_by_first_message() {
        let server = MockServer::start_async().await;
        answering(&server, "ok").await;
        let mut conversation = conversation_for(&server, StaleResponsePolicy::default());

        conversation.send("Short question").await.unwrap();
        conversation
            .send("A much longer follow-up question that goes well past the forty character limit")
            .await
            .unwrap();

        assert_eq!(conversation.known_sessions().len(), 1);
        assert_eq!(conversation.known_sessions()[0].title, "Short question...");
        assert_eq!(conversation.messages().len(), 4);
    }

    #[tokio::test]
    async fn new_session_keeps_known_sessions() {
        let server = MockServer::start_async().await;
        answering(&server, "ok").await;
        let mut conversation = conversation_for(&server, StaleResponsePolicy::default());

        conversation.send("First chat").await.unwrap();
        let old = conversation.active_session().clone();

        let new = conversation.new_session();
        assert_ne!(old, new);
        assert_eq!(conversation.active_session(), &new);
        assert!(conversation.messages().is_empty());
        assert_eq!(conversation.known_sessions().len(), 1);

        conversation.send("Second chat").await.unwrap();
        let titles: Vec<_> = conversation
            .known_sessions()
            .iter()
            .map(|r| r.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Second chat...", "First chat..."]);
    }

    #[tokio::test]
    async fn stale_reply_appends_to_current_by_default() {
        let server = MockServer::start_async().await;
        let mut conversation = conversation_for(&server, StaleResponsePolicy::AppendToCurrent);

        let turn = conversation.begin_send("question for A").unwrap();
        conversation.new_session();

        let outcome = conversation.complete_send(turn, Ok(Answer::plain("answer for A")));
        assert_eq!(outcome, SendOutcome::Answered);
        assert_eq!(
            conversation.messages(),
            &[Message::Assistant(Answer::plain("answer for A"))]
        );
        assert!(!conversation.loading());
    }

    #[tokio::test]
    async fn stale_reply_is_dropped_when_configured() {
        let server = MockServer::start_async().await;
        let mut conversation = conversation_for(&server, StaleResponsePolicy::Discard);

        let turn = conversation.begin_send("question for A").unwrap();
        conversation.new_session();

        let outcome = conversation.complete_send(turn, Ok(Answer::plain("answer for A")));
        assert_eq!(outcome, SendOutcome::Discarded);
        assert!(conversation.messages().is_empty());
        assert!(!conversation.loading());
    }

    #[tokio::test]
    async fn earlier_session_reply_keeps_current_send_guarded() {
        let server = MockServer::start_async().await;
        let mut conversation = conversation_for(&server, StaleResponsePolicy::default());

        let turn_a = conversation.begin_send("question in A").unwrap();
        let select_b = conversation.begin_select(SessionId::from("b"));
        conversation.complete_select(select_b, Ok(Vec::new())).unwrap();
        assert!(!conversation.loading());

        let turn_b = conversation.begin_send("question in B").unwrap();
        conversation.complete_send(turn_a, Ok(Answer::plain("answer for A")));

        assert!(conversation.loading());
        assert_eq!(conversation.phase(), Phase::Sending);
        assert!(conversation
            .begin_send("second concurrent send in B")
            .is_none());

        conversation.complete_send(turn_b, Ok(Answer::plain("answer for B")));
        assert!(!conversation.loading());
        assert!(conversation.begin_send("follow-up in B").is_some());
    }

    #[tokio::test]
    async fn returning_to_session_with_pending_send_stays_guarded() {
        let server = MockServer::start_async().await;
        let mut conversation = conversation_for(&server, StaleResponsePolicy::default());
        let session_a = conversation.active_session().clone();

        let turn_a = conversation.begin_send("question in A").unwrap();
        let select_b = conversation.begin_select(SessionId::from("b"));
        conversation.complete_select(select_b, Ok(Vec::new())).unwrap();
        assert!(!conversation.cancel_send());

        let back = conversation.begin_select(session_a);
        conversation.complete_select(back, Ok(Vec::new())).unwrap();
        assert_eq!(conversation.phase(), Phase::Sending);
        assert!(conversation.begin_send("again in A").is_none());
        assert!(conversation.cancel_send());

        conversation.complete_send(turn_a, Err(ApiError::TransportFailure("cancelled".into())));
        assert!(!conversation.loading());
    }

    #[tokio::test]
    async fn cancel_send_completes_as_transport_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/legal_assistant");
                then.status(200)
                    .delay(std::time::Duration::from_secs(5))
                    .json_body(json!({"response": "late"}));
            })
            .await;
        let mut conversation = conversation_for(&server, StaleResponsePolicy::default());

        let turn = conversation.begin_send("slow question").unwrap();
        assert!(conversation.cancel_send());
        let result = turn.dispatch(conversation.api()).await;
        let outcome = conversation.complete_send(turn, result);

        assert!(matches!(outcome, SendOutcome::Failed(ApiError::TransportFailure(_))));
        assert_eq!(conversation.messages().len(), 2);
        assert!(!conversation.cancel_send());
    }

    #[tokio::test]
    async fn selecting_a_session_replaces_messages() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/chat/history/other");
                then.status(200).json_body(json!({
                    "messages": [
                        {"type": "human", "content": "Old question"},
                        {"type": "ai", "content": "Old answer"}
                    ]
                }));
            })
            .await;
        answering(&server, "ok").await;
        let mut conversation = conversation_for(&server, StaleResponsePolicy::default());
        conversation.send("current chat").await.unwrap();

        conversation
            .select_session(SessionId::from("other"))
            .await
            .unwrap();

        assert_eq!(conversation.active_session(), &SessionId::from("other"));
        assert_eq!(
            conversation.messages(),
            &[
                Message::User("Old question".into()),
                Message::Assistant(Answer::plain("Old answer"))
            ]
        );
        assert!(!conversation.loading());
    }

    #[tokio::test]
    async fn superseded_history_is_ignored() {
        let server = MockServer::start_async().await;
        let mut conversation = conversation_for(&server, StaleResponsePolicy::default());

        let first = conversation.begin_select(SessionId::from("a"));
        let second = conversation.begin_select(SessionId::from("b"));

        let late = vec![HistoryRecord {
            kind: "human".into(),
            content: json!("from a"),
        }];
        conversation.complete_select(first, Ok(late)).unwrap();
        assert!(conversation.messages().is_empty());
        assert!(conversation.loading());

        conversation.complete_select(second, Ok(Vec::new())).unwrap();
        assert!(!conversation.loading());
    }

    #[tokio::test]
    async fn history_failure_shows_error_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/chat/history/broken");
                then.status(500).json_body(json!({"detail": "store offline"}));
            })
            .await;
        let mut conversation = conversation_for(&server, StaleResponsePolicy::default());

        let err = conversation
            .select_session(SessionId::from("broken"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "store offline");
        assert_eq!(conversation.messages(), &[Message::Error("store offline".into())]);
    }

    #[tokio::test]
    async fn deleting_inactive_session_refreshes_list_only() {
        let server = MockServer::start_async().await;
        answering(&server, "ok").await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/chat/sessions/old");
                then.status(200).json_body(json!({"success": true}));
            })
            .await;
        let mut conversation = conversation_for(&server, StaleResponsePolicy::default());
        conversation.send("keep me").await.unwrap();
        let active = conversation.active_session().clone();
        let refreshed = json!({"sessions": [{"id": active.as_str(), "title": "keep me..."}]});
        server
            .mock_async(|when, then| {
                when.method(GET).path("/chat/sessions");
                then.status(200).json_body(refreshed);
            })
            .await;

        conversation
            .delete_session(&SessionId::from("old"))
            .await
            .unwrap();

        assert_eq!(conversation.active_session(), &active);
        assert_eq!(conversation.messages().len(), 2);
        assert_eq!(conversation.known_sessions().len(), 1);
    }

    #[tokio::test]
    async fn deleting_active_session_starts_new_one() {
        let server = MockServer::start_async().await;
        answering(&server, "ok").await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path_contains("/chat/sessions/");
                then.status(200).json_body(json!({"success": true}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/chat/sessions");
                then.status(200).json_body(json!({"sessions": []}));
            })
            .await;
        let mut conversation = conversation_for(&server, StaleResponsePolicy::default());
        conversation.send("delete me").await.unwrap();
        let doomed = conversation.active_session().clone();

        conversation.delete_session(&doomed).await.unwrap();

        assert_ne!(conversation.active_session(), &doomed);
        assert!(conversation.messages().is_empty());
        assert!(conversation.known_sessions().is_empty());
    }

    #[tokio::test]
    async fn delete_all_empties_everything() {
        let server = MockServer::start_async().await;
        answering(&server, "ok").await;
        let clear_all = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/chat/history/all");
                then.status(200).json_body(json!({"success": true}));
            })
            .await;
        let mut conversation = conversation_for(&server, StaleResponsePolicy::default());
        conversation.send("one").await.unwrap();
        let before = conversation.active_session().clone();

        conversation.delete_all_sessions().await.unwrap();

        clear_all.assert_async().await;
        assert!(conversation.known_sessions().is_empty());
        assert!(conversation.messages().is_empty());
        assert_ne!(conversation.active_session(), &before);
    }

    #[tokio::test]
    async fn clear_current_history_keeps_session_record() {
        let server = MockServer::start_async().await;
        answering(&server, "ok").await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path_contains("/chat/history/");
                then.status(200).json_body(json!({"success": true}));
            })
            .await;
        let mut conversation = conversation_for(&server, StaleResponsePolicy::default());
        conversation.send("clear me").await.unwrap();
        let active = conversation.active_session().clone();

        conversation.clear_current_history().await.unwrap();

        assert!(conversation.messages().is_empty());
        assert_eq!(conversation.active_session(), &active);
        assert_eq!(conversation.known_sessions().len(), 1);
    }
}
