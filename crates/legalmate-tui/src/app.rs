use std::sync::Arc;

use anyhow::Result;
use legalmate_core::{
    Answer, ApiClient, ApiError, ClientConfig, Conversation, CredentialStore, Credentials,
    HealthStatus, HistoryRecord, HistoryRequest, KeyValueStore, PendingTurn, SessionId,
    SessionIdentity,
};
use ratatui::widgets::ListState;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Credentials,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Sessions,
    Messages,
    Input,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Focus::Sessions => Focus::Messages,
            Focus::Messages => Focus::Input,
            Focus::Input => Focus::Sessions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyField {
    Google,
    Cohere,
    Tavily,
}

impl KeyField {
    pub const ALL: [KeyField; 3] = [KeyField::Google, KeyField::Cohere, KeyField::Tavily];

    pub fn label(self) -> &'static str {
        match self {
            KeyField::Google => "Google API Key",
            KeyField::Cohere => "Cohere API Key",
            KeyField::Tavily => "Tavily API Key",
        }
    }

    pub fn next(self) -> Self {
        match self {
            KeyField::Google => KeyField::Cohere,
            KeyField::Cohere => KeyField::Tavily,
            KeyField::Tavily => KeyField::Google,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            KeyField::Google => KeyField::Tavily,
            KeyField::Cohere => KeyField::Google,
            KeyField::Tavily => KeyField::Cohere,
        }
    }
}

/// The three-field API key form.
#[derive(Debug, Clone)]
pub struct KeyForm {
    pub google: String,
    pub cohere: String,
    pub tavily: String,
    pub field: KeyField,
    pub error: Option<String>,
}

impl Default for KeyForm {
    fn default() -> Self {
        Self {
            google: String::new(),
            cohere: String::new(),
            tavily: String::new(),
            field: KeyField::Google,
            error: None,
        }
    }
}

impl KeyForm {
    pub fn value(&self, field: KeyField) -> &str {
        match field {
            KeyField::Google => &self.google,
            KeyField::Cohere => &self.cohere,
            KeyField::Tavily => &self.tavily,
        }
    }

    pub fn value_mut(&mut self) -> &mut String {
        match self.field {
            KeyField::Google => &mut self.google,
            KeyField::Cohere => &mut self.cohere,
            KeyField::Tavily => &mut self.tavily,
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.google, &self.cohere, &self.tavily)
    }
}

/// Actions that wait for a y/n answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirm {
    DeleteSession { id: SessionId, title: String },
    DeleteAll,
}

pub type SendTask = (PendingTurn, JoinHandle<Result<Answer, ApiError>>);
pub type HistoryTask = (HistoryRequest, JoinHandle<Result<Vec<HistoryRecord>, ApiError>>);

pub struct App {
    pub should_quit: bool,
    pub screen: Screen,
    pub focus: Focus,

    // Credentials screen
    pub key_form: KeyForm,

    // Chat screen
    pub conversation: Option<Conversation>,
    pub input: String,
    pub input_cursor: usize, // in chars
    pub sessions_state: ListState,
    pub message_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub confirm: Option<Confirm>,
    pub status: Option<String>,
    pub animation_frame: u8,

    // Background work
    pub send_tasks: Vec<SendTask>,
    pub history_task: Option<HistoryTask>,
    pub health_task: Option<JoinHandle<Result<HealthStatus, ApiError>>>,
    pub health: Option<Result<HealthStatus, ApiError>>,

    // Wiring
    pub config: ClientConfig,
    pub store: Arc<dyn KeyValueStore>,
    pub api: ApiClient,
}

impl App {
    pub fn new(config: ClientConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let credentials = CredentialStore::new(store.clone());
        let api = ApiClient::new(&config, credentials);

        Self {
            should_quit: false,
            screen: Screen::Credentials,
            focus: Focus::Input,

            key_form: KeyForm::default(),

            conversation: None,
            input: String::new(),
            input_cursor: 0,
            sessions_state: ListState::default(),
            message_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            confirm: None,
            status: None,
            animation_frame: 0,

            send_tasks: Vec::new(),
            history_task: None,
            health_task: None,
            health: None,

            config,
            store,
            api,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        self.api.credentials()
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials().load().is_some()
    }

    /// Builds a fresh conversation for the persisted session and switches to
    /// the chat screen.
    pub fn open_chat(&mut self) -> Result<()> {
        let identity = SessionIdentity::new(self.store.clone());
        let conversation = Conversation::new(self.api.clone(), identity, &self.config)?;
        info!(session_id = %conversation.active_session(), "Opening chat");

        self.conversation = Some(conversation);
        self.screen = Screen::Chat;
        self.focus = Focus::Input;
        self.key_form = KeyForm::default();
        self.input.clear();
        self.input_cursor = 0;
        self.message_scroll = 0;
        self.confirm = None;
        Ok(())
    }

    /// Drops the conversation view and any work in flight and shows the key
    /// form, optionally with an explanation.
    pub fn require_credentials(&mut self, reason: Option<String>) {
        for (_, handle) in self.send_tasks.drain(..) {
            handle.abort();
        }
        if let Some((_, handle)) = self.history_task.take() {
            handle.abort();
        }

        self.conversation = None;
        self.sessions_state.select(None);
        self.confirm = None;
        self.status = None;
        self.key_form = KeyForm {
            error: reason,
            ..KeyForm::default()
        };
        self.screen = Screen::Credentials;
    }

    /// The backend rejected the keys. The persisted session goes with them,
    /// so the next chat starts under a fresh id.
    pub fn reset_after_rejected_keys(&mut self, reason: Option<String>) {
        if let Err(err) = SessionIdentity::new(self.store.clone()).reset() {
            warn!(error = %err, "Could not clear persisted session");
        }
        self.require_credentials(reason);
    }

    pub fn loading(&self) -> bool {
        self.conversation
            .as_ref()
            .map(Conversation::loading)
            .unwrap_or(false)
    }

    pub fn tick_animation(&mut self) {
        if self.loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Sidebar
    pub fn selected_session(&self) -> Option<(SessionId, String)> {
        let conversation = self.conversation.as_ref()?;
        let index = self.sessions_state.selected()?;
        conversation
            .known_sessions()
            .get(index)
            .map(|record| (record.id.clone(), record.title.clone()))
    }

    pub fn sessions_down(&mut self) {
        let len = self.session_count();
        if len > 0 {
            let i = self.sessions_state.selected().map(|i| i + 1).unwrap_or(0);
            self.sessions_state.select(Some(i.min(len - 1)));
        }
    }

    pub fn sessions_up(&mut self) {
        let i = self.sessions_state.selected().unwrap_or(0);
        self.sessions_state.select(Some(i.saturating_sub(1)));
    }

    /// Points the sidebar cursor at the active session, if it is listed.
    pub fn sync_session_selection(&mut self) {
        let Some(conversation) = self.conversation.as_ref() else {
            return;
        };
        let active = conversation.active_session();
        let index = conversation
            .known_sessions()
            .iter()
            .position(|record| &record.id == active);

        match index {
            Some(i) => self.sessions_state.select(Some(i)),
            None if self.session_count() == 0 => self.sessions_state.select(None),
            None => {}
        }
    }

    fn session_count(&self) -> usize {
        self.conversation
            .as_ref()
            .map(|c| c.known_sessions().len())
            .unwrap_or(0)
    }

    // Message pane scrolling
    pub fn scroll_up(&mut self) {
        self.message_scroll = self.message_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        if self.message_scroll < self.max_scroll() {
            self.message_scroll = self.message_scroll.saturating_add(1);
        }
    }

    /// Scroll so the newest message (or the thinking indicator) is visible.
    pub fn scroll_to_bottom(&mut self) {
        self.message_scroll = self.max_scroll();
    }

    fn max_scroll(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            60
        };
        let lines = self.message_line_count(wrap_width);
        (lines as u16).saturating_sub(self.chat_height)
    }

    // Rough wrapped height of the message pane, mirroring ui::message_lines
    fn message_line_count(&self, wrap_width: usize) -> usize {
        let Some(conversation) = self.conversation.as_ref() else {
            return 0;
        };

        let wrapped = |text: &str| -> usize {
            text.lines()
                .map(|line| line.chars().count().max(1).div_ceil(wrap_width.max(1)))
                .sum::<usize>()
                .max(1)
        };

        let mut total = 0;
        for message in conversation.messages() {
            // role label + body + blank separator
            total += 2 + wrapped(message.text());
        }
        if conversation.loading() {
            total += 2;
        }
        total
    }
}

/// Mask a secret for display, keeping the last four characters.
pub fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    if len <= 4 {
        "*".repeat(len)
    } else {
        let masked_len = len - 4;
        let last_four: String = secret.chars().skip(masked_len).collect();
        format!("{}{}", "*".repeat(masked_len.min(24)), last_four)
    }
}
