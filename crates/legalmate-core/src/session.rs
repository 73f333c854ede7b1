//! Session identity.
//!
//! Exactly one session id is active at a time. It is created lazily the
//! first time it is asked for and replaced on reset.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::store::KeyValueStore;

const SESSION_ID_KEY: &str = "ai_legalmate_session_id";

/// Number of characters of the first user message kept in a session title.
pub const TITLE_PREFIX_CHARS: usize = 40;
pub const TITLE_SUFFIX: &str = "...";

/// Opaque identifier of one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A known session as shown in the sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub title: String,
}

impl SessionRecord {
    /// Record for a session whose first user message is `first_message`.
    pub fn from_first_message(id: SessionId, first_message: &str) -> Self {
        Self {
            id,
            title: derive_title(first_message),
        }
    }
}

/// First [`TITLE_PREFIX_CHARS`] characters of `text` plus a fixed ellipsis.
pub fn derive_title(text: &str) -> String {
    let mut title: String = text.chars().take(TITLE_PREFIX_CHARS).collect();
    title.push_str(TITLE_SUFFIX);
    title
}

/// Persists the active [`SessionId`].
#[derive(Clone)]
pub struct SessionIdentity {
    store: Arc<dyn KeyValueStore>,
}

impl SessionIdentity {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The persisted id, generating and persisting one if none exists.
    pub fn current(&self) -> Result<SessionId> {
        if let Some(existing) = self.store.get(SESSION_ID_KEY)? {
            if !existing.trim().is_empty() {
                return Ok(SessionId(existing));
            }
        }

        let id = SessionId::generate();
        self.store.set(SESSION_ID_KEY, id.as_str())?;
        info!(session_id = %id, "Started new session");
        Ok(id)
    }

    /// Forgets the active id. The next [`current`](Self::current) generates a fresh one.
    pub fn reset(&self) -> Result<()> {
        self.store.clear(SESSION_ID_KEY)
    }

    /// Makes an existing session the active one, e.g. after picking it from
    /// the session list.
    pub fn adopt(&self, id: &SessionId) -> Result<()> {
        self.store.set(SESSION_ID_KEY, id.as_str())
    }
}
