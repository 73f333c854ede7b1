pub mod api;
pub mod config;
pub mod conversation;
pub mod credentials;
pub mod error;
pub mod message;
pub mod session;
pub mod store;

// Re-export main types for convenience
pub use api::{ApiClient, HardReset, HealthStatus, SendMode};
pub use config::ClientConfig;
pub use conversation::{
    Conversation, ConversationState, HistoryRequest, PendingTurn, Phase, SendOutcome,
    StaleResponsePolicy,
};
pub use credentials::{CredentialStore, Credentials};
pub use error::{ApiError, CredentialError};
pub use message::{Answer, AnswerMetadata, HistoryRecord, Message};
pub use session::{derive_title, SessionId, SessionIdentity, SessionRecord};
pub use store::{FileStore, KeyValueStore, MemoryStore};
