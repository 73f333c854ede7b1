//! Error types for backend calls and credential handling.

use thiserror::Error;

/// The closed set of failures an [`ApiClient`](crate::ApiClient) call can end in.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// No complete credential set is stored. Raised before any network attempt.
    #[error("API keys are not set. Please reset them from the sidebar.")]
    MissingCredentials,

    /// The backend rejected the credentials. The stored set has already been
    /// purged and a hard reset has been signalled by the time this is returned.
    #[error("Invalid API Key provided. Please re-enter your keys.")]
    AuthenticationFailure { detail: String },

    /// The requested session does not exist on the backend.
    #[error("{detail}")]
    NotFound { detail: String },

    /// Any other non-success response. `detail` is shown to the user verbatim.
    #[error("{detail}")]
    RemoteFailure { status: u16, detail: String },

    /// The request never completed: connection refused, timed out, cancelled.
    #[error("{0}")]
    TransportFailure(String),
}

impl ApiError {
    /// Whether this failure invalidates the whole session context.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::AuthenticationFailure { .. })
    }

    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::TransportFailure("The request to the legal assistant timed out.".to_string())
        } else if err.is_connect() {
            ApiError::TransportFailure(format!(
                "Could not reach the legal assistant service: {}",
                err
            ))
        } else {
            ApiError::TransportFailure(err.to_string())
        }
    }
}

/// Problems with a candidate credential set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Please fill in all three API keys to proceed. Missing: {}", .missing.join(", "))]
    Incomplete { missing: Vec<&'static str> },

    #[error("Could not save API keys: {0}")]
    Storage(String),
}
