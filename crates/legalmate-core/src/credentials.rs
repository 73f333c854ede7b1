//! API key persistence.
//!
//! The backend needs three user-supplied keys on every assistant call. A
//! stored key set is either complete or absent; [`CredentialStore::load`]
//! purges anything else it finds.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CredentialError;
use crate::store::KeyValueStore;

const CREDENTIALS_KEY: &str = "legalMateApiKeys";

/// The three secrets the assistant backend requires.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub google: String,
    pub cohere: String,
    pub tavily: String,
}

impl Credentials {
    /// Builds a candidate set. Fields are trimmed.
    pub fn new(google: &str, cohere: &str, tavily: &str) -> Self {
        Self {
            google: google.trim().to_string(),
            cohere: cohere.trim().to_string(),
            tavily: tavily.trim().to_string(),
        }
    }

    /// Reads `LEGALMATE_{GOOGLE,COHERE,TAVILY}_API_KEY`. Returns `None` unless
    /// all three are set and non-empty.
    pub fn from_env() -> Option<Self> {
        let google = std::env::var("LEGALMATE_GOOGLE_API_KEY").ok()?;
        let cohere = std::env::var("LEGALMATE_COHERE_API_KEY").ok()?;
        let tavily = std::env::var("LEGALMATE_TAVILY_API_KEY").ok()?;

        Self::new(&google, &cohere, &tavily).validate().ok()
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.google.trim().is_empty() {
            missing.push("google");
        }
        if self.cohere.trim().is_empty() {
            missing.push("cohere");
        }
        if self.tavily.trim().is_empty() {
            missing.push("tavily");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Caller-side validation of a submitted key set.
    pub fn validate(self) -> Result<Self, CredentialError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(self)
        } else {
            Err(CredentialError::Incomplete { missing })
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn mask(value: &str) -> &'static str {
            if value.is_empty() {
                "<empty>"
            } else {
                "<redacted>"
            }
        }

        f.debug_struct("Credentials")
            .field("google", &mask(&self.google))
            .field("cohere", &mask(&self.cohere))
            .field("tavily", &mask(&self.tavily))
            .finish()
    }
}

/// Persists and validates [`Credentials`]. No network or UI side effects.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Persists `candidate`. An incomplete set is refused and nothing is written.
    pub fn save(&self, candidate: &Credentials) -> Result<(), CredentialError> {
        let candidate = Credentials::new(&candidate.google, &candidate.cohere, &candidate.tavily)
            .validate()?;

        let json = serde_json::to_string(&candidate)
            .map_err(|e| CredentialError::Storage(e.to_string()))?;
        self.store
            .set(CREDENTIALS_KEY, &json)
            .map_err(|e| CredentialError::Storage(e.to_string()))?;

        debug!("API keys saved");
        Ok(())
    }

    /// Returns the stored set if it is present and complete. An incomplete or
    /// unreadable record is purged.
    pub fn load(&self) -> Option<Credentials> {
        let raw = match self.store.get(CREDENTIALS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "Could not retrieve API keys");
                return None;
            }
        };

        match serde_json::from_str::<Credentials>(&raw) {
            Ok(credentials) if credentials.is_complete() => Some(credentials),
            Ok(credentials) => {
                warn!(missing = ?credentials.missing_fields(), "Stored API keys incomplete, clearing");
                self.clear();
                None
            }
            Err(err) => {
                warn!(error = %err, "Stored API keys unreadable, clearing");
                self.clear();
                None
            }
        }
    }

    /// Removes any stored set.
    pub fn clear(&self) {
        if let Err(err) = self.store.clear(CREDENTIALS_KEY) {
            warn!(error = %err, "Could not clear API keys");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn store() -> (Arc<MemoryStore>, CredentialStore) {
        let backing = Arc::new(MemoryStore::new());
        let credentials = CredentialStore::new(backing.clone());
        (backing, credentials)
    }

    #[test]
    fn save_then_load_round_trips_complete_set() {
        let (_, creds) = store();
        let keys = Credentials::new(" g-key ", "c-key", "t-key");

        creds.save(&keys).unwrap();
        let loaded = creds.load().unwrap();
        assert_eq!(loaded.google, "g-key");
        assert_eq!(loaded, keys);
    }

    #[test]
    fn save_refuses_incomplete_set() {
        let (backing, creds) = store();
        let keys = Credentials::new("g-key", "   ", "t-key");

        let err = creds.save(&keys).unwrap_err();
        assert_eq!(
            err,
            CredentialError::Incomplete {
                missing: vec!["cohere"]
            }
        );
        assert_eq!(backing.get(CREDENTIALS_KEY).unwrap(), None);
        assert!(creds.load().is_none());
    }

    #[test]
    fn save_trims_untrimmed_struct_literal() {
        let (_, creds) = store();
        let keys = Credentials {
            google: "g ".into(),
            cohere: " c".into(),
            tavily: "t".into(),
        };

        creds.save(&keys).unwrap();
        assert_eq!(creds.load().unwrap(), Credentials::new("g", "c", "t"));
    }

    #[test]
    fn load_purges_incomplete_record() {
        let (backing, creds) = store();
        backing
            .set(CREDENTIALS_KEY, r#"{"google":"g","cohere":"","tavily":"t"}"#)
            .unwrap();

        assert!(creds.load().is_none());
        assert_eq!(backing.get(CREDENTIALS_KEY).unwrap(), None);
    }

    #[test]
    fn load_purges_record_missing_a_field() {
        let (backing, creds) = store();
        backing
            .set(CREDENTIALS_KEY, r#"{"google":"g","cohere":"c"}"#)
            .unwrap();

        assert!(creds.load().is_none());
        assert_eq!(backing.get(CREDENTIALS_KEY).unwrap(), None);
    }

    #[test]
    fn load_purges_unparseable_record() {
        let (backing, creds) = store();
        backing.set(CREDENTIALS_KEY, "not json").unwrap();

        assert!(creds.load().is_none());
        assert_eq!(backing.get(CREDENTIALS_KEY).unwrap(), None);
    }

    #[test]
    fn clear_removes_stored_set() {
        let (_, creds) = store();
        creds.save(&Credentials::new("g", "c", "t")).unwrap();

        creds.clear();
        assert!(creds.load().is_none());
        // Clearing twice is fine
        creds.clear();
    }

    #[test]
    fn debug_never_prints_secrets() {
        let keys = Credentials::new("super-secret", "", "x");
        let rendered = format!("{:?}", keys);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("<empty>"));
    }
}
