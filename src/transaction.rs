//! Custody of the per-attempt PKCE secrets between `start` and the callback.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use crate::OAuthError;

const VERIFIER_KEY_PREFIX: &str = "pkce_";
const STATE_KEY_PREFIX: &str = "state_";

/// Key/value scope confined to one browser tab or one native login session.
///
/// Must never be shared between unrelated sessions.
pub trait EphemeralStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, OAuthError>;
    fn set(&self, key: &str, value: &str) -> Result<(), OAuthError>;
    fn remove(&self, key: &str) -> Result<Option<String>, OAuthError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, String>) -> T,
    ) -> Result<T, OAuthError> {
        let mut entries = self.entries.lock().map_err(OAuthError::storage)?;
        Ok(f(&mut entries))
    }
}

impl EphemeralStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, OAuthError> {
        self.with_entries(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), OAuthError> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<Option<String>, OAuthError> {
        self.with_entries(|entries| entries.remove(key))
    }
}

/// The secrets of one login attempt for one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct PkceTransaction {
    pub provider: String,
    pub code_verifier: String,
    pub state: String,
}

impl fmt::Debug for PkceTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceTransaction")
            .field("provider", &self.provider)
            .field("code_verifier", &"[redacted]")
            .field("state", &self.state)
            .finish()
    }
}

impl PkceTransaction {
    pub fn new(
        provider: impl Into<String>,
        code_verifier: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            code_verifier: code_verifier.into(),
            state: state.into(),
        }
    }

    pub fn verifier_key(provider: &str) -> String {
        format!("{VERIFIER_KEY_PREFIX}{provider}")
    }

    pub fn state_key(provider: &str) -> String {
        format!("{STATE_KEY_PREFIX}{provider}")
    }

    /// Stores the transaction, replacing whatever an earlier attempt left behind.
    pub fn persist(&self, store: &dyn EphemeralStore) -> Result<(), OAuthError> {
        store.set(&Self::verifier_key(&self.provider), &self.code_verifier)?;
        store.set(&Self::state_key(&self.provider), &self.state)
    }

    /// Reads and clears the stored transaction for `provider`.
    ///
    /// Both keys are removed even when only one is present, so a transaction
    /// can be consumed at most once.
    pub fn take(store: &dyn EphemeralStore, provider: &str) -> Result<Option<Self>, OAuthError> {
        let verifier = store.remove(&Self::verifier_key(provider))?;
        let state = store.remove(&Self::state_key(provider))?;

        Ok(match (verifier, state) {
            (Some(code_verifier), Some(state)) if !code_verifier.is_empty() => {
                Some(Self::new(provider, code_verifier, state))
            }
            _ => None,
        })
    }

    /// Exact comparison against the state returned by the provider.
    pub fn matches_state(&self, returned: &str) -> bool {
        self.state == returned
    }
}
