//! Durable session record with change notification.
//!
//! The store is the single owner of the current [`LoginInfo`]: it is loaded
//! once on [`SessionStore::open`], replaced by [`SessionStore::sign_in`] and
//! cleared by [`SessionStore::logout`]. Dependents observe changes through
//! [`SessionStore::subscribe`].

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{LoginInfo, OAuthError};

/// Fixed key the session record is stored under.
pub const SESSION_KEY: &str = "loginInfo";

/// Client-side storage that survives reloads.
#[async_trait]
pub trait DurableStorage: Send + Sync {
    /// `Ok(None)` when nothing is stored under `key`.
    async fn load(&self, key: &str) -> Result<Option<String>, OAuthError>;
    async fn save(&self, key: &str, value: &str) -> Result<(), OAuthError>;
    async fn remove(&self, key: &str) -> Result<(), OAuthError>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStorage for MemoryStorage {
    async fn load(&self, key: &str) -> Result<Option<String>, OAuthError> {
        let entries = self.entries.lock().map_err(OAuthError::storage)?;
        Ok(entries.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), OAuthError> {
        let mut entries = self.entries.lock().map_err(OAuthError::storage)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), OAuthError> {
        let mut entries = self.entries.lock().map_err(OAuthError::storage)?;
        entries.remove(key);
        Ok(())
    }
}

/// One JSON file per key inside `dir`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl DurableStorage for FileStorage {
    async fn load(&self, key: &str) -> Result<Option<String>, OAuthError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), OAuthError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path_for(key), value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), OAuthError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

pub struct SessionStore {
    storage: Arc<dyn DurableStorage>,
    current: watch::Sender<Option<LoginInfo>>,
}

impl SessionStore {
    /// Loads the persisted session, if any. An unreadable record is logged and
    /// treated as signed out.
    pub async fn open(storage: Arc<dyn DurableStorage>) -> Result<Self, OAuthError> {
        let initial = match storage.load(SESSION_KEY).await? {
            Some(raw) => match serde_json::from_str::<LoginInfo>(&raw) {
                Ok(info) => {
                    debug!(provider = %info.provider, "restored persisted session");
                    Some(info)
                }
                Err(err) => {
                    warn!(error = %err, "failed to parse stored login info");
                    None
                }
            },
            None => None,
        };

        let (current, _) = watch::channel(initial);
        Ok(Self { storage, current })
    }

    pub fn current(&self) -> Option<LoginInfo> {
        self.current.borrow().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Signed in with a role the backend vouched for.
    pub fn is_authorized(&self) -> bool {
        self.current
            .borrow()
            .as_ref()
            .is_some_and(|info| info.role.is_some())
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<LoginInfo>> {
        self.current.subscribe()
    }

    /// Persists `info` as the current session and notifies subscribers.
    pub async fn sign_in(&self, info: LoginInfo) -> Result<(), OAuthError> {
        let raw = serde_json::to_string(&info)?;
        self.storage.save(SESSION_KEY, &raw).await?;
        info!(provider = %info.provider, "session stored");
        self.current.send_replace(Some(info));
        Ok(())
    }

    /// Clears the session to the explicit signed-out state.
    pub async fn logout(&self) -> Result<(), OAuthError> {
        self.storage.remove(SESSION_KEY).await?;
        if self.current.send_replace(None).is_some() {
            info!("session cleared");
        }
        Ok(())
    }
}
