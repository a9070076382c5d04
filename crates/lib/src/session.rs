//! Stored login session: bearer token and identity, persisted between runs.
//!
//! The API client reads the token from a [`TokenStore`] on every request and clears it
//! when the backend answers 401. The file store keeps it at `~/.aura/session.json`.

use crate::util::lock;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Token plus the email it was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub access_token: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Where the session lives. Implementations must be cheap to call per request.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<StoredSession>;
    fn save(&self, session: &StoredSession) -> Result<()>;
    fn clear(&self);

    fn token(&self) -> Option<String> {
        self.load()
            .map(|s| s.access_token)
            .filter(|t| !t.trim().is_empty())
    }
}

/// JSON file store (default `~/.aura/session.json`).
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<StoredSession> {
        let s = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&s) {
            Ok(session) => Some(session),
            Err(e) => {
                log::warn!("ignoring unreadable session file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating session directory {}", dir.display()))?;
        }
        let body = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, body)
            .with_context(|| format!("writing session to {}", self.path.display()))?;
        Ok(())
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::info!("cleared stored session at {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("failed to remove session file {}: {}", self.path.display(), e),
        }
    }
}

/// In-memory store for tests and embedding.
#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    inner: Arc<Mutex<Option<StoredSession>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        *lock(&store.inner) = Some(StoredSession {
            access_token: token.into(),
            email: None,
        });
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<StoredSession> {
        lock(&self.inner).clone()
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        *lock(&self.inner) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) {
        *lock(&self.inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips_and_clears() {
        let dir = std::env::temp_dir().join(format!("aura-session-{}", uuid::Uuid::new_v4()));
        let store = FileTokenStore::new(dir.join("nested").join("session.json"));
        assert!(store.load().is_none());

        let session = StoredSession {
            access_token: "tok".to_string(),
            email: Some("a@b.c".to_string()),
        };
        store.save(&session).unwrap();
        assert_eq!(store.load(), Some(session));
        assert_eq!(store.token().as_deref(), Some("tok"));

        store.clear();
        assert!(store.load().is_none());
        store.clear();
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn blank_token_is_treated_as_missing() {
        let store = MemoryTokenStore::with_token("  ");
        assert!(store.load().is_some());
        assert!(store.token().is_none());
    }
}
