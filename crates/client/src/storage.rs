//! Persistence of the client session.
//!
//! Only two things survive a restart: the last local identity and the chat
//! log. Both are stored as plain JSON copies of the in-memory values and
//! reloaded verbatim.
//!
//! [`LocalStore`] is the real backend:
//! - Web: `localStorage`
//! - Desktop: JSON files in the platform config directory:
//!   - Linux: `~/.config/huddle/`
//!   - macOS: `~/Library/Application Support/huddle/`
//!   - Windows: `%APPDATA%\huddle\`
//!
//! [`MemoryStore`] keeps everything in process, for tests and ephemeral
//! sessions.

use std::sync::Arc;

use huddle_shared::{ChatMessage, Identity};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

const IDENTITY_KEY: &str = "identity";
const CHAT_KEY: &str = "chat";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything that outlives the process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub identity: Option<Identity>,
    pub chat: Vec<ChatMessage>,
}

/// Storage collaborator behind `Session`.
pub trait SessionStore {
    /// Read the persisted session. Missing or unreadable data yields an
    /// empty session rather than an error.
    fn load_session(&self) -> PersistedSession;

    fn save_session(&self, session: &PersistedSession) -> Result<(), StorageError>;

    /// Forget the identity and the chat log.
    fn clear_session(&self) -> Result<(), StorageError>;
}

// =========================================
// In-memory store
// =========================================

/// Process-local store. Clones share the same contents, so a test can hand
/// one clone to a session and inspect (or reload from) another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<PersistedSession>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: PersistedSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn snapshot(&self) -> PersistedSession {
        self.inner.lock().clone()
    }
}

impl SessionStore for MemoryStore {
    fn load_session(&self) -> PersistedSession {
        self.snapshot()
    }

    fn save_session(&self, session: &PersistedSession) -> Result<(), StorageError> {
        *self.inner.lock() = session.clone();
        Ok(())
    }

    fn clear_session(&self) -> Result<(), StorageError> {
        *self.inner.lock() = PersistedSession::default();
        Ok(())
    }
}

// =========================================
// Platform store
// =========================================

/// Browser `localStorage` or config-directory files, keyed by namespace.
#[derive(Debug, Clone)]
pub struct LocalStore {
    namespace: String,
    #[cfg(not(target_arch = "wasm32"))]
    dir: std::path::PathBuf,
}

impl LocalStore {
    fn key(&self, name: &str) -> String {
        format!("{}.{}", self.namespace, name)
    }

    fn save<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value)?;
        self.save_raw(&self.key(name), &json)
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let key = self.key(name);
        let json = self.load_raw(&key)?;
        match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                crate::log_warn!("Ignoring unreadable {}: {}", key, e);
                None
            }
        }
    }
}

impl SessionStore for LocalStore {
    fn load_session(&self) -> PersistedSession {
        PersistedSession {
            identity: self.load(IDENTITY_KEY),
            chat: self.load(CHAT_KEY).unwrap_or_default(),
        }
    }

    fn save_session(&self, session: &PersistedSession) -> Result<(), StorageError> {
        match &session.identity {
            Some(identity) => self.save(IDENTITY_KEY, identity)?,
            None => self.remove_raw(&self.key(IDENTITY_KEY))?,
        }
        self.save(CHAT_KEY, session.chat.as_slice())
    }

    fn clear_session(&self) -> Result<(), StorageError> {
        self.remove_raw(&self.key(IDENTITY_KEY))?;
        self.remove_raw(&self.key(CHAT_KEY))
    }
}

// =========================================
// Web (WASM) implementation
// =========================================

#[cfg(target_arch = "wasm32")]
impl LocalStore {
    /// Store under `huddle.*` keys in `localStorage`.
    pub fn new() -> Result<Self, StorageError> {
        local_storage()?;
        Ok(Self {
            namespace: "huddle".to_string(),
        })
    }

    fn save_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        local_storage()?
            .set_item(key, value)
            .map_err(|e| StorageError::Unavailable(format!("{:?}", e)))
    }

    fn load_raw(&self, key: &str) -> Option<String> {
        local_storage().ok()?.get_item(key).ok()?
    }

    fn remove_raw(&self, key: &str) -> Result<(), StorageError> {
        local_storage()?
            .remove_item(key)
            .map_err(|e| StorageError::Unavailable(format!("{:?}", e)))
    }
}

#[cfg(target_arch = "wasm32")]
fn local_storage() -> Result<web_sys::Storage, StorageError> {
    let window = web_sys::window().ok_or_else(|| StorageError::Unavailable("no window".into()))?;
    window
        .local_storage()
        .ok()
        .flatten()
        .ok_or_else(|| StorageError::Unavailable("localStorage disabled".into()))
}

// =========================================
// Desktop (native) implementation
// =========================================

#[cfg(not(target_arch = "wasm32"))]
impl LocalStore {
    /// Store in the platform config directory.
    pub fn new() -> Result<Self, StorageError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| StorageError::Unavailable("no config directory".into()))?;
        Self::in_dir(config_dir.join("huddle"))
    }

    /// Store JSON files in `dir`, creating it if needed.
    pub fn in_dir(dir: impl Into<std::path::PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            namespace: "huddle".to_string(),
            dir,
        })
    }

    fn file_path(&self, key: &str) -> std::path::PathBuf {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{}.json", safe_key))
    }

    fn save_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::write(self.file_path(key), value)?;
        Ok(())
    }

    fn load_raw(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.file_path(key)).ok()
    }

    fn remove_raw(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.file_path(key)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
