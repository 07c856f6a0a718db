//! Conversation history persistence
//!
//! Directory layout of the file store:
//! ```text
//! ~/.session-bridge/history/
//! ├── <session-id>.json
//! └── ...
//! ```

use crate::agent::types::ChatMessage;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

/// Durable conversation history keyed by session identifier
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Prior messages, or `None` when the session is unknown
    async fn load(&self, session_id: &str) -> Result<Option<Vec<ChatMessage>>>;

    /// Append messages, creating the session if needed
    async fn append(&self, session_id: &str, messages: &[ChatMessage]) -> Result<()>;

    /// Forget a session; unknown sessions are not an error
    async fn remove(&self, session_id: &str) -> Result<()>;
}

/// History kept only for the lifetime of the process
#[derive(Default)]
pub struct MemoryHistoryStore {
    sessions: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn load(&self, session_id: &str) -> Result<Option<Vec<ChatMessage>>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn append(&self, session_id: &str, messages: &[ChatMessage]) -> Result<()> {
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }
}

/// One JSON file per session
pub struct JsonFileHistoryStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonFileHistoryStore {
    /// Open (and create) a store rooted at `dir`
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File for a session, or `None` for identifiers unsafe as file names
    fn path_for(&self, session_id: &str) -> Option<PathBuf> {
        if is_valid_session_id(session_id) {
            Some(self.dir.join(format!("{}.json", session_id)))
        } else {
            None
        }
    }

    async fn read(path: &Path) -> Result<Option<Vec<ChatMessage>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl HistoryStore for JsonFileHistoryStore {
    async fn load(&self, session_id: &str) -> Result<Option<Vec<ChatMessage>>> {
        match self.path_for(session_id) {
            Some(path) => Self::read(&path).await,
            None => Ok(None),
        }
    }

    async fn append(&self, session_id: &str, messages: &[ChatMessage]) -> Result<()> {
        let Some(path) = self.path_for(session_id) else {
            return Err(crate::Error::Session(format!(
                "invalid session id: {:?}",
                session_id
            )));
        };

        let _guard = self.write_lock.lock().await;
        let mut history = Self::read(&path).await?.unwrap_or_default();
        history.extend_from_slice(messages);

        // Write to a sibling temp file and rename so readers never see a torn file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&history)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        let Some(path) = self.path_for(session_id) else {
            return Ok(());
        };
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Identifiers made of `[A-Za-z0-9-_]` only
pub fn is_valid_session_id(session_id: &str) -> bool {
    !session_id.is_empty()
        && session_id.len() <= 128
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
