//! Agent session registry
//!
//! Maps client-presented session identifiers to conversation state. Lookup
//! goes memory first, then the history store, and mints a fresh session when
//! neither knows the identifier, so a stale or evicted id never fails a
//! request.

use crate::agent::types::{ChatMessage, SessionSummary};
use crate::session::store::HistoryStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Server-side state of one conversation
#[derive(Debug)]
pub struct AgentSession {
    /// Session ID
    pub id: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    history: RwLock<Vec<ChatMessage>>,
    last_active: RwLock<i64>,
}

impl AgentSession {
    fn new(id: String, history: Vec<ChatMessage>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let created_at = history.first().map_or(now, |m| m.timestamp);
        Self {
            id,
            created_at,
            history: RwLock::new(history),
            last_active: RwLock::new(now),
        }
    }

    /// Snapshot of the conversation so far
    pub async fn history(&self) -> Vec<ChatMessage> {
        self.history.read().await.clone()
    }

    pub async fn message_count(&self) -> usize {
        self.history.read().await.len()
    }

    /// Last activity timestamp (Unix ms)
    pub async fn last_active(&self) -> i64 {
        *self.last_active.read().await
    }

    /// Update last activity
    pub async fn touch(&self) {
        *self.last_active.write().await = chrono::Utc::now().timestamp_millis();
    }

    pub async fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            message_count: self.message_count().await,
            created_at: self.created_at,
            last_active: self.last_active().await,
        }
    }
}

/// Outcome of resolving a requested identifier
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub session: Arc<AgentSession>,
    /// True when the identifier was minted for this request
    pub is_new: bool,
}

/// Registry of live agent sessions
pub struct AgentSessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<AgentSession>>>>,
    store: Arc<dyn HistoryStore>,
}

impl AgentSessionRegistry {
    /// Create a registry persisting through `store`
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            store,
        }
    }

    /// Resolve a requested identifier, minting a new session when it is
    /// absent or unknown
    pub async fn resolve(&self, requested: Option<&str>) -> ResolvedSession {
        if let Some(id) = requested.map(str::trim).filter(|id| !id.is_empty()) {
            if let Some(session) = self.get(id).await {
                session.touch().await;
                tracing::debug!(session_id = %id, "Resumed agent session");
                return ResolvedSession {
                    session,
                    is_new: false,
                };
            }
            tracing::debug!(session_id = %id, "Unknown session id, minting a new one");
        }

        let session = Arc::new(AgentSession::new(Uuid::new_v4().to_string(), Vec::new()));
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());

        tracing::info!(session_id = %session.id, "Created agent session");

        ResolvedSession {
            session,
            is_new: true,
        }
    }

    /// Get a session by ID, loading it from the store if necessary
    pub async fn get(&self, session_id: &str) -> Option<Arc<AgentSession>> {
        if let Some(session) = self.sessions.read().await.get(session_id) {
            return Some(session.clone());
        }

        let history = match self.store.load(session_id).await {
            Ok(Some(history)) => history,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(session_id = %session_id, "Failed to load history: {}", e);
                return None;
            }
        };

        let mut sessions = self.sessions.write().await;
        // Another request may have restored it while we were reading
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AgentSession::new(session_id.to_string(), history)))
            .clone();
        drop(sessions);
        let messages = session.message_count().await;
        tracing::info!(session_id = %session_id, messages, "Restored agent session from store");
        Some(session)
    }

    /// Summaries of live sessions, most recently active first
    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions: Vec<Arc<AgentSession>> =
            self.sessions.read().await.values().cloned().collect();

        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions {
            summaries.push(session.summary().await);
        }
        summaries.sort_by(|a, b| b.last_active.cmp(&a.last_active).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    /// Append a completed exchange to a session's history.
    ///
    /// Sessions removed or evicted while the exchange ran stay gone; the
    /// exchange is discarded. Store failures are logged; the in-memory
    /// history is still updated.
    pub async fn record_exchange(&self, session_id: &str, messages: Vec<ChatMessage>) {
        // Held across the store write so remove/evict cannot interleave
        let sessions = self.sessions.read().await;
        let Some(session) = sessions.get(session_id) else {
            tracing::debug!(session_id = %session_id, "Session gone; discarding exchange");
            return;
        };
        session.history.write().await.extend(messages.iter().cloned());
        session.touch().await;

        if let Err(e) = self.store.append(session_id, &messages).await {
            tracing::warn!(session_id = %session_id, "Failed to persist exchange: {}", e);
        }
    }

    /// Remove a session from memory and store; returns whether it existed
    pub async fn remove(&self, session_id: &str) -> bool {
        let in_memory = self.sessions.write().await.remove(session_id).is_some();
        let in_store = matches!(self.store.load(session_id).await, Ok(Some(_)));

        if let Err(e) = self.store.remove(session_id).await {
            tracing::warn!(session_id = %session_id, "Failed to remove history: {}", e);
        }

        let existed = in_memory || in_store;
        if existed {
            tracing::info!(session_id = %session_id, "Removed agent session");
        }
        existed
    }

    /// Evict sessions idle for longer than `max_idle`
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = chrono::Utc::now().timestamp_millis();
        let max_idle_ms = i64::try_from(max_idle.as_millis()).unwrap_or(i64::MAX);
        let sessions: Vec<Arc<AgentSession>> =
            self.sessions.read().await.values().cloned().collect();

        let mut evicted = 0;
        for session in sessions {
            if now - session.last_active().await > max_idle_ms {
                self.sessions.write().await.remove(&session.id);
                if let Err(e) = self.store.remove(&session.id).await {
                    tracing::warn!(session_id = %session.id, "Failed to remove history: {}", e);
                }
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::info!("Evicted {} idle agent sessions", evicted);
        }
        evicted
    }

    /// Run [`evict_idle`](Self::evict_idle) every `interval`
    pub fn spawn_sweeper(
        self: Arc<Self>,
        max_idle: Duration,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.evict_idle(max_idle).await;
            }
        })
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::session::store::MemoryHistoryStore;
    use async_trait::async_trait;

    fn registry() -> (AgentSessionRegistry, Arc<MemoryHistoryStore>) {
        let store = Arc::new(MemoryHistoryStore::new());
        (AgentSessionRegistry::new(store.clone()), store)
    }

    struct FailingStore;

    #[async_trait]
    impl HistoryStore for FailingStore {
        async fn load(&self, _session_id: &str) -> Result<Option<Vec<ChatMessage>>> {
            Err(Error::Session("store offline".to_string()))
        }

        async fn append(&self, _session_id: &str, _messages: &[ChatMessage]) -> Result<()> {
            Err(Error::Session("store offline".to_string()))
        }

        async fn remove(&self, _session_id: &str) -> Result<()> {
            Err(Error::Session("store offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_resolve_without_id_mints() {
        let (registry, _) = registry();
        let resolved = registry.resolve(None).await;
        assert!(resolved.is_new);
        assert!(Uuid::parse_str(&resolved.session.id).is_ok());
        assert_eq!(registry.session_count().await, 1);

        let blank = registry.resolve(Some("  ")).await;
        assert!(blank.is_new);
        assert_ne!(blank.session.id, resolved.session.id);
    }

    #[tokio::test]
    async fn test_resolve_known_id_resumes() {
        let (registry, _) = registry();
        let first = registry.resolve(None).await;
        let again = registry.resolve(Some(first.session.id.as_str())).await;
        assert!(!again.is_new);
        assert!(Arc::ptr_eq(&first.session, &again.session));
        assert_eq!(registry.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_resolve_unknown_id_mints_fresh() {
        let (registry, _) = registry();
        let resolved = registry.resolve(Some("never-issued")).await;
        assert!(resolved.is_new);
        assert_ne!(resolved.session.id, "never-issued");
    }

    #[tokio::test]
    async fn test_resolve_restores_from_store() {
        let (registry, store) = registry();
        store
            .append("persisted", &[ChatMessage::user("from before")])
            .await
            .unwrap();

        let resolved = registry.resolve(Some("persisted")).await;
        assert!(!resolved.is_new);
        assert_eq!(resolved.session.id, "persisted");
        let history = resolved.session.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "from before");
    }

    #[tokio::test]
    async fn test_record_exchange_updates_memory_and_store() {
        let (registry, store) = registry();
        let resolved = registry.resolve(None).await;
        let id = resolved.session.id.clone();

        registry
            .record_exchange(&id, vec![ChatMessage::user("q"), ChatMessage::user("a")])
            .await;

        assert_eq!(resolved.session.message_count().await, 2);
        assert_eq!(store.load(&id).await.unwrap().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_record_after_remove_does_not_resurrect() {
        let (registry, store) = registry();
        let id = registry.resolve(None).await.session.id.clone();
        assert!(registry.remove(&id).await);

        registry
            .record_exchange(&id, vec![ChatMessage::user("late"), ChatMessage::user("reply")])
            .await;

        assert!(store.load(&id).await.unwrap().is_none());
        assert!(registry.get(&id).await.is_none());
        assert!(registry.resolve(Some(id.as_str())).await.is_new);
    }

    #[tokio::test]
    async fn test_store_failures_do_not_escape() {
        let registry = AgentSessionRegistry::new(Arc::new(FailingStore));
        let resolved = registry.resolve(Some("anything")).await;
        assert!(resolved.is_new);

        registry
            .record_exchange(&resolved.session.id, vec![ChatMessage::user("q")])
            .await;
        assert_eq!(resolved.session.message_count().await, 1);
    }

    #[tokio::test]
    async fn test_list_and_remove() {
        let (registry, _) = registry();
        let a = registry.resolve(None).await.session.id.clone();
        let b = registry.resolve(None).await.session.id.clone();

        let listed: Vec<String> = registry.list().await.into_iter().map(|s| s.id).collect();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&a) && listed.contains(&b));

        assert!(registry.remove(&a).await);
        assert!(!registry.remove(&a).await);
        assert!(registry.get(&a).await.is_none());
        assert_eq!(registry.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_evict_idle() {
        let (registry, store) = registry();
        let id = registry.resolve(None).await.session.id.clone();
        registry
            .record_exchange(&id, vec![ChatMessage::user("q")])
            .await;

        assert_eq!(registry.evict_idle(Duration::from_secs(3600)).await, 0);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(registry.evict_idle(Duration::from_millis(5)).await, 1);
        assert_eq!(registry.session_count().await, 0);
        assert!(store.load(&id).await.unwrap().is_none());

        let resolved = registry.resolve(Some(id.as_str())).await;
        assert!(resolved.is_new);
    }

    #[tokio::test]
    async fn test_sweeper_evicts() {
        let (registry, _) = registry();
        let registry = Arc::new(registry);
        registry.resolve(None).await;

        let handle = registry
            .clone()
            .spawn_sweeper(Duration::from_millis(1), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(registry.session_count().await, 0);
    }
}
