//! In-memory store — useful for testing and ephemeral sessions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sagechat_core::error::StoreError;
use sagechat_core::message::Message;
use sagechat_core::store::LogStore;
use tokio::sync::RwLock;

/// Keeps snapshots in a map keyed by session.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    sessions: Arc<RwLock<HashMap<String, Vec<Message>>>>,
    saves: Arc<std::sync::atomic::AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl LogStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, session: &str) -> Result<Option<Vec<Message>>, StoreError> {
        Ok(self.sessions.read().await.get(session).cloned())
    }

    async fn save(&self, session: &str, messages: &[Message]) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.to_string(), messages.to_vec());
        self.saves.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self, session: &str) -> Result<(), StoreError> {
        self.sessions.write().await.remove(session);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sagechat_core::message::ConversationLog;

    #[tokio::test]
    async fn save_load_clear() {
        let store = InMemoryStore::new();
        let mut log = ConversationLog::new();
        log.push_user("hello");

        assert!(store.load("s").await.unwrap().is_none());
        store.save("s", log.messages()).await.unwrap();
        assert_eq!(store.load("s").await.unwrap().unwrap().len(), 1);
        assert_eq!(store.save_count(), 1);

        store.clear("s").await.unwrap();
        assert!(store.load("s").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let store = InMemoryStore::new();
        let observer = store.clone();
        store.save("s", &[]).await.unwrap();
        assert!(observer.load("s").await.unwrap().is_some());
    }
}
