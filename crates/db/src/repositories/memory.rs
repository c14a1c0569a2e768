use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;

use super::{KeyValueStore, RepositoryError};

#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
    offline: AtomicBool,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every operation fails with `RepositoryError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), RepositoryError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("in-memory store is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        self.ensure_online()?;
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError> {
        self.ensure_online()?;
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.ensure_online()
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryKeyValueStore;
    use crate::repositories::{KeyValueStore, RepositoryError};

    #[tokio::test]
    async fn in_memory_store_round_trip() {
        let store = InMemoryKeyValueStore::new();
        store.set("messages:u1", "[]").await.expect("set");

        assert_eq!(store.get("messages:u1").await.expect("get").as_deref(), Some("[]"));
        assert_eq!(store.get("messages:u2").await.expect("get"), None);
    }

    #[tokio::test]
    async fn offline_store_rejects_calls() {
        let store = InMemoryKeyValueStore::new();
        store.set_offline(true);

        assert!(matches!(store.ping().await, Err(RepositoryError::Unavailable(_))));
        assert!(store.get("anything").await.is_err());

        store.set_offline(false);
        store.ping().await.expect("ping after recovery");
    }
}
