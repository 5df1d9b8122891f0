use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{PendingCollection, Storage};
use crate::error::{OfflineError, Result};
use crate::network::Response;

#[derive(Debug)]
struct Collection {
    name: String,
    sequence: u64,
    entries: HashMap<String, Response>,
}

#[derive(Debug)]
struct PendingWrite {
    name: String,
    entries: HashMap<String, Response>,
}

#[derive(Debug, Default)]
struct Inner {
    committed: Vec<Collection>,
    pending: HashMap<u64, PendingWrite>,
    next_sequence: u64,
    next_pending_id: u64,
}

impl Inner {
    fn committed(&self, name: &str) -> Option<&Collection> {
        self.committed.iter().find(|c| c.name == name)
    }
}

fn no_pending(pending: &PendingCollection) -> OfflineError {
    OfflineError::Storage(format!("no pending collection: {}", pending.name()))
}

/// Process-local storage. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in the committed collection `name`.
    pub async fn entry_count(&self, name: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.committed(name).map_or(0, |c| c.entries.len())
    }

    /// Number of pending writes for `name`.
    pub async fn pending_count(&self, name: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.pending.values().filter(|p| p.name == name).count()
    }

    /// Whether anything, committed or pending, carries `name`.
    pub async fn has_any(&self, name: &str) -> bool {
        let inner = self.inner.lock().await;
        inner.committed(name).is_some() || inner.pending.values().any(|p| p.name == name)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn collection_names(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        let mut committed: Vec<&Collection> = inner.committed.iter().collect();
        committed.sort_by_key(|c| c.sequence);
        Ok(committed.into_iter().map(|c| c.name.clone()).collect())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.inner.lock().await.committed(name).is_some())
    }

    async fn open(&self, name: &str) -> Result<PendingCollection> {
        let mut inner = self.inner.lock().await;
        if inner.committed(name).is_some() {
            return Err(OfflineError::Storage(format!("collection already exists: {}", name)));
        }
        let id = inner.next_pending_id;
        inner.next_pending_id += 1;
        inner.pending.insert(
            id,
            PendingWrite {
                name: name.to_string(),
                entries: HashMap::new(),
            },
        );
        Ok(PendingCollection::new(name, id))
    }

    async fn put(&self, pending: &PendingCollection, key: &str, response: Response) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let write = inner
            .pending
            .get_mut(&pending.id())
            .ok_or_else(|| no_pending(pending))?;
        write.entries.insert(key.to_string(), response);
        Ok(())
    }

    async fn commit(&self, pending: &PendingCollection) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.pending.contains_key(&pending.id()) {
            return Err(no_pending(pending));
        }
        if inner.committed(pending.name()).is_some() {
            return Err(OfflineError::Storage(format!(
                "collection already exists: {}",
                pending.name()
            )));
        }
        let write = inner
            .pending
            .remove(&pending.id())
            .ok_or_else(|| no_pending(pending))?;
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.committed.push(Collection {
            name: write.name,
            sequence,
            entries: write.entries,
        });
        Ok(())
    }

    async fn get(&self, name: &str, key: &str) -> Result<Option<Response>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .committed(name)
            .and_then(|c| c.entries.get(key))
            .cloned())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.committed.len();
        inner.committed.retain(|c| c.name != name);
        Ok(inner.committed.len() != before)
    }

    async fn discard(&self, pending: &PendingCollection) -> Result<()> {
        self.inner.lock().await.pending.remove(&pending.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn committed_with(storage: &MemoryStorage, name: &str, keys: &[&str]) {
        let pending = storage.open(name).await.unwrap();
        for key in keys {
            storage.put(&pending, key, Response::new(200, *key)).await.unwrap();
        }
        storage.commit(&pending).await.unwrap();
    }

    #[tokio::test]
    async fn test_pending_collection_is_invisible() {
        let storage = MemoryStorage::new();
        let pending = storage.open("gen-v1").await.unwrap();
        storage.put(&pending, "a", Response::new(200, "a")).await.unwrap();

        assert!(!storage.has("gen-v1").await.unwrap());
        assert!(storage.collection_names().await.unwrap().is_empty());
        assert_eq!(storage.get("gen-v1", "a").await.unwrap(), None);

        storage.commit(&pending).await.unwrap();
        assert!(storage.has("gen-v1").await.unwrap());
        assert_eq!(storage.get("gen-v1", "a").await.unwrap().unwrap().body, b"a");
    }

    #[tokio::test]
    async fn test_names_follow_commit_order() {
        let storage = MemoryStorage::new();
        let v9 = storage.open("gen-v9").await.unwrap();
        committed_with(&storage, "gen-v2", &["a"]).await;
        storage.commit(&v9).await.unwrap();
        committed_with(&storage, "gen-v1", &["a"]).await;

        assert_eq!(
            storage.collection_names().await.unwrap(),
            vec!["gen-v2", "gen-v9", "gen-v1"]
        );
    }

    #[tokio::test]
    async fn test_open_rejects_committed_name() {
        let storage = MemoryStorage::new();
        committed_with(&storage, "gen-v1", &["a"]).await;
        assert!(matches!(storage.open("gen-v1").await, Err(OfflineError::Storage(_))));
    }

    #[tokio::test]
    async fn test_pending_writes_for_one_name_stay_separate() {
        let storage = MemoryStorage::new();
        let first = storage.open("gen-v1").await.unwrap();
        storage.put(&first, "a", Response::new(200, "a")).await.unwrap();

        let second = storage.open("gen-v1").await.unwrap();
        storage.put(&second, "x", Response::new(200, "x")).await.unwrap();
        storage.put(&first, "b", Response::new(200, "b")).await.unwrap();
        storage.commit(&first).await.unwrap();

        assert_eq!(storage.entry_count("gen-v1").await, 2);
        assert!(storage.get("gen-v1", "a").await.unwrap().is_some());
        assert_eq!(storage.get("gen-v1", "x").await.unwrap(), None);

        // The later writer loses and cannot replace the winner
        assert!(storage.commit(&second).await.is_err());
        storage.discard(&second).await.unwrap();
        assert_eq!(storage.entry_count("gen-v1").await, 2);
        assert_eq!(storage.pending_count("gen-v1").await, 0);
    }

    #[tokio::test]
    async fn test_put_after_commit_fails() {
        let storage = MemoryStorage::new();
        let pending = storage.open("gen-v1").await.unwrap();
        storage.commit(&pending).await.unwrap();
        assert!(storage.put(&pending, "b", Response::new(200, "b")).await.is_err());
        assert!(storage.commit(&pending).await.is_err());
    }

    #[tokio::test]
    async fn test_discard_leaves_committed_alone() {
        let storage = MemoryStorage::new();
        let pending = storage.open("gen-v1").await.unwrap();
        storage.commit(&pending).await.unwrap();
        storage.discard(&pending).await.unwrap();
        assert!(storage.has("gen-v1").await.unwrap());

        let pending = storage.open("gen-v2").await.unwrap();
        storage.discard(&pending).await.unwrap();
        assert!(!storage.has_any("gen-v2").await);
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = MemoryStorage::new();
        committed_with(&storage, "gen-v1", &["a"]).await;
        assert!(storage.delete("gen-v1").await.unwrap());
        assert!(!storage.delete("gen-v1").await.unwrap());
        assert!(!storage.has("gen-v1").await.unwrap());
    }
}
