//! Registry of the generations held in storage for one scope.
//!
//! Nothing is cached in memory: every call reads storage afresh, so
//! concurrent handlers never act on a stale view of which generations exist.
//!
//! Generations are named `<prefix>-<scope>-v<version>`. The registry returns
//! them oldest first, relying on the storage backend's ordering contract.

use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::storage::Storage;

#[derive(Clone)]
pub struct GenerationStore {
    storage: Arc<dyn Storage>,
    base_name: String,
}

impl GenerationStore {
    pub fn new(storage: Arc<dyn Storage>, prefix: &str, scope: &str) -> Self {
        Self {
            storage,
            base_name: format!("{}-{}", prefix, scope),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Deterministic storage name for a manifest version.
    pub fn name_for(&self, version: &str) -> String {
        format!("{}-v{}", self.base_name, version)
    }

    /// Version token of a generation name produced by [`Self::name_for`].
    pub fn version_of<'a>(&self, name: &'a str) -> Option<&'a str> {
        name.strip_prefix(self.base_name.as_str())
            .and_then(|rest| rest.strip_prefix("-v"))
    }

    fn owns(&self, name: &str) -> bool {
        self.version_of(name).is_some()
    }

    /// All generations for this scope, oldest first.
    pub async fn list_generations(&self) -> Result<Vec<String>> {
        let names = self.storage.collection_names().await?;
        Ok(names.into_iter().filter(|n| self.owns(n)).collect())
    }

    /// A newer generation is waiting alongside the one in use.
    pub async fn is_update_pending(&self) -> Result<bool> {
        Ok(self.list_generations().await?.len() >= 2)
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        self.storage.has(name).await
    }

    pub async fn delete(&self, name: &str) -> Result<bool> {
        let deleted = self.storage.delete(name).await?;
        if deleted {
            info!(generation = name, "Deleted generation");
        }
        Ok(deleted)
    }
}
