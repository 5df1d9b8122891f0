//! All-or-nothing generation builds.
//!
//! Every file is retrieved first, concurrently. Storage is only touched
//! once all of them came back with a success status; if writing fails part
//! way, the pending collection is discarded. A generation therefore either
//! exists with every file of its list, or does not exist at all.

use std::sync::Arc;

use futures::future::try_join_all;
use reqwest::Url;
use tracing::{error, info, warn};

use crate::error::{OfflineError, Result};
use crate::network::{fetch_with_bypass, resolve_url, Network, Request, Response};
use crate::storage::{PendingCollection, Storage};

#[derive(Clone)]
pub struct GenerationBuilder {
    network: Arc<dyn Network>,
    storage: Arc<dyn Storage>,
    scope: Url,
}

impl GenerationBuilder {
    pub fn new(network: Arc<dyn Network>, storage: Arc<dyn Storage>, scope: Url) -> Self {
        Self {
            network,
            storage,
            scope,
        }
    }

    /// Fetch every entry of `file_list` and persist them as generation `name`.
    ///
    /// With `bypass_cache` set, each retrieval carries a random query token and
    /// asks for a no-store fetch, so unchanged file names shared between
    /// versions are not answered from a stale intermediate cache.
    pub async fn build(&self, name: &str, file_list: &[String], bypass_cache: bool) -> Result<()> {
        let keys = file_list
            .iter()
            .map(|entry| resolve_url(&self.scope, entry))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| OfflineError::BuildFailed(e.to_string()))?;

        let network = self.network.as_ref();
        let retrievals = keys.iter().map(|key| async move {
            let request = Request::get(key.as_str());
            fetch_with_bypass(network, &request, bypass_cache).await
        });
        let responses = try_join_all(retrievals)
            .await
            .map_err(|e| OfflineError::BuildFailed(format!("retrieval failed: {}", e)))?;

        let mut failures = 0;
        for (key, response) in keys.iter().zip(&responses) {
            if !response.is_success() {
                failures += 1;
                error!(
                    url = %key,
                    status = response.status,
                    status_text = %response.status_text,
                    "Error fetching resource"
                );
            }
        }
        if failures > 0 {
            return Err(OfflineError::BuildFailed(format!(
                "{} of {} resources were not fetched successfully",
                failures,
                keys.len()
            )));
        }

        if let Err(e) = self.persist(name, &keys, responses).await {
            error!(generation = name, error = %e, "Error writing generation entries");
            return Err(OfflineError::BuildFailed(e.to_string()));
        }

        info!(generation = name, files = keys.len(), "Generation built");
        Ok(())
    }

    /// Write one pending collection and commit it, discarding it on failure.
    async fn persist(&self, name: &str, keys: &[String], responses: Vec<Response>) -> Result<()> {
        let pending = self.storage.open(name).await?;
        if let Err(e) = self.write(&pending, keys, responses).await {
            if let Err(discard_err) = self.storage.discard(&pending).await {
                warn!(generation = name, error = %discard_err, "Failed to discard partial generation");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn write(
        &self,
        pending: &PendingCollection,
        keys: &[String],
        responses: Vec<Response>,
    ) -> Result<()> {
        for (key, response) in keys.iter().zip(responses) {
            self.storage.put(pending, key, response).await?;
        }
        self.storage.commit(pending).await
    }
}
