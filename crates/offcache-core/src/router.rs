//! Request routing.
//!
//! Each intercepted request is answered from a generation when possible and
//! from the network otherwise. Navigation requests are also the only point
//! where superseded generations get evicted, and only when no other open
//! session could still be relying on them.

use std::sync::Arc;

use futures::future::try_join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coordinator::{UpdateCoordinator, UpdateOutcome};
use crate::error::Result;
use crate::network::{FetchMode, Network, Request, Response};
use crate::registry::GenerationStore;
use crate::sessions::SessionSource;

/// Where a response came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServedFrom {
    Generation(String),
    Network,
}

/// Result of routing one request.
pub struct FetchOutcome {
    /// Only a failed network fallback is an error.
    pub response: Result<Response>,
    pub served_from: ServedFrom,
    /// Background update check started by a navigation. The host should keep
    /// the process alive until it finishes; the response does not wait for it.
    pub background: Option<JoinHandle<UpdateOutcome>>,
}

#[derive(Clone)]
pub struct RequestRouter {
    store: GenerationStore,
    sessions: Arc<dyn SessionSource>,
    network: Arc<dyn Network>,
    coordinator: UpdateCoordinator,
}

impl RequestRouter {
    pub fn new(
        store: GenerationStore,
        sessions: Arc<dyn SessionSource>,
        network: Arc<dyn Network>,
        coordinator: UpdateCoordinator,
    ) -> Self {
        Self {
            store,
            sessions,
            network,
            coordinator,
        }
    }

    pub async fn handle(&self, request: Request) -> FetchOutcome {
        let (response, served_from) = self.respond(&request).await;

        let background = if request.is_navigation() {
            let coordinator = self.coordinator.clone();
            Some(tokio::spawn(async move {
                coordinator.check_for_update(false).await
            }))
        } else {
            None
        };

        FetchOutcome {
            response,
            served_from,
            background,
        }
    }

    async fn respond(&self, request: &Request) -> (Result<Response>, ServedFrom) {
        let generation = match self.select_generation(request.is_navigation()).await {
            Ok(generation) => generation,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Generation lookup failed, using network");
                None
            }
        };

        // No generation yet means no offline support, not an error
        let Some(name) = generation else {
            return (self.from_network(request).await, ServedFrom::Network);
        };

        match self.store.storage().get(&name, lookup_key(&request.url)).await {
            Ok(Some(response)) => (Ok(response), ServedFrom::Generation(name)),
            Ok(None) => {
                debug!(url = %request.url, generation = %name, "Not in generation, using network");
                (self.from_network(request).await, ServedFrom::Network)
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Generation read failed, using network");
                (self.from_network(request).await, ServedFrom::Network)
            }
        }
    }

    /// Pick the generation that should answer, evicting superseded ones when safe.
    ///
    /// Sub-resource requests never evict: a page half way through loading
    /// must not get its remaining files from a different version.
    pub async fn select_generation(&self, is_navigation: bool) -> Result<Option<String>> {
        let mut generations = self.store.list_generations().await?;
        if generations.is_empty() {
            return Ok(None);
        }
        if generations.len() == 1 || !is_navigation {
            return Ok(Some(generations.swap_remove(0)));
        }

        let open_sessions = self.sessions.sessions(false).await?.len();
        if open_sessions > 1 {
            debug!(open_sessions, "Other sessions open, keeping current generation");
            return Ok(Some(generations.swap_remove(0)));
        }

        let Some(newest) = generations.pop() else {
            return Ok(None);
        };
        info!(generation = %newest, "Updating to new version");
        try_join_all(generations.iter().map(|old| self.store.delete(old))).await?;
        Ok(Some(newest))
    }

    async fn from_network(&self, request: &Request) -> Result<Response> {
        self.network.fetch(request, FetchMode::Default).await
    }
}

/// Stored entries are keyed without fragments.
fn lookup_key(url: &str) -> &str {
    url.split('#').next().unwrap_or(url)
}
