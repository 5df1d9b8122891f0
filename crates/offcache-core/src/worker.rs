//! Host-facing entry points.
//!
//! The host owns request interception and process lifetime. It builds one
//! [`OfflineWorker`] from a [`WorkerContext`] of capabilities, awaits
//! [`OfflineWorker::install`] before routing anything, and passes every
//! intercepted request to [`OfflineWorker::handle_fetch`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tracing::info;

use crate::builder::GenerationBuilder;
use crate::coordinator::{UpdateCoordinator, UpdateOutcome};
use crate::error::{OfflineError, Result};
use crate::manifest::ManifestResolver;
use crate::network::{Network, Request};
use crate::notify::{MessageSink, Notifier, DEFAULT_NOTIFY_DELAY};
use crate::registry::GenerationStore;
use crate::router::{FetchOutcome, RequestRouter};
use crate::sessions::SessionSource;
use crate::storage::Storage;

/// Prefix of every generation name.
pub const DEFAULT_CACHE_PREFIX: &str = "offcache";

/// Manifest location, relative to the scope.
pub const DEFAULT_MANIFEST_FILE: &str = "offline.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Absolute URL all requests and generations are namespaced under.
    pub scope: String,
    pub cache_prefix: String,
    pub manifest_file: String,
    pub notify_delay: Duration,
}

impl WorkerSettings {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            notify_delay: DEFAULT_NOTIFY_DELAY,
        }
    }
}

/// Capabilities supplied by the host.
pub struct WorkerContext {
    pub network: Arc<dyn Network>,
    pub storage: Arc<dyn Storage>,
    pub sessions: Arc<dyn SessionSource>,
    /// None when the host has no way to message sessions.
    pub sink: Option<Arc<dyn MessageSink>>,
}

#[derive(Clone)]
pub struct OfflineWorker {
    store: GenerationStore,
    coordinator: UpdateCoordinator,
    router: RequestRouter,
}

impl OfflineWorker {
    pub fn new(settings: &WorkerSettings, context: WorkerContext) -> Result<Self> {
        let scope = Url::parse(&settings.scope)
            .map_err(|e| OfflineError::InvalidUrl(format!("{}: {}", settings.scope, e)))?;
        let scope_name = scope.to_string();

        let store = GenerationStore::new(context.storage.clone(), &settings.cache_prefix, &scope_name);
        let resolver = ManifestResolver::new(context.network.clone(), &scope, &settings.manifest_file)?;
        let builder = GenerationBuilder::new(context.network.clone(), context.storage, scope);
        let notifier = match context.sink {
            Some(sink) => Notifier::new(sink, settings.notify_delay),
            None => Notifier::disabled(),
        };

        let coordinator = UpdateCoordinator::new(
            resolver,
            store.clone(),
            builder,
            context.sessions.clone(),
            notifier,
            scope_name,
        );
        let router = RequestRouter::new(
            store.clone(),
            context.sessions,
            context.network,
            coordinator.clone(),
        );

        Ok(Self {
            store,
            coordinator,
            router,
        })
    }

    /// First update check. Requests should not be routed until this returns.
    pub async fn install(&self) -> UpdateOutcome {
        info!("Installing offline support");
        self.coordinator.check_for_update(true).await
    }

    pub async fn handle_fetch(&self, request: Request) -> FetchOutcome {
        self.router.handle(request).await
    }

    pub fn generations(&self) -> &GenerationStore {
        &self.store
    }

    pub fn coordinator(&self) -> &UpdateCoordinator {
        &self.coordinator
    }

    pub fn router(&self) -> &RequestRouter {
        &self.router
    }
}
