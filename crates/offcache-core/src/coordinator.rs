//! Update checks.
//!
//! One run of [`UpdateCoordinator::check_for_update`] resolves the manifest,
//! decides whether the generation for its version already exists, builds it
//! if not, and tells open sessions what happened. Failures are logged and
//! folded into the returned [`UpdateOutcome`]; they never propagate, because
//! a failed check just means whatever generation exists keeps serving.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::builder::GenerationBuilder;
use crate::error::{OfflineError, Result};
use crate::manifest::{Manifest, ManifestResolver};
use crate::notify::{Notifier, OfflineEvent};
use crate::registry::GenerationStore;
use crate::sessions::{entry_document, SessionSource, ROOT_ENTRY};

/// How an update check ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Manifest unavailable, most likely offline. Nothing changed.
    Offline,
    /// The generation for the manifest version exists and is the only one.
    UpToDate,
    /// The generation for the manifest version exists next to an older one.
    UpdatePending,
    /// The first generation was built.
    OfflineReady { version: String },
    /// A newer generation was built and awaits adoption.
    UpdateReady { version: String },
    /// Building the new generation failed; the previous one stays authoritative.
    BuildFailed,
    /// Storage or session lookup failed part way.
    Failed,
}

#[derive(Clone)]
pub struct UpdateCoordinator {
    resolver: ManifestResolver,
    store: GenerationStore,
    builder: GenerationBuilder,
    sessions: Arc<dyn SessionSource>,
    notifier: Notifier,
    scope: String,
}

impl UpdateCoordinator {
    pub fn new(
        resolver: ManifestResolver,
        store: GenerationStore,
        builder: GenerationBuilder,
        sessions: Arc<dyn SessionSource>,
        notifier: Notifier,
        scope: String,
    ) -> Self {
        Self {
            resolver,
            store,
            builder,
            sessions,
            notifier,
            scope,
        }
    }

    /// Check the manifest and build a new generation when its version is new.
    ///
    /// `is_first_run` is set for the install-time check: it announces
    /// `downloading` rather than `downloading-update`, and lets retrievals use
    /// the transport cache since nothing else is stored yet.
    pub async fn check_for_update(&self, is_first_run: bool) -> UpdateOutcome {
        let manifest = match self.resolver.resolve().await {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(error = %e, "Update check failed");
                return UpdateOutcome::Offline;
            }
        };

        match self.apply(manifest, is_first_run).await {
            Ok(outcome) => outcome,
            Err(OfflineError::BuildFailed(reason)) => {
                error!(reason = %reason, "Failed to build new generation");
                UpdateOutcome::BuildFailed
            }
            Err(e) => {
                warn!(error = %e, "Update check failed");
                UpdateOutcome::Failed
            }
        }
    }

    async fn apply(&self, manifest: Manifest, is_first_run: bool) -> Result<UpdateOutcome> {
        let Manifest { version, file_list } = manifest;
        let name = self.store.name_for(&version);

        // An existing generation was committed by a finished build, so it is complete
        if self.store.exists(&name).await? {
            return if self.store.is_update_pending().await? {
                info!(version = %version, "Update pending");
                self.notifier.emit(OfflineEvent::UpdatePending);
                Ok(UpdateOutcome::UpdatePending)
            } else {
                info!(version = %version, "Up to date");
                self.notifier.emit(OfflineEvent::UpToDate);
                Ok(UpdateOutcome::UpToDate)
            };
        }

        let sessions = self.sessions.sessions(true).await?;
        let entry = entry_document(&self.scope, &sessions);
        let file_list = generation_file_list(entry, file_list);
        info!(version = %version, files = file_list.len(), "Caching files for offline use");

        if is_first_run {
            self.notifier.emit(OfflineEvent::Downloading);
        } else {
            self.notifier.emit(OfflineEvent::DownloadingUpdate {
                version: version.clone(),
            });
        }

        self.builder.build(&name, &file_list, !is_first_run).await?;

        if self.store.is_update_pending().await? {
            info!(version = %version, "All resources saved, update ready");
            self.notifier.emit(OfflineEvent::UpdateReady {
                version: version.clone(),
            });
            Ok(UpdateOutcome::UpdateReady { version })
        } else {
            info!(version = %version, "All resources saved, offline support ready");
            self.notifier.emit(OfflineEvent::OfflineReady);
            Ok(UpdateOutcome::OfflineReady { version })
        }
    }
}

/// Entry document(s) first, then the manifest files, without duplicates.
pub fn generation_file_list(entry: Option<String>, manifest_files: Vec<String>) -> Vec<String> {
    let mut files = Vec::with_capacity(manifest_files.len() + 2);
    files.extend(entry);
    files.push(ROOT_ENTRY.to_string());
    files.extend(manifest_files);

    let mut seen = HashSet::new();
    files.retain(|f| seen.insert(f.clone()));
    files
}
