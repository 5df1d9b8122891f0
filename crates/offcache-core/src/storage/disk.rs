//! Directory-backed storage.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<hash of name>/generation.json           commit marker
//! <root>/<hash of name>/entries/<hash of key>.json
//! <root>/.pending/<hash of name>-<write id>/      one per open write
//! ```
//!
//! Names and keys are URLs of any length, so files are named by their
//! SHA-256 and each entry file carries its key. A write is built in its own
//! pending directory and moved into place by a single rename on commit.
//! Directory listings carry no order, so the commit sequence number lives in
//! `generation.json` and listing sorts by it.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{PendingCollection, Storage};
use crate::error::{OfflineError, Result};
use crate::network::Response;

/// Marker written when a collection is committed
const META_FILE: &str = "generation.json";

/// Subdirectory holding one JSON file per entry
const ENTRIES_DIR: &str = "entries";

/// Directory holding in-progress writes
const PENDING_DIR: &str = ".pending";

/// Pending writes older than this are leftovers of a crashed process
const STALE_PENDING_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionMeta {
    name: String,
    sequence: u64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    response: Response,
}

fn hashed(value: &str) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

fn no_pending(pending: &PendingCollection) -> OfflineError {
    OfflineError::Storage(format!("no pending collection: {}", pending.name()))
}

pub struct DiskStorage {
    root: PathBuf,
    /// Serializes commits so sequence numbers stay unique within a process.
    commit_lock: Mutex<()>,
}

impl DiskStorage {
    /// Open (creating if needed) a storage directory, clearing out pending
    /// writes old enough to be crash leftovers.
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(root.join(PENDING_DIR))?;
        let storage = Self {
            root,
            commit_lock: Mutex::new(()),
        };
        let purged = storage.purge_pending(STALE_PENDING_AGE)?;
        if purged > 0 {
            debug!(count = purged, "Removed stale pending writes");
        }
        Ok(storage)
    }

    /// Remove pending writes last touched at least `older_than` ago.
    /// Returns how many were removed.
    pub fn purge_pending(&self, older_than: Duration) -> Result<usize> {
        let mut purged = 0;
        for dir_entry in std::fs::read_dir(self.root.join(PENDING_DIR))? {
            let dir_entry = dir_entry?;
            let modified = dir_entry.metadata()?.modified()?;
            let age = SystemTime::now()
                .duration_since(modified)
                .unwrap_or_default();
            if age >= older_than {
                std::fs::remove_dir_all(dir_entry.path())?;
                purged += 1;
            }
        }
        Ok(purged)
    }

    fn collection_dir(&self, name: &str) -> PathBuf {
        self.root.join(hashed(name))
    }

    fn pending_dir(&self, pending: &PendingCollection) -> PathBuf {
        self.root
            .join(PENDING_DIR)
            .join(format!("{}-{:016x}", hashed(pending.name()), pending.id()))
    }

    fn is_committed(&self, name: &str) -> bool {
        self.collection_dir(name).join(META_FILE).exists()
    }

    /// Read the commit markers of every committed collection.
    fn read_metas(&self) -> Result<Vec<CollectionMeta>> {
        let mut metas = Vec::new();
        for dir_entry in std::fs::read_dir(&self.root)? {
            let path = dir_entry?.path().join(META_FILE);
            if !path.exists() {
                continue;
            }
            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<CollectionMeta>(&contents) {
                Ok(meta) => metas.push(meta),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable generation marker");
                }
            }
        }
        metas.sort_by(|a, b| {
            a.sequence
                .cmp(&b.sequence)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(metas)
    }
}

#[async_trait]
impl Storage for DiskStorage {
    async fn collection_names(&self) -> Result<Vec<String>> {
        Ok(self.read_metas()?.into_iter().map(|m| m.name).collect())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.is_committed(name))
    }

    async fn open(&self, name: &str) -> Result<PendingCollection> {
        if self.is_committed(name) {
            return Err(OfflineError::Storage(format!("collection already exists: {}", name)));
        }
        let pending = PendingCollection::new(name, rand::random());
        std::fs::create_dir_all(self.pending_dir(&pending).join(ENTRIES_DIR))?;
        Ok(pending)
    }

    async fn put(&self, pending: &PendingCollection, key: &str, response: Response) -> Result<()> {
        let dir = self.pending_dir(pending);
        if !dir.exists() {
            return Err(no_pending(pending));
        }
        let entry = StoredEntry {
            key: key.to_string(),
            response,
        };
        let path = dir.join(ENTRIES_DIR).join(format!("{}.json", hashed(key)));
        std::fs::write(path, serde_json::to_vec(&entry)?)?;
        Ok(())
    }

    async fn commit(&self, pending: &PendingCollection) -> Result<()> {
        let _guard = self.commit_lock.lock().await;
        let dir = self.pending_dir(pending);
        if !dir.exists() {
            return Err(no_pending(pending));
        }
        if self.is_committed(pending.name()) {
            return Err(OfflineError::Storage(format!(
                "collection already exists: {}",
                pending.name()
            )));
        }
        let sequence = self
            .read_metas()?
            .iter()
            .map(|m| m.sequence + 1)
            .max()
            .unwrap_or(0);
        let meta = CollectionMeta {
            name: pending.name().to_string(),
            sequence,
            created_at: Utc::now(),
        };

        std::fs::write(dir.join(META_FILE), serde_json::to_string_pretty(&meta)?)?;
        // The rename is the commit point; it fails if the name was taken
        std::fs::rename(&dir, self.collection_dir(pending.name()))?;
        Ok(())
    }

    async fn get(&self, name: &str, key: &str) -> Result<Option<Response>> {
        if !self.is_committed(name) {
            return Ok(None);
        }
        let path = self
            .collection_dir(name)
            .join(ENTRIES_DIR)
            .join(format!("{}.json", hashed(key)));
        if !path.exists() {
            return Ok(None);
        }
        let entry: StoredEntry = serde_json::from_slice(&std::fs::read(&path)?)?;
        if entry.key != key {
            warn!(collection = name, key, stored = %entry.key, "Entry file holds a different key");
            return Ok(None);
        }
        Ok(Some(entry.response))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        if !self.is_committed(name) {
            return Ok(false);
        }
        std::fs::remove_dir_all(self.collection_dir(name))?;
        Ok(true)
    }

    async fn discard(&self, pending: &PendingCollection) -> Result<()> {
        let dir = self.pending_dir(pending);
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}
