//! Durable keyed storage capability.
//!
//! Storage holds named collections of (request key -> response) entries.
//! A collection is written in two phases: [`Storage::open`] starts a pending
//! write and hands back a [`PendingCollection`], entries are added with
//! [`Storage::put`], and [`Storage::commit`] makes it visible under its name.
//! Pending collections are never listed, never reported by [`Storage::has`]
//! and never served from, so a crash in the middle of a write cannot leave a
//! half-populated collection that looks ready.
//!
//! Every `open` starts a separate write. Two writers opening the same name
//! each fill their own pending collection; the first to commit wins and the
//! other's commit fails without touching the winner.
//!
//! Backends must list committed collections in commit order, oldest first.

pub mod disk;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::network::Response;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

/// Handle to one pending write, returned by [`Storage::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCollection {
    name: String,
    id: u64,
}

impl PendingCollection {
    /// Backends pick `id` so that it is unique among their open writes.
    pub fn new(name: &str, id: u64) -> Self {
        Self {
            name: name.to_string(),
            id,
        }
    }

    /// Name the collection will be committed under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Names of all committed collections, oldest first.
    async fn collection_names(&self) -> Result<Vec<String>>;

    /// Whether a committed collection called `name` exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Start a new pending write for `name`. Fails if a committed collection
    /// already has that name.
    async fn open(&self, name: &str) -> Result<PendingCollection>;

    /// Add an entry to a pending write.
    async fn put(&self, pending: &PendingCollection, key: &str, response: Response) -> Result<()>;

    /// Make a pending write visible. Fails, leaving the pending write in
    /// place, if a collection with the same name was committed meanwhile.
    async fn commit(&self, pending: &PendingCollection) -> Result<()>;

    /// Look up an entry in a committed collection.
    async fn get(&self, name: &str, key: &str) -> Result<Option<Response>>;

    /// Delete a committed collection. Returns false if there was none.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Throw away a pending write. Committed collections are left alone.
    async fn discard(&self, pending: &PendingCollection) -> Result<()>;
}
