//! Versioned offline generations for web applications.
//!
//! An application's resources are kept in one or more locally stored
//! *generations*, each built atomically from an update manifest. Requests are
//! routed to the right generation, newer generations are downloaded in the
//! background, and old ones are evicted once no other open session could
//! still depend on them.
//!
//! Modules, leaf first:
//! - `manifest`: fetch and parse the update manifest
//! - `registry`: list, name and order the stored generations
//! - `builder`: all-or-nothing generation builds
//! - `coordinator`: update checks and lifecycle notifications
//! - `router`: per-request generation selection and eviction
//! - `notify`: delayed fire-and-forget session notifications
//! - `worker`: host-facing entry points wiring everything together
//!
//! Host capabilities are traits: [`network::Network`], [`storage::Storage`],
//! [`sessions::SessionSource`] and [`notify::MessageSink`].

pub mod builder;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod manifest;
pub mod network;
pub mod notify;
pub mod registry;
pub mod router;
pub mod sessions;
pub mod storage;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use coordinator::{UpdateCoordinator, UpdateOutcome};
pub use error::{OfflineError, Result};
pub use network::{HttpNetwork, Request, Response};
pub use notify::{BroadcastSink, OfflineEvent};
pub use registry::GenerationStore;
pub use router::{FetchOutcome, ServedFrom};
pub use sessions::{Session, StaticSessions};
pub use storage::{DiskStorage, MemoryStorage};
pub use worker::{OfflineWorker, WorkerContext, WorkerSettings};
