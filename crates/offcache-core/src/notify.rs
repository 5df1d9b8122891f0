//! Lifecycle notifications for open UI sessions.
//!
//! Delivery is fire-and-forget. Every event is posted from its own spawned
//! task after a fixed delay, giving a freshly loaded page time to attach its
//! listener. Nothing is acknowledged or retried; with no listener attached
//! the event is simply lost.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Delay between the decision to notify and the actual post.
pub const DEFAULT_NOTIFY_DELAY: Duration = Duration::from_secs(3);

/// Capacity of the broadcast buffer before slow listeners start lagging.
const BROADCAST_CAPACITY: usize = 16;

/// Serialized as `{"type": "update-ready", "version": "2"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OfflineEvent {
    /// First generation is being downloaded.
    Downloading,
    /// A newer generation is being downloaded.
    DownloadingUpdate { version: String },
    /// A newer generation is ready but not adopted yet.
    UpdatePending,
    UpToDate,
    /// Download of a newer generation finished; reload to use it.
    UpdateReady { version: String },
    /// First generation finished; the app now works offline.
    OfflineReady,
}

impl OfflineEvent {
    pub fn version(&self) -> Option<&str> {
        match self {
            OfflineEvent::DownloadingUpdate { version } | OfflineEvent::UpdateReady { version } => {
                Some(version)
            }
            _ => None,
        }
    }
}

/// Message delivery to open sessions.
pub trait MessageSink: Send + Sync {
    fn post(&self, event: &OfflineEvent);
}

/// In-process pub/sub over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<OfflineEvent>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OfflineEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageSink for BroadcastSink {
    fn post(&self, event: &OfflineEvent) {
        if self.sender.send(event.clone()).is_err() {
            debug!(event = ?event, "No listener attached, notification dropped");
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    sink: Option<Arc<dyn MessageSink>>,
    delay: Duration,
}

impl Notifier {
    pub fn new(sink: Arc<dyn MessageSink>, delay: Duration) -> Self {
        Self {
            sink: Some(sink),
            delay,
        }
    }

    /// Notifier for hosts without a message transport. Every event is dropped.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            delay: DEFAULT_NOTIFY_DELAY,
        }
    }

    /// Schedule `event` for delivery. Never waits; must be called inside a tokio runtime.
    pub fn emit(&self, event: OfflineEvent) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        let delay = self.delay;
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            sink.post(&event);
        });
    }
}
