//! Open UI sessions of the application.
//!
//! Sessions are only a liveness signal: how many are open decides whether an
//! old generation may be evicted, and their URLs tell which entry document to
//! include in a new generation.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;

/// Root entry document, always part of a generation.
pub const ROOT_ENTRY: &str = "./";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub url: String,
    /// Whether this session's requests are routed through the worker.
    pub controlled: bool,
}

impl Session {
    pub fn controlled(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            controlled: true,
        }
    }

    pub fn uncontrolled(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            controlled: false,
        }
    }
}

#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Currently open sessions. Uncontrolled ones (opened before the worker
    /// took over) are only included when asked for.
    async fn sessions(&self, include_uncontrolled: bool) -> Result<Vec<Session>>;
}

/// Session list kept by the host and updated as windows open and close.
#[derive(Debug, Default)]
pub struct StaticSessions {
    sessions: Mutex<Vec<Session>>,
}

impl StaticSessions {
    pub fn new(sessions: Vec<Session>) -> Self {
        Self {
            sessions: Mutex::new(sessions),
        }
    }

    pub async fn open(&self, session: Session) {
        self.sessions.lock().await.push(session);
    }

    /// Close the first session showing `url`.
    pub async fn close(&self, url: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.iter().position(|s| s.url == url) {
            Some(pos) => {
                sessions.remove(pos);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl SessionSource for StaticSessions {
    async fn sessions(&self, include_uncontrolled: bool) -> Result<Vec<Session>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .iter()
            .filter(|s| include_uncontrolled || s.controlled)
            .cloned()
            .collect())
    }
}

/// Entry document a new generation must include so deep-linked sessions
/// keep working offline. Returns the first session URL that, relative to
/// `scope`, is something other than the root.
pub fn entry_document(scope: &str, sessions: &[Session]) -> Option<String> {
    sessions.iter().find_map(|session| {
        let url = session.url.strip_prefix(scope).unwrap_or(&session.url);
        if url.is_empty() || url == "/" {
            return None;
        }
        if url.starts_with('?') {
            Some(format!("/{}", url))
        } else {
            Some(url.to_string())
        }
    })
}
