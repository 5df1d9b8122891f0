//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::coordinator::UpdateCoordinator;
use crate::error::{OfflineError, Result};
use crate::network::{FetchMode, Network, Request, Response};
use crate::notify::{BroadcastSink, OfflineEvent};
use crate::registry::GenerationStore;
use crate::router::RequestRouter;
use crate::sessions::StaticSessions;
use crate::storage::MemoryStorage;
use crate::worker::{OfflineWorker, WorkerContext, WorkerSettings};

pub const SCOPE: &str = "https://example.com/app/";

pub fn scope() -> Url {
    Url::parse(SCOPE).unwrap()
}

/// Scripted network. Unknown URLs answer 404.
#[derive(Default)]
pub struct MockNetwork {
    responses: Mutex<HashMap<String, Response>>,
    broken: Mutex<Vec<String>>,
    calls: Mutex<Vec<(String, FetchMode)>>,
    offline: Mutex<bool>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Response::new(status, body));
    }

    /// Make requests for `url` fail at the transport level.
    pub fn break_url(&self, url: &str) {
        self.broken.lock().unwrap().push(url.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    pub fn calls(&self) -> Vec<(String, FetchMode)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

/// Remove a trailing `?123` / `&123` token added by cache busting.
fn strip_bust_token(url: &str) -> &str {
    match url.rfind(|c: char| c == '?' || c == '&') {
        Some(pos) if url[pos + 1..].chars().all(|c| c.is_ascii_digit()) && pos + 1 < url.len() => {
            &url[..pos]
        }
        _ => url,
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request, mode: FetchMode) -> Result<Response> {
        self.calls.lock().unwrap().push((request.url.clone(), mode));

        if *self.offline.lock().unwrap() {
            return Err(OfflineError::Network("offline".to_string()));
        }

        let plain = strip_bust_token(&request.url);
        if self
            .broken
            .lock()
            .unwrap()
            .iter()
            .any(|u| u == &request.url || u == plain)
        {
            return Err(OfflineError::Network(format!("connection reset: {}", request.url)));
        }

        let responses = self.responses.lock().unwrap();
        Ok(responses
            .get(&request.url)
            .or_else(|| responses.get(plain))
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found")))
    }
}

/// A worker over in-memory capabilities with notifications delivered immediately.
pub struct Harness {
    pub network: Arc<MockNetwork>,
    pub storage: Arc<MemoryStorage>,
    pub sessions: Arc<StaticSessions>,
    pub events: broadcast::Receiver<OfflineEvent>,
    pub worker: OfflineWorker,
    pub store: GenerationStore,
    pub coordinator: UpdateCoordinator,
    pub router: RequestRouter,
}

impl Harness {
    pub fn new() -> Self {
        let network = Arc::new(MockNetwork::new());
        let storage = Arc::new(MemoryStorage::new());
        let sessions = Arc::new(StaticSessions::default());
        let sink = Arc::new(BroadcastSink::new());
        let events = sink.subscribe();

        let mut settings = WorkerSettings::new(SCOPE);
        settings.notify_delay = Duration::ZERO;
        let worker = OfflineWorker::new(
            &settings,
            WorkerContext {
                network: network.clone(),
                storage: storage.clone(),
                sessions: sessions.clone(),
                sink: Some(sink),
            },
        )
        .unwrap();

        Self {
            network,
            storage,
            sessions,
            events,
            store: worker.generations().clone(),
            coordinator: worker.coordinator().clone(),
            router: worker.router().clone(),
            worker,
        }
    }

    /// Publish a manifest and serve each of its files (and the root document)
    /// with a body of `<file>@<version>`.
    pub fn publish(&self, version: &str, files: &[&str]) {
        let manifest = serde_json::json!({ "version": version, "fileList": files });
        self.network
            .respond(&format!("{}offline.json", SCOPE), 200, &manifest.to_string());
        self.network.respond(SCOPE, 200, &format!("./@{}", version));
        for file in files {
            self.network
                .respond(&format!("{}{}", SCOPE, file), 200, &format!("{}@{}", file, version));
        }
    }

    pub async fn next_event(&mut self) -> OfflineEvent {
        tokio::time::timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("timed out waiting for notification")
            .expect("notification channel closed")
    }

    /// Let pending notification tasks run, then drop whatever they sent.
    pub async fn drain_events(&mut self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        while self.events.try_recv().is_ok() {}
    }

    pub async fn assert_no_event(&mut self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        match self.events.try_recv() {
            Err(TryRecvError::Empty) => {}
            other => panic!("expected no notification, got {:?}", other),
        }
    }
}

#[test]
fn test_strip_bust_token() {
    assert_eq!(strip_bust_token("https://e.com/a.js?123"), "https://e.com/a.js");
    assert_eq!(strip_bust_token("https://e.com/?p=2&55"), "https://e.com/?p=2");
    assert_eq!(strip_bust_token("https://e.com/?p=2"), "https://e.com/?p=2");
    assert_eq!(strip_bust_token("https://e.com/a.js"), "https://e.com/a.js");
}
