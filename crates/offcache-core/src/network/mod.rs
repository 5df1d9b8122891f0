//! Network retrieval capability.
//!
//! The core never talks to the network directly. Everything goes through
//! the [`Network`] trait so hosts can plug in their own transport, and tests
//! can script responses. [`HttpNetwork`] is the reqwest-backed default.
//!
//! Requests that must not be answered by an intermediate cache (manifest
//! fetches and update builds) go through [`fetch_with_bypass`], which appends
//! a random token to the query string and asks for a no-store fetch.

pub mod http;

use async_trait::async_trait;
use rand::Rng;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{OfflineError, Result};

pub use http::HttpNetwork;

/// Upper bound (exclusive) of the random cache-busting token.
const CACHE_BUST_RANGE: u32 = 1_000_000;

/// How a request was issued by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Loads a top-level document.
    Navigate,
    /// Anything else: scripts, images, fetches made by a loaded page.
    SubResource,
}

/// An intercepted or outgoing GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode: RequestMode::Navigate,
            headers: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode: RequestMode::SubResource,
            headers: Vec::new(),
        }
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// Whether intermediate HTTP caches may answer a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    #[default]
    Default,
    NoStore,
}

/// A complete response, body included. Also the unit stored in a generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// 2xx, matching what a browser reports as `ok`.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[async_trait]
pub trait Network: Send + Sync {
    /// Retrieve a single resource. Non-2xx statuses are returned as responses,
    /// only transport failures are errors.
    async fn fetch(&self, request: &Request, mode: FetchMode) -> Result<Response>;
}

/// Fetch `request`, optionally forcing the bytes to come from the origin.
pub async fn fetch_with_bypass(
    network: &dyn Network,
    request: &Request,
    bypass_cache: bool,
) -> Result<Response> {
    if !bypass_cache {
        return network.fetch(request, FetchMode::Default).await;
    }

    let busted = Request {
        url: cache_bust_url(&request.url, bust_token())?,
        mode: request.mode,
        headers: request.headers.clone(),
    };
    network.fetch(&busted, FetchMode::NoStore).await
}

fn bust_token() -> u32 {
    rand::thread_rng().gen_range(0..CACHE_BUST_RANGE)
}

/// Append `token` to the query string of `url`.
pub fn cache_bust_url(url: &str, token: u32) -> Result<String> {
    let mut parsed = Url::parse(url).map_err(|e| OfflineError::InvalidUrl(format!("{}: {}", url, e)))?;
    let query = match parsed.query() {
        Some(q) if !q.is_empty() => format!("{}&{}", q, token),
        _ => token.to_string(),
    };
    parsed.set_query(Some(&query));
    Ok(parsed.into())
}

/// Resolve a file-list entry (possibly relative, e.g. `./` or `a.js`) against the scope URL.
pub fn resolve_url(scope: &Url, entry: &str) -> Result<String> {
    scope
        .join(entry)
        .map(String::from)
        .map_err(|e| OfflineError::InvalidUrl(format!("{}: {}", entry, e)))
}

mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
