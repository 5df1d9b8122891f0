//! reqwest-backed network capability.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::debug;

use super::{FetchMode, Network, Request, Response};
use crate::error::Result;

/// HTTP request timeout in seconds.
/// The core has no timeouts of its own, so a hung request must be cut off here.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Network capability over a shared reqwest client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request, mode: FetchMode) -> Result<Response> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if mode == FetchMode::NoStore {
            builder = builder
                .header(header::CACHE_CONTROL, "no-store")
                .header(header::PRAGMA, "no-cache");
        }

        let response = builder.send().await?;
        let status = response.status();
        debug!(url = %request.url, status = status.as_u16(), "Fetched");

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}
