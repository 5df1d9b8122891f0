//! Update manifest retrieval.
//!
//! The manifest is a small JSON document published next to the application:
//!
//! ```json
//! { "version": 12, "fileList": ["app.js", "style.css", "images/logo.png"] }
//! ```
//!
//! It is always fetched around any intermediate cache, otherwise a stale
//! manifest would hide new versions indefinitely.

use std::sync::Arc;

use reqwest::Url;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::{OfflineError, Result};
use crate::network::{fetch_with_bypass, resolve_url, Network, Request};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    /// Opaque token, only ever compared for equality.
    #[serde(deserialize_with = "version_token")]
    pub version: String,
    #[serde(rename = "fileList", default)]
    pub file_list: Vec<String>,
}

impl Manifest {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| OfflineError::ManifestUnavailable(format!("invalid manifest: {}", e)))
    }
}

/// Accept the version as either a JSON string or a JSON number.
fn version_token<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "version must be a string or number, got {}",
            other
        ))),
    }
}

#[derive(Clone)]
pub struct ManifestResolver {
    network: Arc<dyn Network>,
    manifest_url: String,
}

impl ManifestResolver {
    pub fn new(network: Arc<dyn Network>, scope: &Url, manifest_file: &str) -> Result<Self> {
        Ok(Self {
            network,
            manifest_url: resolve_url(scope, manifest_file)?,
        })
    }

    /// Fetch and parse the current manifest.
    pub async fn resolve(&self) -> Result<Manifest> {
        let request = Request::get(&self.manifest_url);
        let response = fetch_with_bypass(self.network.as_ref(), &request, true)
            .await
            .map_err(|e| OfflineError::ManifestUnavailable(e.to_string()))?;

        if !response.is_success() {
            let body = String::from_utf8_lossy(&response.body);
            return Err(OfflineError::manifest_status(&self.manifest_url, response.status, &body));
        }

        let manifest = Manifest::parse(&response.body)?;
        debug!(version = %manifest.version, files = manifest.file_list.len(), "Resolved manifest");
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::FetchMode;
    use crate::testing::{scope, MockNetwork};

    fn resolver(network: &Arc<MockNetwork>) -> ManifestResolver {
        ManifestResolver::new(network.clone(), &scope(), "offline.json").unwrap()
    }

    #[test]
    fn test_parse_string_version() {
        let manifest = Manifest::parse(br#"{"version": "abc", "fileList": ["a.js", "b.js"]}"#).unwrap();
        assert_eq!(manifest.version, "abc");
        assert_eq!(manifest.file_list, vec!["a.js", "b.js"]);
    }

    #[test]
    fn test_parse_numeric_version() {
        let manifest = Manifest::parse(br#"{"version": 12, "fileList": []}"#).unwrap();
        assert_eq!(manifest.version, "12");
    }

    #[test]
    fn test_parse_missing_file_list() {
        let manifest = Manifest::parse(br#"{"version": "1"}"#).unwrap();
        assert!(manifest.file_list.is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_version() {
        let err = Manifest::parse(br#"{"version": null, "fileList": []}"#).unwrap_err();
        assert!(matches!(err, OfflineError::ManifestUnavailable(_)));
    }

    #[test]
    fn test_parse_rejects_html() {
        assert!(Manifest::parse(b"<!doctype html><p>offline</p>").is_err());
    }

    #[tokio::test]
    async fn test_resolve_bypasses_cache() {
        let network = Arc::new(MockNetwork::new());
        network.respond(
            "https://example.com/app/offline.json",
            200,
            r#"{"version": "3", "fileList": ["a.js"]}"#,
        );

        let manifest = resolver(&network).resolve().await.unwrap();
        assert_eq!(manifest.version, "3");

        let calls = network.calls();
        assert!(calls[0].0.starts_with("https://example.com/app/offline.json?"));
        assert_eq!(calls[0].1, FetchMode::NoStore);
    }

    #[tokio::test]
    async fn test_resolve_offline() {
        let network = Arc::new(MockNetwork::new());
        network.set_offline(true);

        let err = resolver(&network).resolve().await.unwrap_err();
        assert!(matches!(err, OfflineError::ManifestUnavailable(_)));
    }

    #[tokio::test]
    async fn test_resolve_error_status() {
        let network = Arc::new(MockNetwork::new());
        network.respond("https://example.com/app/offline.json", 404, "missing");

        let err = resolver(&network).resolve().await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
