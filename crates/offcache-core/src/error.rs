use thiserror::Error;

#[derive(Error, Debug)]
pub enum OfflineError {
    #[error("Manifest unavailable: {0}")]
    ManifestUnavailable(String),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for OfflineError {
    fn from(err: reqwest::Error) -> Self {
        OfflineError::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OfflineError>;

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl OfflineError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Describe a manifest response that came back with a non-success status.
    pub fn manifest_status(url: &str, status: u16, body: &str) -> Self {
        OfflineError::ManifestUnavailable(format!(
            "{} returned status {}: {}",
            url,
            status,
            Self::truncate_body(body)
        ))
    }

    /// Whether this error means the device is most likely offline.
    pub fn is_network(&self) -> bool {
        matches!(self, OfflineError::Network(_))
    }
}
