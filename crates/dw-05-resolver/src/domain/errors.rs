//! Resolver errors.

use thiserror::Error;

/// Failure of a registry or storage-service HTTP call.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Endpoint refused or could not be reached.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout or body read failure.
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// Non-success status; `code` is the `{error}` field when present.
    #[error("HTTP {status}{}", .code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
    Status { status: u16, code: Option<String> },

    /// Body is not the expected JSON.
    #[error("Failed to parse response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Status { status: 404, .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            ClientError::Connection(e.to_string())
        } else if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

/// Failure to fetch a pointer URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointerError {
    #[error("Pointer answered HTTP {0}")]
    Status(u16),

    #[error("Pointer fetch failed: {0}")]
    Fetch(String),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Registry: {0}")]
    Registry(#[from] ClientError),

    /// Every tier failed for one chunk. `reasons` lists the fallback trail.
    #[error("Chunk {index} unavailable ({})", .reasons.join(", "))]
    ChunkUnavailable { index: u32, reasons: Vec<String> },

    /// Assembled file does not match the manifest hash.
    #[error("File hash mismatch: expected {expected}, got {actual}")]
    FileHashMismatch { expected: String, actual: String },

    #[error("Domain not found: {0}")]
    DomainNotFound(String),

    #[error("Publish failed: {0}")]
    Publish(String),
}
