//! DHT errors.

use shared_types::{FrameError, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DhtError {
    /// No value under the key, or the lookup timed out.
    #[error("No DHT record for {key}")]
    NotFound { key: String },

    /// Lookup exceeded its deadline.
    #[error("DHT lookup for {key} timed out after {timeout_ms} ms")]
    Timeout { key: String, timeout_ms: u64 },

    /// Value could not be encoded or decoded.
    #[error("Invalid DHT record: {0}")]
    InvalidRecord(#[from] serde_json::Error),

    /// Domain name is empty after normalization.
    #[error("Invalid domain: {0:?}")]
    InvalidDomain(String),

    /// No peer accepted the record.
    #[error("DHT put for {key} reached no peer")]
    NoPeers { key: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("DHT stream failed: {0}")]
    Frame(#[from] FrameError),

    /// Remote answered with an error message.
    #[error("DHT peer error: {0}")]
    Remote(String),
}

impl DhtError {
    /// True when the record is absent rather than the lookup broken.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DhtError::NotFound { .. } | DhtError::Timeout { .. })
    }
}
