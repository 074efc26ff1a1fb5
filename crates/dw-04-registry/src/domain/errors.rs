//! # Registry Error Types
//!
//! Every [`RegistryError`] carries a stable wire code and an HTTP status.
//! Validation errors are 400, ownership proof failures 401, missing
//! resources 404, a taken domain 409, throttling 429 and storage 500.

use std::fmt;

use thiserror::Error;

/// Errors surfaced by the registry service and its REST layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Request body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid manifest id: {0:?}")]
    InvalidManifestId(String),

    #[error("Invalid chunk index: {0}")]
    InvalidChunkIndex(String),

    #[error("Chunk index {index} out of range for chunkCount {chunk_count}")]
    ChunkIndexOutOfRange { index: u64, chunk_count: u32 },

    #[error("Invalid pointer: {0}")]
    InvalidPointer(String),

    #[error("Invalid expiresAt: {0}")]
    InvalidExpiry(String),

    #[error("Invalid peer id: {0}")]
    InvalidPeerId(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid owner: {0}")]
    InvalidOwner(String),

    #[error("Invalid domain update: {0}")]
    InvalidDomainUpdate(String),

    #[error("Manifest not found: {0}")]
    ManifestNotFound(String),

    #[error("Domain not found: {0}")]
    DomainNotFound(String),

    #[error("Domain already registered: {0}")]
    DomainAlreadyRegistered(String),

    #[error("Owner {0} requires publicKey, signature and message")]
    SignatureRequired(String),

    #[error("Signature verification failed: {0}")]
    InvalidSignature(String),

    #[error("Public key derives {derived}, not owner {owner}")]
    OwnerMismatch { owner: String, derived: String },

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl RegistryError {
    /// Stable machine-readable code rendered as `{ "error": CODE }`.
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::InvalidJson(_) => "INVALID_JSON",
            RegistryError::InvalidManifest(_) => "INVALID_MANIFEST",
            RegistryError::InvalidManifestId(_) => "INVALID_MANIFEST_ID",
            RegistryError::InvalidChunkIndex(_) => "INVALID_CHUNK_INDEX",
            RegistryError::ChunkIndexOutOfRange { .. } => "CHUNK_INDEX_OUT_OF_RANGE",
            RegistryError::InvalidPointer(_) => "INVALID_POINTER",
            RegistryError::InvalidExpiry(_) => "INVALID_EXPIRY",
            RegistryError::InvalidPeerId(_) => "INVALID_PEER_ID",
            RegistryError::InvalidDomain(_) => "INVALID_DOMAIN",
            RegistryError::InvalidOwner(_) => "INVALID_OWNER",
            RegistryError::InvalidDomainUpdate(_) => "INVALID_DOMAIN_UPDATE",
            RegistryError::ManifestNotFound(_) => "MANIFEST_NOT_FOUND",
            RegistryError::DomainNotFound(_) => "DOMAIN_NOT_FOUND",
            RegistryError::DomainAlreadyRegistered(_) => "DOMAIN_ALREADY_REGISTERED",
            RegistryError::SignatureRequired(_) => "SIGNATURE_REQUIRED",
            RegistryError::InvalidSignature(_) => "INVALID_SIGNATURE",
            RegistryError::OwnerMismatch { .. } => "OWNER_MISMATCH",
            RegistryError::RateLimited { .. } => "RATE_LIMITED",
            RegistryError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            RegistryError::SignatureRequired(_)
            | RegistryError::InvalidSignature(_)
            | RegistryError::OwnerMismatch { .. } => 401,
            RegistryError::ManifestNotFound(_) | RegistryError::DomainNotFound(_) => 404,
            RegistryError::DomainAlreadyRegistered(_) => 409,
            RegistryError::RateLimited { .. } => 429,
            RegistryError::Storage(_) => 500,
            _ => 400,
        }
    }
}

impl From<KVStoreError> for RegistryError {
    fn from(err: KVStoreError) -> Self {
        RegistryError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Storage(format!("record encoding: {err}"))
    }
}

/// Key-value store errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KVStoreError {
    /// I/O error during read/write.
    IOError { message: String },
    /// Persisted data could not be decoded.
    CorruptionError { message: String },
    /// Another process holds the store.
    Locked { path: String },
}

impl fmt::Display for KVStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KVStoreError::IOError { message } => write!(f, "KV store I/O error: {}", message),
            KVStoreError::CorruptionError { message } => {
                write!(f, "KV store corruption: {}", message)
            }
            KVStoreError::Locked { path } => write!(f, "KV store already in use: {}", path),
        }
    }
}

impl std::error::Error for KVStoreError {}

impl From<std::io::Error> for KVStoreError {
    fn from(err: std::io::Error) -> Self {
        KVStoreError::IOError {
            message: err.to_string(),
        }
    }
}
