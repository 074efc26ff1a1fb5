//! Attempt trail recorded while resolving chunks.
//!
//! Every tier the cascade touches yields one [`ChunkAttempt`]: either the
//! source that served the chunk or the reason the cascade moved on.

use serde::Serialize;

pub const REASON_POINTER_ERROR: &str = "pointer-error";
pub const REASON_FALLBACK_DISABLED: &str = "registry-fallback-disabled";
pub const REASON_REGISTRY_ERROR: &str = "registry-error";
pub const REASON_CHUNK_MISSING: &str = "chunk-missing";
pub const REASON_CHUNK_UNAVAILABLE: &str = "chunk-unavailable";
pub const REASON_PEER_HASH_MISMATCH: &str = "peer-hash-mismatch";
pub const REASON_NO_PEERS: &str = "peer-none";

/// `peer-<status>` for a failed peer request.
pub fn peer_reason(status: &str) -> String {
    format!("peer-{status}")
}

/// `pointer-<httpStatus>` for a pointer URL that answered non-2xx.
pub fn pointer_status_reason(status: u16) -> String {
    format!("pointer-{status}")
}

/// Where a resolved chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum ChunkSource {
    Cache,
    Peer { peer: String },
    Pointer { url: String },
    Inline,
}

impl ChunkSource {
    pub fn label(&self) -> &'static str {
        match self {
            ChunkSource::Cache => "cache",
            ChunkSource::Peer { .. } => "peer",
            ChunkSource::Pointer { .. } => "pointer",
            ChunkSource::Inline => "inline",
        }
    }
}

/// Cascade tier an attempt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    Cache,
    Peer,
    Registry,
    Pointer,
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "kebab-case")]
pub enum AttemptOutcome {
    Served(ChunkSource),
    Fallback(String),
}

/// One step of the cascade for one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAttempt {
    pub manifest_id: String,
    pub chunk_index: u32,
    pub tier: Tier,
    pub outcome: AttemptOutcome,
}

impl ChunkAttempt {
    pub fn reason(&self) -> Option<&str> {
        match &self.outcome {
            AttemptOutcome::Fallback(reason) => Some(reason),
            AttemptOutcome::Served(_) => None,
        }
    }
}
