//! # Core Domain Entities
//!
//! Defines the records every subsystem exchanges: manifests, per-chunk
//! records, pointer history, domain records and the DHT domain value.
//!
//! All JSON field names are camelCase. Chunk bytes are base64, hashes are
//! lowercase hex SHA-256, timestamps are milliseconds since the Unix epoch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::encoding::base64_opt;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

// =============================================================================
// MANIFESTS
// =============================================================================

/// Immutable description of a published file.
///
/// `chunk_hashes` has exactly `chunk_count` entries; entry `i` is the hex
/// SHA-256 of chunk `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub manifest_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub chunk_size: u64,
    pub chunk_count: u32,
    /// Hex SHA-256 of the whole file.
    pub sha256: String,
    pub chunk_hashes: Vec<String>,
}

/// Per-chunk state held by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub index: u32,
    #[serde(default, with = "base64_opt")]
    pub data: Option<Vec<u8>>,
    #[serde(default)]
    pub pointer: Option<String>,
    #[serde(default)]
    pub pointer_expires_at: Option<Timestamp>,
    /// Peer ids known to hold the chunk, in first-seen order, no duplicates.
    #[serde(default)]
    pub replicas: Vec<String>,
}

impl ChunkRecord {
    pub fn empty(index: u32) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Add a replica if not already present. Returns true when added.
    pub fn add_replica(&mut self, peer_id: &str) -> bool {
        add_unique(&mut self.replicas, peer_id)
    }
}

/// Append-only audit entry written whenever a chunk's effective pointer or
/// expiry changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerHistoryEntry {
    pub manifest_id: String,
    pub chunk_index: u32,
    pub pointer: Option<String>,
    pub expires_at: Option<Timestamp>,
    pub recorded_at: Timestamp,
}

/// Full manifest as served by the registry, with index-aligned chunk arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestView {
    #[serde(flatten)]
    pub manifest: Manifest,
    /// Base64 inline chunk data, `null` where none is stored.
    pub chunk_data: Vec<Option<String>>,
    pub chunk_pointers: Vec<Option<String>>,
    pub chunk_pointer_expires_at: Vec<Option<Timestamp>>,
    pub chunk_replicas: Vec<Vec<String>>,
    /// Manifest-level replica set.
    pub replicas: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Manifest listing entry without chunk payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSummary {
    #[serde(flatten)]
    pub manifest: Manifest,
    pub replicas: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A single chunk as served by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkView {
    pub manifest_id: String,
    pub chunk_index: u32,
    pub hash: String,
    #[serde(default, with = "base64_opt")]
    pub data: Option<Vec<u8>>,
    pub pointer: Option<String>,
    pub pointer_expires_at: Option<Timestamp>,
    pub replicas: Vec<String>,
}

// =============================================================================
// DOMAINS
// =============================================================================

/// Human-readable name bound to a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRecord {
    /// Normalized: trimmed and lowercased.
    pub domain: String,
    pub owner: String,
    pub manifest_id: String,
    #[serde(default)]
    pub replicas: Vec<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Value stored in the DHT under `/dweb/domain/<domain>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DhtDomainValue {
    pub manifest_id: String,
    pub domain: String,
    pub timestamp: Timestamp,
    /// Peer id of the registering node.
    pub registered_by: String,
    /// Caller-supplied metadata, merged into the top-level object.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Trim and lowercase a domain name.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().to_lowercase()
}

/// Push `value` unless it is already present. Returns true when pushed.
pub fn add_unique(set: &mut Vec<String>, value: &str) -> bool {
    if set.iter().any(|existing| existing == value) {
        return false;
    }
    set.push(value.to_string());
    true
}
