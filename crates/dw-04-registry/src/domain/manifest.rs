//! Manifest submission and validation.
//!
//! A submission carries the manifest fields plus optional index-aligned
//! per-chunk arrays. Every array that is present must have exactly
//! `chunkCount` entries.

use serde::Deserialize;
use shared_types::encoding::decode_base64;
use shared_types::{add_unique, ChunkRecord, Manifest};

use super::errors::RegistryError;
use super::pointer::{validate_expiry, validate_pointer};

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
const MAX_MANIFEST_ID_LEN: usize = 128;

/// Body of `POST /manifests`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSubmission {
    pub manifest_id: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub mime_type: Option<String>,
    pub chunk_size: Option<u64>,
    pub chunk_count: Option<u32>,
    pub sha256: Option<String>,
    pub chunk_hashes: Option<Vec<String>>,
    pub chunk_data: Option<Vec<Option<String>>>,
    pub chunk_pointers: Option<Vec<Option<String>>>,
    pub chunk_pointer_expires_at: Option<Vec<Option<u64>>>,
    pub chunk_replicas: Option<Vec<Vec<String>>>,
    pub replicas: Option<Vec<String>>,
}

/// A submission that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedManifest {
    pub manifest: Manifest,
    pub chunks: Vec<ChunkRecord>,
    /// Manifest-level replicas: submitted replicas followed by every chunk
    /// replica, first-seen order.
    pub replicas: Vec<String>,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, RegistryError> {
    value.ok_or_else(|| RegistryError::InvalidManifest(format!("{field} is required")))
}

fn check_len<T>(items: &[T], chunk_count: u32, field: &str) -> Result<(), RegistryError> {
    if items.len() != chunk_count as usize {
        return Err(RegistryError::InvalidManifest(format!(
            "{field} has {} entries, chunkCount is {chunk_count}",
            items.len()
        )));
    }
    Ok(())
}

/// `fileSize` must fill the last chunk: `(chunkCount-1)*chunkSize < fileSize
/// <= chunkCount*chunkSize`, and an empty file has no chunks.
fn check_file_size(file_size: u64, chunk_size: u64, chunk_count: u32) -> Result<(), RegistryError> {
    let mismatch = || {
        RegistryError::InvalidManifest(format!(
            "fileSize {file_size} does not fit {chunk_count} chunks of {chunk_size} bytes"
        ))
    };
    if chunk_count == 0 {
        return if file_size == 0 { Ok(()) } else { Err(mismatch()) };
    }
    let upper = chunk_size
        .checked_mul(u64::from(chunk_count))
        .ok_or_else(mismatch)?;
    let lower = upper - chunk_size;
    if file_size > lower && file_size <= upper {
        Ok(())
    } else {
        Err(mismatch())
    }
}

/// Validate a manifest id: non-empty, bounded, and free of path separators.
pub fn validate_manifest_id(id: &str) -> Result<(), RegistryError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_MANIFEST_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidManifestId(id.to_string()))
    }
}

fn normalize_hash(hash: &str, field: &str) -> Result<String, RegistryError> {
    let hash = hash.trim().to_ascii_lowercase();
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(RegistryError::InvalidManifest(format!(
            "{field} must be a hex SHA-256 digest"
        )));
    }
    Ok(hash)
}

fn validate_peer_ids(peers: &[String]) -> Result<(), RegistryError> {
    match peers.iter().find(|p| p.trim().is_empty()) {
        Some(_) => Err(RegistryError::InvalidPeerId("empty peer id".to_string())),
        None => Ok(()),
    }
}

impl ManifestSubmission {
    /// Check required fields and array alignment, producing the manifest and
    /// one chunk record per index.
    pub fn validate(self) -> Result<ValidatedManifest, RegistryError> {
        let manifest_id = required(self.manifest_id, "manifestId")?;
        validate_manifest_id(&manifest_id)?;

        let file_name = required(self.file_name, "fileName")?;
        if file_name.trim().is_empty() {
            return Err(RegistryError::InvalidManifest("fileName is empty".into()));
        }
        let file_size = required(self.file_size, "fileSize")?;
        let chunk_size = required(self.chunk_size, "chunkSize")?;
        if chunk_size == 0 {
            return Err(RegistryError::InvalidManifest("chunkSize must be positive".into()));
        }
        let chunk_count = required(self.chunk_count, "chunkCount")?;
        check_file_size(file_size, chunk_size, chunk_count)?;
        let sha256 = normalize_hash(&required(self.sha256, "sha256")?, "sha256")?;

        let chunk_hashes = required(self.chunk_hashes, "chunkHashes")?;
        check_len(&chunk_hashes, chunk_count, "chunkHashes")?;
        let chunk_hashes = chunk_hashes
            .iter()
            .map(|h| normalize_hash(h, "chunkHashes"))
            .collect::<Result<Vec<_>, _>>()?;

        let mut chunks: Vec<ChunkRecord> = (0..chunk_count).map(ChunkRecord::empty).collect();

        if let Some(data) = self.chunk_data {
            check_len(&data, chunk_count, "chunkData")?;
            for (chunk, encoded) in chunks.iter_mut().zip(data) {
                chunk.data = encoded
                    .map(|text| decode_base64(&text))
                    .transpose()
                    .map_err(|e| {
                        RegistryError::InvalidManifest(format!(
                            "chunkData[{}] is not base64: {e}",
                            chunk.index
                        ))
                    })?;
            }
        }

        if let Some(pointers) = self.chunk_pointers {
            check_len(&pointers, chunk_count, "chunkPointers")?;
            for (chunk, pointer) in chunks.iter_mut().zip(pointers) {
                if let Some(pointer) = &pointer {
                    validate_pointer(pointer)?;
                }
                chunk.pointer = pointer;
            }
        }

        if let Some(expiries) = self.chunk_pointer_expires_at {
            check_len(&expiries, chunk_count, "chunkPointerExpiresAt")?;
            for (chunk, expiry) in chunks.iter_mut().zip(expiries) {
                if let Some(expiry) = expiry {
                    validate_expiry(expiry)?;
                }
                chunk.pointer_expires_at = expiry;
            }
        }

        let mut replicas = Vec::new();
        if let Some(submitted) = self.replicas {
            validate_peer_ids(&submitted)?;
            for peer in &submitted {
                add_unique(&mut replicas, peer);
            }
        }
        if let Some(chunk_replicas) = self.chunk_replicas {
            check_len(&chunk_replicas, chunk_count, "chunkReplicas")?;
            for (chunk, peers) in chunks.iter_mut().zip(chunk_replicas) {
                validate_peer_ids(&peers)?;
                for peer in &peers {
                    chunk.add_replica(peer);
                    add_unique(&mut replicas, peer);
                }
            }
        }

        Ok(ValidatedManifest {
            manifest: Manifest {
                manifest_id,
                file_name,
                file_size,
                mime_type: self
                    .mime_type
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
                chunk_size,
                chunk_count,
                sha256,
                chunk_hashes,
            },
            chunks,
            replicas,
        })
    }
}
