//! Key schema and typed access over the key-value store.
//!
//! ```text
//! manifest/<id>                              StoredManifest
//! chunk/<id>/<index:010>                     ChunkRecord
//! history/<id>/<index:010>/<recordedAt:020>  PointerHistoryEntry
//! domain/<domain>                            DomainRecord
//! ```
//!
//! Zero-padded numbers keep prefix scans in numeric order.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared_types::{ChunkRecord, Manifest, PointerHistoryEntry, Timestamp};

use crate::domain::errors::RegistryError;
use crate::ports::{BatchOperation, KeyValueStore};

pub(crate) mod keys {
    pub const MANIFEST_PREFIX: &str = "manifest/";
    pub const CHUNK_PREFIX: &str = "chunk/";
    pub const DOMAIN_PREFIX: &str = "domain/";

    pub fn manifest(id: &str) -> String {
        format!("{MANIFEST_PREFIX}{id}")
    }

    pub fn chunk_prefix(id: &str) -> String {
        format!("{CHUNK_PREFIX}{id}/")
    }

    pub fn chunk(id: &str, index: u32) -> String {
        format!("{CHUNK_PREFIX}{id}/{index:010}")
    }

    pub fn history_prefix(id: &str, index: u32) -> String {
        format!("history/{id}/{index:010}/")
    }

    pub fn history(id: &str, index: u32, recorded_at: u64) -> String {
        format!("history/{id}/{index:010}/{recorded_at:020}")
    }

    pub fn domain(domain: &str) -> String {
        format!("{DOMAIN_PREFIX}{domain}")
    }
}

/// Manifest row with its manifest-level replica set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredManifest {
    pub manifest: Manifest,
    pub replicas: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Everything guarded by the service lock.
pub(crate) struct RegistryState {
    store: Box<dyn KeyValueStore>,
    /// Last history stamp per (manifestId, chunkIndex).
    last_stamps: HashMap<(String, u32), u64>,
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, RegistryError> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> Result<T, RegistryError> {
    serde_json::from_slice(bytes).map_err(|e| {
        RegistryError::Storage(format!(
            "corrupt record {}: {e}",
            String::from_utf8_lossy(key)
        ))
    })
}

impl RegistryState {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self {
            store,
            last_stamps: HashMap::new(),
        }
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, RegistryError> {
        self.store
            .get(key.as_bytes())?
            .map(|bytes| decode(key.as_bytes(), &bytes))
            .transpose()
    }

    pub fn scan_json<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, RegistryError> {
        self.store
            .prefix_scan(prefix.as_bytes())?
            .iter()
            .map(|(key, bytes)| decode(key, bytes))
            .collect()
    }

    pub fn scan_json_keyed<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> Result<Vec<(Vec<u8>, T)>, RegistryError> {
        self.store
            .prefix_scan(prefix.as_bytes())?
            .into_iter()
            .map(|(key, bytes)| {
                let value = decode(&key, &bytes)?;
                Ok((key, value))
            })
            .collect()
    }

    pub fn scan_keys(&self, prefix: &str) -> Result<Vec<Vec<u8>>, RegistryError> {
        Ok(self
            .store
            .prefix_scan(prefix.as_bytes())?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    pub fn exists(&self, key: &str) -> Result<bool, RegistryError> {
        Ok(self.store.exists(key.as_bytes())?)
    }

    pub fn write(&mut self, operations: Vec<BatchOperation>) -> Result<(), RegistryError> {
        if operations.is_empty() {
            return Ok(());
        }
        Ok(self.store.atomic_batch_write(operations)?)
    }

    pub fn load_manifest(&self, id: &str) -> Result<StoredManifest, RegistryError> {
        self.get_json(&keys::manifest(id))?
            .ok_or_else(|| RegistryError::ManifestNotFound(id.to_string()))
    }

    /// All chunk records of a manifest, one per index. Missing rows read as
    /// empty records.
    pub fn load_chunks(&self, stored: &StoredManifest) -> Result<Vec<ChunkRecord>, RegistryError> {
        let id = &stored.manifest.manifest_id;
        let mut chunks: Vec<ChunkRecord> =
            (0..stored.manifest.chunk_count).map(ChunkRecord::empty).collect();
        for record in self.scan_json::<ChunkRecord>(&keys::chunk_prefix(id))? {
            if let Some(slot) = chunks.get_mut(record.index as usize) {
                *slot = record;
            }
        }
        Ok(chunks)
    }

    pub fn load_chunk(&self, id: &str, index: u32) -> Result<ChunkRecord, RegistryError> {
        Ok(self
            .get_json(&keys::chunk(id, index))?
            .unwrap_or_else(|| ChunkRecord::empty(index)))
    }

    /// Next `recordedAt` for a chunk: `max(now, last + 1)`.
    ///
    /// The last stamp is seeded from the newest persisted entry the first
    /// time a key is seen, so ordering survives restarts.
    pub fn next_history_stamp(
        &mut self,
        id: &str,
        index: u32,
        now: u64,
    ) -> Result<u64, RegistryError> {
        let cache_key = (id.to_string(), index);
        let last = match self.last_stamps.get(&cache_key) {
            Some(last) => Some(*last),
            None => self
                .scan_json::<PointerHistoryEntry>(&keys::history_prefix(id, index))?
                .last()
                .map(|entry| entry.recorded_at),
        };
        let stamp = match last {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last_stamps.insert(cache_key, stamp);
        Ok(stamp)
    }

    /// Batch operation appending one history entry.
    pub fn history_entry(
        &mut self,
        id: &str,
        record: &ChunkRecord,
        now: u64,
    ) -> Result<BatchOperation, RegistryError> {
        let recorded_at = self.next_history_stamp(id, record.index, now)?;
        let entry = PointerHistoryEntry {
            manifest_id: id.to_string(),
            chunk_index: record.index,
            pointer: record.pointer.clone(),
            expires_at: record.pointer_expires_at,
            recorded_at,
        };
        Ok(BatchOperation::put(
            keys::history(id, record.index, recorded_at),
            encode(&entry)?,
        ))
    }
}
