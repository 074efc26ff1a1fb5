//! Chunk reads, pointer updates and pointer history.

use serde::Serialize;
use shared_types::{ChunkRecord, ChunkView, PointerHistoryEntry};
use tracing::{debug, info};

use super::repository::{encode, keys};
use super::RegistryService;
use crate::domain::errors::RegistryError;
use crate::domain::{check_index, validate_manifest_id, PointerUpdate};
use crate::ports::BatchOperation;

/// Response of `GET /manifests/:id/chunks/:index/pointers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerHistoryPage {
    pub manifest_id: String,
    pub chunk_index: u32,
    pub limit: usize,
    /// Most recent first.
    pub entries: Vec<PointerHistoryEntry>,
}

fn chunk_view(id: &str, hash: &str, record: ChunkRecord) -> ChunkView {
    ChunkView {
        manifest_id: id.to_string(),
        chunk_index: record.index,
        hash: hash.to_string(),
        data: record.data,
        pointer: record.pointer,
        pointer_expires_at: record.pointer_expires_at,
        replicas: record.replicas,
    }
}

impl RegistryService {
    /// One chunk with its hash, inline data, pointer and replicas.
    pub fn get_manifest_chunk(&self, id: &str, index: u64) -> Result<ChunkView, RegistryError> {
        validate_manifest_id(id)?;
        let state = self.state.lock();
        let stored = state.load_manifest(id)?;
        let index = check_index(index, stored.manifest.chunk_count)?;
        let record = state.load_chunk(id, index)?;
        Ok(chunk_view(
            id,
            &stored.manifest.chunk_hashes[index as usize],
            record,
        ))
    }

    /// Set, replace or clear a chunk pointer.
    ///
    /// History is appended only when the effective pointer or expiry
    /// changes; identical writes leave the log untouched.
    pub fn update_chunk_pointer(
        &self,
        id: &str,
        index: u64,
        update: &PointerUpdate,
    ) -> Result<ChunkView, RegistryError> {
        validate_manifest_id(id)?;
        let now = self.now();

        let mut state = self.state.lock();
        let stored = state.load_manifest(id)?;
        let index = check_index(index, stored.manifest.chunk_count)?;
        let mut record = state.load_chunk(id, index)?;

        let data_before = record.data.is_some();
        let changed = update.apply(&mut record);
        let data_removed = data_before && record.data.is_none();

        if changed || data_removed {
            let mut ops = vec![BatchOperation::put(keys::chunk(id, index), encode(&record)?)];
            if changed {
                ops.push(state.history_entry(id, &record, now)?);
            }
            state.write(ops)?;
            info!(
                manifest_id = %id,
                chunk_index = index,
                pointer = ?record.pointer,
                expires_at = ?record.pointer_expires_at,
                data_removed,
                "[dw-04] 🔗 Chunk pointer updated"
            );
        } else {
            debug!(manifest_id = %id, chunk_index = index, "[dw-04] Pointer update was a no-op");
        }

        Ok(chunk_view(
            id,
            &stored.manifest.chunk_hashes[index as usize],
            record,
        ))
    }

    /// Pointer history for a chunk, most recent first. `limit` defaults to
    /// and is clamped at the page cap.
    pub fn get_chunk_pointer_history(
        &self,
        id: &str,
        index: u64,
        limit: Option<usize>,
    ) -> Result<PointerHistoryPage, RegistryError> {
        validate_manifest_id(id)?;
        let limit = limit
            .unwrap_or(self.history_page_limit)
            .clamp(1, self.history_page_limit);

        let state = self.state.lock();
        let stored = state.load_manifest(id)?;
        let index = check_index(index, stored.manifest.chunk_count)?;
        let mut entries =
            state.scan_json::<PointerHistoryEntry>(&keys::history_prefix(id, index))?;
        entries.reverse();
        entries.truncate(limit);

        Ok(PointerHistoryPage {
            manifest_id: id.to_string(),
            chunk_index: index,
            limit,
            entries,
        })
    }
}
