//! Manifest publish, read and replica announcements.

use shared_types::encoding::encode_base64;
use shared_types::{add_unique, ChunkRecord, ManifestSummary, ManifestView};
use tracing::{debug, info};

use super::repository::{encode, keys, StoredManifest};
use super::RegistryService;
use crate::domain::errors::RegistryError;
use crate::domain::{validate_manifest_id, ManifestSubmission, ReplicaUpdate};
use crate::ports::BatchOperation;

pub(super) fn manifest_view(stored: StoredManifest, chunks: Vec<ChunkRecord>) -> ManifestView {
    let mut chunk_data = Vec::with_capacity(chunks.len());
    let mut chunk_pointers = Vec::with_capacity(chunks.len());
    let mut chunk_pointer_expires_at = Vec::with_capacity(chunks.len());
    let mut chunk_replicas = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        chunk_data.push(chunk.data.as_deref().map(encode_base64));
        chunk_pointers.push(chunk.pointer);
        chunk_pointer_expires_at.push(chunk.pointer_expires_at);
        chunk_replicas.push(chunk.replicas);
    }
    ManifestView {
        manifest: stored.manifest,
        chunk_data,
        chunk_pointers,
        chunk_pointer_expires_at,
        chunk_replicas,
        replicas: stored.replicas,
        created_at: stored.created_at,
        updated_at: stored.updated_at,
    }
}

impl RegistryService {
    /// Publish a manifest, replacing any manifest with the same id.
    ///
    /// Replace is delete-then-insert in one batch: every chunk row of the
    /// previous manifest is removed before the new rows are written, so all
    /// per-chunk state resets. Pointer history is kept; chunks published
    /// with a pointer get a history entry.
    pub fn create_manifest(
        &self,
        submission: ManifestSubmission,
    ) -> Result<ManifestView, RegistryError> {
        let validated = submission.validate()?;
        let now = self.now();
        let id = validated.manifest.manifest_id.clone();

        let mut state = self.state.lock();
        let replaced = state.exists(&keys::manifest(&id))?;

        let mut ops: Vec<BatchOperation> = state
            .scan_keys(&keys::chunk_prefix(&id))?
            .into_iter()
            .map(BatchOperation::delete)
            .collect();

        let stored = StoredManifest {
            manifest: validated.manifest,
            replicas: validated.replicas,
            created_at: now,
            updated_at: now,
        };
        ops.push(BatchOperation::put(keys::manifest(&id), encode(&stored)?));

        for chunk in &validated.chunks {
            ops.push(BatchOperation::put(keys::chunk(&id, chunk.index), encode(chunk)?));
            if chunk.pointer.is_some() || chunk.pointer_expires_at.is_some() {
                let entry = state.history_entry(&id, chunk, now)?;
                ops.push(entry);
            }
        }
        state.write(ops)?;

        info!(
            manifest_id = %id,
            chunk_count = stored.manifest.chunk_count,
            replaced,
            "[dw-04] 📦 Manifest published"
        );
        Ok(manifest_view(stored, validated.chunks))
    }

    /// Full manifest with index-aligned chunk arrays.
    pub fn get_manifest(&self, id: &str) -> Result<ManifestView, RegistryError> {
        validate_manifest_id(id)?;
        let state = self.state.lock();
        let stored = state.load_manifest(id)?;
        let chunks = state.load_chunks(&stored)?;
        Ok(manifest_view(stored, chunks))
    }

    /// All manifests without chunk payloads, ordered by id.
    pub fn list_manifests(&self) -> Result<Vec<ManifestSummary>, RegistryError> {
        let state = self.state.lock();
        Ok(state
            .scan_json::<StoredManifest>(keys::MANIFEST_PREFIX)?
            .into_iter()
            .map(|stored| ManifestSummary {
                manifest: stored.manifest,
                replicas: stored.replicas,
                created_at: stored.created_at,
                updated_at: stored.updated_at,
            })
            .collect())
    }

    /// Record that `update.peer_id` holds the given chunks (default: all).
    ///
    /// Idempotent: re-announcing an existing replica writes nothing.
    pub fn update_manifest_replicas(
        &self,
        id: &str,
        update: &ReplicaUpdate,
    ) -> Result<ManifestView, RegistryError> {
        validate_manifest_id(id)?;
        if update.peer_id.trim().is_empty() {
            return Err(RegistryError::InvalidPeerId("peerId is required".into()));
        }
        let now = self.now();

        let mut state = self.state.lock();
        let mut stored = state.load_manifest(id)?;
        let indexes = update.indexes(stored.manifest.chunk_count)?;
        let mut chunks = state.load_chunks(&stored)?;

        let mut ops = Vec::new();
        for index in indexes {
            let chunk = &mut chunks[index as usize];
            if chunk.add_replica(&update.peer_id) {
                ops.push(BatchOperation::put(keys::chunk(id, index), encode(&*chunk)?));
            }
        }
        let manifest_changed = add_unique(&mut stored.replicas, &update.peer_id);
        if manifest_changed || !ops.is_empty() {
            stored.updated_at = now;
            ops.push(BatchOperation::put(keys::manifest(id), encode(&stored)?));
        }

        if ops.is_empty() {
            debug!(manifest_id = %id, peer = %update.peer_id, "[dw-04] Replica already known");
        } else {
            state.write(ops)?;
            info!(manifest_id = %id, peer = %update.peer_id, "[dw-04] 🔁 Replica recorded");
        }
        Ok(manifest_view(stored, chunks))
    }
}
