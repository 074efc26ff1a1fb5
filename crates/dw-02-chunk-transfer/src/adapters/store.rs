//! In-memory chunk store: published transfers plus a bounded cache of
//! chunks received from peers.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use super::fifo::FifoCache;
use crate::domain::REASON_NOT_FOUND;
use crate::ports::ChunkProvider;

type ChunkKey = (String, u32);

/// Chunks this node serves.
///
/// Lookup order is uploaded transfers first, then the received cache.
pub struct LocalChunkStore {
    transfers: RwLock<HashMap<String, Vec<Vec<u8>>>>,
    received: RwLock<FifoCache<ChunkKey, Vec<u8>>>,
}

impl LocalChunkStore {
    pub fn new(received_capacity: usize) -> Self {
        Self {
            transfers: RwLock::new(HashMap::new()),
            received: RwLock::new(FifoCache::new(received_capacity)),
        }
    }

    /// Register every chunk of a published file under its manifest id.
    pub fn add_transfer(&self, manifest_id: impl Into<String>, chunks: Vec<Vec<u8>>) {
        let manifest_id = manifest_id.into();
        debug!(manifest_id = %manifest_id, chunks = chunks.len(), "[dw-02] Transfer registered");
        self.transfers.write().insert(manifest_id, chunks);
    }

    pub fn remove_transfer(&self, manifest_id: &str) -> bool {
        self.transfers.write().remove(manifest_id).is_some()
    }

    pub fn get(&self, manifest_id: &str, chunk_index: u32) -> Option<Vec<u8>> {
        if let Some(chunk) = self
            .transfers
            .read()
            .get(manifest_id)
            .and_then(|chunks| chunks.get(chunk_index as usize))
        {
            return Some(chunk.clone());
        }
        self.received
            .read()
            .get(&(manifest_id.to_string(), chunk_index))
            .cloned()
    }

    pub fn contains(&self, manifest_id: &str, chunk_index: u32) -> bool {
        self.get(manifest_id, chunk_index).is_some()
    }

    pub fn received_len(&self) -> usize {
        self.received.read().len()
    }
}

impl Default for LocalChunkStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RECEIVED_CAPACITY)
    }
}

impl ChunkProvider for LocalChunkStore {
    fn get_chunk(&self, manifest_id: &str, chunk_index: u32) -> Result<Vec<u8>, String> {
        self.get(manifest_id, chunk_index)
            .ok_or_else(|| REASON_NOT_FOUND.to_string())
    }

    fn store_received(&self, manifest_id: &str, chunk_index: u32, data: Vec<u8>) {
        self.received
            .write()
            .insert((manifest_id.to_string(), chunk_index), data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_then_received_lookup() {
        let store = LocalChunkStore::new(8);
        store.add_transfer("m1", vec![b"a".to_vec(), b"b".to_vec()]);
        store.store_received("m2", 0, b"x".to_vec());

        assert_eq!(store.get("m1", 1), Some(b"b".to_vec()));
        assert_eq!(store.get("m1", 2), None);
        assert_eq!(store.get("m2", 0), Some(b"x".to_vec()));
        assert_eq!(store.get_chunk("m3", 0).unwrap_err(), REASON_NOT_FOUND);
    }

    #[test]
    fn test_transfer_shadows_received() {
        let store = LocalChunkStore::new(8);
        store.store_received("m1", 0, b"old".to_vec());
        store.add_transfer("m1", vec![b"new".to_vec()]);
        assert_eq!(store.get("m1", 0), Some(b"new".to_vec()));
        assert!(store.remove_transfer("m1"));
        assert_eq!(store.get("m1", 0), Some(b"old".to_vec()));
    }

    #[test]
    fn test_received_cache_evicts_oldest() {
        let store = LocalChunkStore::new(2);
        store.store_received("m", 0, vec![0]);
        store.store_received("m", 1, vec![1]);
        store.store_received("m", 0, vec![9]);
        store.store_received("m", 2, vec![2]);

        assert_eq!(store.received_len(), 2);
        assert!(!store.contains("m", 0));
        assert_eq!(store.get("m", 1), Some(vec![1]));
        assert_eq!(store.get("m", 2), Some(vec![2]));
    }
}
