//! In-process chunk cache.

use dw_02_chunk_transfer::FifoCache;
use parking_lot::RwLock;

use crate::config::DEFAULT_CACHE_CAPACITY;
use crate::ports::ChunkCache;

/// Cache key scoping a chunk to the registry it was resolved against.
pub fn cache_key(endpoint: &str, manifest_id: &str, chunk_index: u32) -> String {
    format!("{endpoint}|{manifest_id}|{chunk_index}")
}

/// Resolved chunks, oldest evicted first once `capacity` is reached.
pub struct MemoryChunkCache {
    entries: RwLock<FifoCache<String, Vec<u8>>>,
}

impl MemoryChunkCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(FifoCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for MemoryChunkCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkCache for MemoryChunkCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.read().get(&key.to_string()).cloned()
    }

    fn put(&self, key: &str, data: Vec<u8>) {
        self.entries.write().insert(key.to_string(), data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_scoped_by_endpoint() {
        let cache = MemoryChunkCache::new();
        cache.put(&cache_key("http://a", "m", 0), b"a".to_vec());
        assert_eq!(cache.get(&cache_key("http://a", "m", 0)), Some(b"a".to_vec()));
        assert_eq!(cache.get(&cache_key("http://b", "m", 0)), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_is_bounded() {
        let cache = MemoryChunkCache::with_capacity(2);
        for index in 0..5 {
            cache.put(&cache_key("http://a", "m", index), vec![index as u8]);
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&cache_key("http://a", "m", 2)), None);
        assert_eq!(cache.get(&cache_key("http://a", "m", 4)), Some(vec![4]));
    }
}
