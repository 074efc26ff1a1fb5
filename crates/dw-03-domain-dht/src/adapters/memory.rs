//! Shared in-process DHT.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::DhtError;
use crate::ports::DhtStore;

/// Clones share one record map, so several nodes in a test see the same
/// DHT.
#[derive(Clone, Default)]
pub struct InMemoryDht {
    records: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryDht {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl DhtStore for InMemoryDht {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), DhtError> {
        self.records.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DhtError> {
        Ok(self.records.read().get(key).cloned())
    }
}
