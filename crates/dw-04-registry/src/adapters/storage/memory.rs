use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore, ScanResult};
use std::collections::BTreeMap;
use std::ops::Bound;

/// In-memory key-value store.
///
/// Ordered map so prefix scans come back sorted without extra work.
#[derive(Default)]
pub struct InMemoryKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_map(data: BTreeMap<Vec<u8>, Vec<u8>>) -> Self {
        Self { data }
    }

    pub(crate) fn as_map(&self) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        &self.data
    }

    pub(crate) fn apply(&mut self, operations: Vec<BatchOperation>) {
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    self.data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    self.data.remove(&key);
                }
            }
        }
    }

    pub(crate) fn scan(&self, prefix: &[u8]) -> ScanResult {
        self.data
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.data.remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        self.apply(operations);
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        Ok(self.scan(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_scan_is_sorted_and_bounded() {
        let mut store = InMemoryKVStore::new();
        store.put(b"chunk/m1/0000000002", b"c").unwrap();
        store.put(b"chunk/m1/0000000000", b"a").unwrap();
        store.put(b"chunk/m2/0000000000", b"x").unwrap();
        store.put(b"chunk/m1/0000000001", b"b").unwrap();

        let rows = store.prefix_scan(b"chunk/m1/").unwrap();
        let values: Vec<_> = rows.into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_batch_write_mixes_puts_and_deletes() {
        let mut store = InMemoryKVStore::new();
        store.put(b"old", b"1").unwrap();
        store
            .atomic_batch_write(vec![
                BatchOperation::delete(b"old".to_vec()),
                BatchOperation::put(b"new".to_vec(), b"2".to_vec()),
            ])
            .unwrap();
        assert!(!store.exists(b"old").unwrap());
        assert_eq!(store.get(b"new").unwrap(), Some(b"2".to_vec()));
    }
}
