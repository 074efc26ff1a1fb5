use super::memory::InMemoryKVStore;
use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore, ScanResult};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// File-backed key-value store.
///
/// The whole map lives in memory and is rewritten to disk after every
/// mutation via a temp file and rename, so a crash leaves either the old or
/// the new snapshot. A sibling `.lock` file holds an exclusive advisory lock
/// for the lifetime of the store.
///
/// Record format: `[key_len:u32 LE][key][value_len:u32 LE][value]...`
pub struct FileBackedKVStore {
    inner: InMemoryKVStore,
    path: PathBuf,
    _lock: File,
}

impl FileBackedKVStore {
    /// Open (or create) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, KVStoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let lock_path = path.with_extension("lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        lock.try_lock_exclusive().map_err(|_| KVStoreError::Locked {
            path: path.display().to_string(),
        })?;

        let data = Self::load_from_file(&path)?;
        if data.is_empty() {
            tracing::info!("[dw-04] 📁 No existing registry data at {}", path.display());
        } else {
            tracing::info!(
                "[dw-04] 💾 Loaded {} keys from {}",
                data.len(),
                path.display()
            );
        }

        Ok(Self {
            inner: InMemoryKVStore::from_map(data),
            path,
            _lock: lock,
        })
    }

    fn load_from_file(path: &Path) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, KVStoreError> {
        let mut bytes = Vec::new();
        match File::open(path) {
            Ok(mut file) => {
                file.read_to_end(&mut bytes)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        }

        let mut data = BTreeMap::new();
        let mut cursor = 0;
        while cursor < bytes.len() {
            let key = read_field(&bytes, &mut cursor)?;
            let value = read_field(&bytes, &mut cursor)?;
            data.insert(key, value);
        }
        Ok(data)
    }

    fn save_to_file(&self) -> Result<(), KVStoreError> {
        let mut bytes = Vec::new();
        for (key, value) in self.inner.as_map() {
            bytes.extend_from_slice(&(key.len() as u32).to_le_bytes());
            bytes.extend_from_slice(key);
            bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
            bytes.extend_from_slice(value);
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

fn read_field(bytes: &[u8], cursor: &mut usize) -> Result<Vec<u8>, KVStoreError> {
    let corrupt = |what: &str| KVStoreError::CorruptionError {
        message: format!("truncated {what} at offset {}", *cursor),
    };
    let len_bytes: [u8; 4] = bytes
        .get(*cursor..*cursor + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| corrupt("length"))?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    let field = bytes
        .get(*cursor + 4..*cursor + 4 + len)
        .ok_or_else(|| corrupt("field"))?
        .to_vec();
    *cursor += 4 + len;
    Ok(field)
}

impl KeyValueStore for FileBackedKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.inner.get(key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.inner.put(key, value)?;
        self.save_to_file()
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.inner.delete(key)?;
        self.save_to_file()
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        let snapshot = self.inner.as_map().clone();
        self.inner.apply(operations);
        if let Err(e) = self.save_to_file() {
            self.inner = InMemoryKVStore::from_map(snapshot);
            return Err(e);
        }
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        self.inner.exists(key)
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        Ok(self.inner.scan(prefix))
    }
}
