//! # Registry Service
//!
//! Authoritative store for manifests, per-chunk pointer/replica state,
//! pointer history and domain bindings.
//!
//! ## Module Structure
//!
//! - `repository` - key schema and typed record access
//! - `manifests` - publish, read, list, replica announcements
//! - `chunks` - chunk reads, pointer updates, pointer history
//! - `domains` - first-writer-wins domain bindings
//! - `maintenance` - expiry sweep
//!
//! ## Concurrency
//!
//! All operations take one lock over the store and the history clocks, so
//! every request is a single writer and the sweep interleaves with pointer
//! updates only at request boundaries.

mod chunks;
mod domains;
mod maintenance;
mod manifests;
mod repository;


pub use chunks::PointerHistoryPage;
pub use maintenance::{run_sweep_once, spawn_pointer_sweep, PruneReport};

use std::sync::Arc;

use parking_lot::Mutex;
use shared_types::{SystemTimeSource, TimeSource};

use crate::adapters::InMemoryKVStore;
use crate::config::{RegistryConfig, HISTORY_PAGE_CAP};
use crate::domain::errors::RegistryError;
use crate::ports::KeyValueStore;
use repository::RegistryState;

/// The registry service.
pub struct RegistryService {
    state: Mutex<RegistryState>,
    time: Arc<dyn TimeSource>,
    history_page_limit: usize,
}

impl RegistryService {
    /// Create a service over `store`.
    pub fn new(
        store: Box<dyn KeyValueStore>,
        time: Arc<dyn TimeSource>,
        config: &RegistryConfig,
    ) -> Self {
        Self {
            state: Mutex::new(RegistryState::new(store)),
            time,
            history_page_limit: config.history_page_limit.clamp(1, HISTORY_PAGE_CAP),
        }
    }

    /// In-memory service on the system clock.
    pub fn in_memory() -> Self {
        Self::new(
            Box::new(InMemoryKVStore::new()),
            Arc::new(SystemTimeSource),
            &RegistryConfig::default(),
        )
    }

    /// Service over the store selected by `config.data_path`.
    pub fn open(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let store: Box<dyn KeyValueStore> = match &config.data_path {
            #[cfg(feature = "file-store")]
            Some(path) => Box::new(crate::adapters::FileBackedKVStore::open(path)?),
            #[cfg(not(feature = "file-store"))]
            Some(path) => {
                return Err(RegistryError::Storage(format!(
                    "file store disabled, cannot open {}",
                    path.display()
                )))
            }
            None => Box::new(InMemoryKVStore::new()),
        };
        Ok(Self::new(store, Arc::new(SystemTimeSource), config))
    }

    fn now(&self) -> u64 {
        self.time.now_millis()
    }
}
