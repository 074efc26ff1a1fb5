//! Chunk transfer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default per-exchange timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default number of peer-uploaded chunks kept in memory.
pub const DEFAULT_RECEIVED_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkTransferConfig {
    /// Timeout for one request/response or upload/ack exchange.
    pub request_timeout_secs: u64,
    /// Recompute the hash of uploaded data and nack on mismatch.
    pub verify_upload_hash: bool,
    /// Capacity of the received-chunk cache.
    pub received_capacity: usize,
}

impl Default for ChunkTransferConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            verify_upload_hash: true,
            received_capacity: DEFAULT_RECEIVED_CAPACITY,
        }
    }
}

impl ChunkTransferConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
