//! DHT configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Replication factor: records go to this many closest peers.
pub const K_VALUE: usize = 20;

/// Default deadline for a domain lookup.
pub const DEFAULT_GET_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DhtConfig {
    /// Default lookup deadline in milliseconds.
    pub get_timeout_ms: u64,
    /// Peers a record is replicated to.
    pub replication_factor: usize,
    /// Deadline for one peer round trip in milliseconds.
    pub request_timeout_ms: u64,
    /// Serve `/dweb/kad/1.0.0` for other peers.
    pub server_mode: bool,
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self {
            get_timeout_ms: DEFAULT_GET_TIMEOUT.as_millis() as u64,
            replication_factor: K_VALUE,
            request_timeout_ms: 5_000,
            server_mode: true,
        }
    }
}

impl DhtConfig {
    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.get_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
