//! Resolver configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default registry endpoint.
pub const DEFAULT_REGISTRY_URL: &str = "http://127.0.0.1:8787";

/// Default publisher chunk size (256 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Default number of chunks kept by the resolver cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Registry base URL, no trailing slash.
    pub registry_url: String,
    /// Serve from the local cache before asking anyone else.
    pub prefer_cache: bool,
    /// Chunks held by the in-process cache before the oldest are dropped.
    pub cache_capacity: usize,
    /// Allow the pointer and inline tiers once the peer tier fails.
    pub registry_fallback: bool,
    /// Bound on handing a request to the background peer bridge.
    pub peer_queue_timeout_ms: u64,
    /// Deadline for a DHT domain lookup.
    pub dht_timeout_ms: u64,
    /// Per-request timeout for registry and pointer HTTP calls.
    pub http_timeout_ms: u64,
    /// Check per-chunk hashes of peer data and the whole-file hash.
    pub verify_hashes: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            prefer_cache: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            registry_fallback: true,
            peer_queue_timeout_ms: 2_000,
            dht_timeout_ms: 10_000,
            http_timeout_ms: 15_000,
            verify_hashes: true,
        }
    }
}

impl ResolverConfig {
    pub fn peer_queue_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_queue_timeout_ms)
    }

    pub fn dht_timeout(&self) -> Duration {
        Duration::from_millis(self.dht_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}
