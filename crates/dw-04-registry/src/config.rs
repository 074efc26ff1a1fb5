//! Registry configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Maximum history entries returned per request.
pub const HISTORY_PAGE_CAP: usize = 100;

/// Registry service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Bind address for the REST server.
    pub host: IpAddr,
    /// Bind port for the REST server.
    pub port: u16,
    /// Data file for the file-backed store. `None` keeps everything in memory.
    pub data_path: Option<PathBuf>,
    /// Expiry sweep interval in seconds.
    pub prune_interval_secs: u64,
    /// History page size cap.
    pub history_page_limit: usize,
    /// Maximum request body in bytes.
    pub max_body_bytes: usize,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Allowed CORS origins (`*` for any).
    pub cors_allowed_origins: Vec<String>,
    /// Per-IP rate limiting.
    pub rate_limit: RateLimitConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8787,
            data_path: None,
            prune_interval_secs: 300,
            history_page_limit: HISTORY_PAGE_CAP,
            max_body_bytes: 16 * 1024 * 1024,
            request_timeout_secs: 30,
            cors_allowed_origins: vec!["*".to_string()],
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl RegistryConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Token-bucket limits applied per client IP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained requests per second per IP.
    pub requests_per_second: u32,
    /// Burst allowance.
    pub burst_size: u32,
    /// Enable rate limiting.
    pub enabled: bool,
    /// IPs exempt from rate limiting.
    pub whitelist: Vec<IpAddr>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 50,
            burst_size: 100,
            enabled: true,
            whitelist: Vec::new(),
        }
    }
}
