//! # Node Configuration
//!
//! One TOML file configures every role. Each section is optional and falls
//! back to the subsystem defaults:
//!
//! ```toml
//! data_dir = "./data"
//! log_level = "info"
//!
//! [node]
//! listen_addr = "0.0.0.0:4001"
//! bootstrap_peers = ["/ip4/10.0.0.1/udp/4001/quic-v1/p2p/12D3KooW..."]
//!
//! [registry]
//! port = 8787
//!
//! [resolver]
//! registry_url = "http://127.0.0.1:8787"
//! ```
//!
//! `DWEB_*` environment variables override the file.

use std::path::{Path, PathBuf};

use dw_01_peer_discovery::NodeConfig;
use dw_02_chunk_transfer::ChunkTransferConfig;
use dw_03_domain_dht::DhtConfig;
use dw_04_registry::RegistryConfig;
use dw_05_resolver::ResolverConfig;
use serde::{Deserialize, Serialize};
use shared_types::Multiaddr;
use thiserror::Error;

pub const ENV_LISTEN_PORT: &str = "DWEB_LISTEN_PORT";
pub const ENV_REGISTRY_PORT: &str = "DWEB_REGISTRY_PORT";
pub const ENV_BOOTSTRAP: &str = "DWEB_BOOTSTRAP";
pub const ENV_DATA_DIR: &str = "DWEB_DATA_DIR";
pub const ENV_REGISTRY_URL: &str = "DWEB_REGISTRY_URL";

const IDENTITY_FILE: &str = "identity.key";
const REGISTRY_FILE: &str = "registry.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: {reason}")]
    Env { var: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DwebConfig {
    /// Identity key and registry data live here unless set explicitly.
    pub data_dir: PathBuf,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_level: String,
    pub node: NodeConfig,
    pub chunks: ChunkTransferConfig,
    pub dht: DhtConfig,
    pub registry: RegistryConfig,
    pub resolver: ResolverConfig,
}

impl Default for DwebConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            node: NodeConfig::default(),
            chunks: ChunkTransferConfig::default(),
            dht: DhtConfig::default(),
            registry: RegistryConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl DwebConfig {
    /// Read `path` when given, then apply the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `DWEB_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(ENV_LISTEN_PORT) {
            self.node.listen_addr.set_port(parse_port(ENV_LISTEN_PORT, &port)?);
        }
        if let Some(port) = lookup(ENV_REGISTRY_PORT) {
            self.registry.port = parse_port(ENV_REGISTRY_PORT, &port)?;
        }
        if let Some(list) = lookup(ENV_BOOTSTRAP) {
            self.node.bootstrap_peers = list
                .split(',')
                .map(str::trim)
                .filter(|addr| !addr.is_empty())
                .map(|addr| {
                    addr.parse::<Multiaddr>().map_err(|e| ConfigError::Env {
                        var: ENV_BOOTSTRAP,
                        reason: format!("{addr}: {e}"),
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup(ENV_REGISTRY_URL) {
            self.resolver.registry_url = url;
        }
        Ok(())
    }

    /// Identity key path: explicit setting, else `<data_dir>/identity.key`.
    pub fn identity_path(&self) -> PathBuf {
        self.node
            .identity_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(IDENTITY_FILE))
    }

    /// Registry data file: explicit setting, else `<data_dir>/registry.json`.
    pub fn registry_data_path(&self) -> PathBuf {
        self.registry
            .data_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(REGISTRY_FILE))
    }
}

fn parse_port(var: &'static str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|e| ConfigError::Env {
        var,
        reason: format!("{value:?}: {e}"),
    })
}
