//! Node configuration.
//!
//! Every field has a default so a TOML file only needs to name what it
//! changes. Durations are stored as integer seconds or milliseconds.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use multiaddr::Multiaddr;
use serde::{Deserialize, Serialize};

/// Default QUIC listen port.
pub const DEFAULT_LISTEN_PORT: u16 = 4001;

/// Top-level configuration of a [`crate::P2pNode`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// UDP address the QUIC endpoint binds to.
    pub listen_addr: SocketAddr,
    /// Publicly reachable addresses to advertise instead of the bound one.
    pub announce_addrs: Vec<Multiaddr>,
    /// Bootstrap peers, each ending in `/p2p/<peer id>`.
    pub bootstrap_peers: Vec<Multiaddr>,
    /// Where the ed25519 identity is kept. `None` means ephemeral.
    pub identity_path: Option<PathBuf>,
    /// Register the `/dweb/kad/1.0.0` server handler.
    pub dht_server_mode: bool,
    pub transport: TransportConfig,
    pub relay: RelayConfig,
    pub exchange: ExchangeConfig,
    pub dial: DialConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_LISTEN_PORT)),
            announce_addrs: Vec::new(),
            bootstrap_peers: Vec::new(),
            identity_path: None,
            dht_server_mode: false,
            transport: TransportConfig::default(),
            relay: RelayConfig::default(),
            exchange: ExchangeConfig::default(),
            dial: DialConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Long-lived relay node: relay serving and DHT server mode on.
    pub fn bootstrap() -> Self {
        Self {
            dht_server_mode: true,
            relay: RelayConfig {
                enabled: true,
                ..RelayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Loopback config with an OS-assigned port and short timeouts.
    pub fn for_testing() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            transport: TransportConfig {
                connect_timeout_ms: 2_000,
                idle_timeout_secs: 5,
                keep_alive_secs: 1,
                max_streams: 64,
            },
            exchange: ExchangeConfig {
                settle_delay_ms: 50,
                ingest_dial_delay_ms: 20,
                ..ExchangeConfig::default()
            },
            dial: DialConfig {
                max_attempts: 2,
                backoff_ms: 100,
            },
            ..Self::default()
        }
    }
}

/// QUIC endpoint parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub connect_timeout_ms: u64,
    pub idle_timeout_secs: u64,
    /// Keep-alive interval; 0 disables keep-alives.
    pub keep_alive_secs: u64,
    /// Maximum concurrent bidirectional streams per connection.
    pub max_streams: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            idle_timeout_secs: 30,
            keep_alive_secs: 15,
            max_streams: 256,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        (self.keep_alive_secs > 0).then(|| Duration::from_secs(self.keep_alive_secs))
    }
}

/// Circuit relay: serving side and client-side renewal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Accept reservations and circuits from other peers.
    pub enabled: bool,
    /// Concurrent reservations held by this relay.
    pub max_reservations: usize,
    pub reservation_ttl_secs: u64,
    /// Renew a held reservation once it is this close to expiring.
    pub renew_before_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_reservations: 100,
            reservation_ttl_secs: 3_600,
            renew_before_secs: 300,
        }
    }
}

impl RelayConfig {
    pub fn reservation_ttl(&self) -> Duration {
        Duration::from_secs(self.reservation_ttl_secs)
    }

    pub fn renew_before(&self) -> Duration {
        Duration::from_secs(self.renew_before_secs)
    }
}

/// Peer-exchange timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Delay after connecting to a bootstrap peer before the first exchange.
    pub settle_delay_ms: u64,
    /// Minimum spacing of unforced exchanges with the same target.
    pub min_interval_ms: u64,
    /// Deadline for one exchange round trip.
    pub timeout_ms: u64,
    /// Periodic re-sync against the last target.
    pub resync_interval_secs: u64,
    /// Delay before dialing a peer learned from an exchange.
    pub ingest_dial_delay_ms: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 500,
            min_interval_ms: 5_000,
            timeout_ms: 10_000,
            resync_interval_secs: 30,
            ingest_dial_delay_ms: 200,
        }
    }
}

impl ExchangeConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn ingest_dial_delay(&self) -> Duration {
        Duration::from_millis(self.ingest_dial_delay_ms)
    }
}

/// Auto-dial retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialConfig {
    pub max_attempts: u32,
    /// Linear backoff step: attempt `n` waits `n * backoff` before retrying.
    pub backoff_ms: u64,
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1_000,
        }
    }
}

impl DialConfig {
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}
