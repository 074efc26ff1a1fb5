//! # Peer Discovery & Relay (dw-01)
//!
//! The QUIC peer node every dweb process runs. One [`P2pNode`] owns an
//! endpoint, a persistent ed25519 identity and all per-node peer state.
//!
//! ## Protocols served by the node
//!
//! | Protocol | Purpose |
//! |----------|---------|
//! | `/dweb/identify/1.0.0` | First stream on every connection; signed listen addresses |
//! | `/dweb/peer-exchange/1.0.0` | Request/serve known peers with relay-qualified addresses |
//! | `/dweb/relay/1.0.0` | Reservations and circuits (when relay serving is enabled) |
//!
//! Other protocols (`/dweb/chunk/1.0.0`, `/dweb/kad/1.0.0`) are served by
//! handlers registered with [`P2pNode::register_handler`]. The node
//! implements [`shared_types::StreamOpener`] and
//! [`shared_types::PeerDirectory`] for those crates.
//!
//! ## Discovery
//!
//! - connect to a bootstrap peer: exchange after a settle delay, reserve a relay slot
//! - exchange responses and discovery events: merge addresses, auto-dial (3 tries, linear backoff)
//! - every 30 s: re-sync with the last exchange target, renew expiring reservations
//!
//! ## Crate Structure
//!
//! - `domain/` - addresses, peer book, exchange/identify/relay messages, reservation pool
//! - `adapters/` - identity persistence
//! - `transport/` - quinn endpoint and TLS
//! - `service/` - `P2pNode`

pub mod adapters;
pub mod config;
pub mod domain;
pub mod service;
pub mod transport;

pub use adapters::load_or_generate;
pub use config::{DialConfig, ExchangeConfig, NodeConfig, RelayConfig, TransportConfig};
pub use domain::{
    circuit_addr, ConnectionStatus, DialTarget, ExchangeMessage, NodeError, PeerBook, PeerInfo,
    RelayMessage,
};
pub use service::{ExchangeOutcome, HeldReservation, NodeEvent, P2pNode, SkipReason};

pub use libp2p_identity::Keypair;
