//! # P2P Node
//!
//! [`P2pNode`] owns one QUIC endpoint and all per-node peer state. It is a
//! cheap `Clone` handle; several nodes can live in one process.
//!
//! ## Streams
//!
//! Every stream starts with a [`shared_types::StreamHeader`]. Identify, peer
//! exchange and relay are served by the node itself; everything else is
//! dispatched to the [`ProtocolHandler`] registered for the protocol id.
//!
//! ## Background tasks
//!
//! - accept loop (one per node)
//! - stream loop and close watcher (one each per connection)
//! - re-sync tick: peer exchange, reservation renewal, bootstrap redial

mod connection;
mod exchange;
mod relay;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use libp2p_identity::Keypair;
use multiaddr::Multiaddr;
use parking_lot::{Mutex, RwLock};
use quinn::Connection;
use shared_types::{
    FrameStream, PeerDirectory, PeerId, ProtocolHandler, StreamHeader, StreamOpener,
    SystemTimeSource, TimeSource, TransportError,
};
use tokio::sync::{broadcast, watch};
use tracing::info;

use crate::adapters::load_or_generate;
use crate::config::NodeConfig;
use crate::domain::{
    peer_id_of, quic_multiaddr, with_peer_id, ConnectionStatus, NodeError, PeerBook, ReservationPool,
    VerifiedIdentity,
};
use crate::transport::{self, QuicTransport};

pub use exchange::{ExchangeOutcome, SkipReason};
pub use relay::HeldReservation;

const EVENT_CAPACITY: usize = 256;

/// Observable changes in the node's peer set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    PeerConnected { peer: PeerId, relay: Option<PeerId> },
    PeerDisconnected { peer: PeerId },
    PeerDiscovered { peer: PeerId, addrs: Vec<Multiaddr> },
    ReservationAccepted { relay: PeerId, expires_at: u64 },
}

struct ConnectionEntry {
    connection: Connection,
    identity: VerifiedIdentity,
}

pub(crate) struct NodeInner {
    keypair: Keypair,
    local_peer: PeerId,
    config: NodeConfig,
    transport: QuicTransport,
    listen_addrs: Vec<Multiaddr>,
    connections: RwLock<HashMap<PeerId, ConnectionEntry>>,
    /// Relayed peer -> relay carrying its circuits.
    relay_routes: RwLock<HashMap<PeerId, PeerId>>,
    handlers: RwLock<HashMap<String, Arc<dyn ProtocolHandler>>>,
    book: Mutex<PeerBook>,
    /// Reservations this node grants as a relay.
    reservations: Mutex<ReservationPool>,
    /// Reservations this node holds on relays.
    held: Mutex<HashMap<PeerId, HeldReservation>>,
    bootstrap_peers: Vec<(PeerId, Multiaddr)>,
    exchange_target: RwLock<Option<PeerId>>,
    events: broadcast::Sender<NodeEvent>,
    shutdown: watch::Sender<bool>,
    time: Arc<dyn TimeSource>,
}

/// Handle to a running peer node.
#[derive(Clone)]
pub struct P2pNode {
    inner: Arc<NodeInner>,
}

impl P2pNode {
    /// Load (or create) the identity from `config.identity_path` and start.
    pub async fn start(config: NodeConfig) -> Result<Self, NodeError> {
        let keypair = load_or_generate(config.identity_path.as_deref())?;
        Self::start_with_keypair(config, keypair).await
    }

    /// Bind the endpoint, spawn background tasks and dial bootstrap peers.
    pub async fn start_with_keypair(config: NodeConfig, keypair: Keypair) -> Result<Self, NodeError> {
        let transport = QuicTransport::bind(config.listen_addr, &config.transport)?;
        let local_addr = transport.local_addr()?;
        let listen_addrs = if config.announce_addrs.is_empty() {
            vec![quic_multiaddr(local_addr)]
        } else {
            config.announce_addrs.clone()
        };

        let bootstrap_peers: Vec<(PeerId, Multiaddr)> = config
            .bootstrap_peers
            .iter()
            .filter_map(|addr| match peer_id_of(addr) {
                Some(peer) => Some((peer, addr.clone())),
                None => {
                    tracing::warn!(addr = %addr, "[dw-01] Bootstrap address has no /p2p/ id, ignoring");
                    None
                }
            })
            .collect();

        let local_peer = keypair.public().to_peer_id();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        let reservations =
            ReservationPool::new(config.relay.max_reservations, config.relay.reservation_ttl());

        let node = Self {
            inner: Arc::new(NodeInner {
                keypair,
                local_peer,
                config,
                transport,
                listen_addrs,
                connections: RwLock::new(HashMap::new()),
                relay_routes: RwLock::new(HashMap::new()),
                handlers: RwLock::new(HashMap::new()),
                book: Mutex::new(PeerBook::new()),
                reservations: Mutex::new(reservations),
                held: Mutex::new(HashMap::new()),
                bootstrap_peers,
                exchange_target: RwLock::new(None),
                events,
                shutdown,
                time: Arc::new(SystemTimeSource),
            }),
        };

        info!(
            peer = %local_peer,
            addr = %local_addr,
            relay = node.inner.config.relay.enabled,
            "[dw-01] 🚀 Node listening"
        );

        node.spawn_accept_loop();
        node.spawn_maintenance();
        node.dial_bootstrap_peers();
        Ok(node)
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.inner.local_peer
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// Advertised addresses, each ending in `/p2p/<local peer id>`.
    pub fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.inner
            .listen_addrs
            .iter()
            .map(|a| with_peer_id(a, self.inner.local_peer))
            .collect()
    }

    /// Serve `handler.protocol()` on inbound streams.
    pub fn register_handler(&self, handler: Arc<dyn ProtocolHandler>) {
        let protocol = handler.protocol().to_string();
        info!(protocol = %protocol, "[dw-01] Registered protocol handler");
        self.inner.handlers.write().insert(protocol, handler);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.inner.events.subscribe()
    }

    /// Peers reachable directly or through a relay.
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.inner.book.lock().connected()
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.inner.book.lock().status(peer).is_connected()
    }

    pub fn connection_status(&self, peer: &PeerId) -> ConnectionStatus {
        self.inner.book.lock().status(peer)
    }

    /// Known addresses for `peer`.
    pub fn peer_addrs(&self, peer: &PeerId) -> Vec<Multiaddr> {
        self.inner.book.lock().addrs(peer)
    }

    /// Reservations currently granted by this node as a relay.
    pub fn granted_reservations(&self) -> usize {
        self.inner.reservations.lock().len()
    }

    /// Reservations this node holds on relays.
    pub fn held_reservations(&self) -> Vec<HeldReservation> {
        self.inner.held.lock().values().cloned().collect()
    }

    /// Stop background tasks and close every connection.
    pub fn shutdown(&self) {
        if self.inner.shutdown.send_replace(true) {
            return;
        }
        info!(peer = %self.inner.local_peer, "[dw-01] 🛑 Node shutting down");
        for (_, entry) in self.inner.connections.write().drain() {
            entry.connection.close(quinn::VarInt::from_u32(0), b"shutdown");
        }
        self.inner.transport.close();
    }

    fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    fn emit(&self, event: NodeEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn direct_connection(&self, peer: &PeerId) -> Option<Connection> {
        self.inner
            .connections
            .read()
            .get(peer)
            .map(|entry| entry.connection.clone())
    }

    fn is_bootstrap(&self, peer: &PeerId) -> bool {
        self.inner.bootstrap_peers.iter().any(|(p, _)| p == peer)
    }
}

#[async_trait]
impl StreamOpener for P2pNode {
    async fn open_stream(
        &self,
        peer: &PeerId,
        protocol: &str,
    ) -> Result<Box<dyn FrameStream>, TransportError> {
        if self.is_shut_down() {
            return Err(TransportError::Shutdown);
        }
        if let Some(connection) = self.direct_connection(peer) {
            let stream = transport::open_stream(&connection, &StreamHeader::new(protocol))
                .await
                .map_err(|reason| TransportError::StreamFailed {
                    peer: peer.to_string(),
                    reason,
                })?;
            return Ok(transport::boxed(stream));
        }

        let relay = self.inner.relay_routes.read().get(peer).copied();
        match relay {
            Some(relay) => self.open_circuit(&relay, peer, protocol).await,
            None => Err(TransportError::NotConnected {
                peer: peer.to_string(),
            }),
        }
    }

    fn local_peer_id(&self) -> PeerId {
        self.inner.local_peer
    }
}

impl PeerDirectory for P2pNode {
    fn connected_peers(&self) -> Vec<PeerId> {
        P2pNode::connected_peers(self)
    }
}
