//! Test doubles for the transport ports.
//!
//! [`InMemoryNetwork`] wires protocol handlers together over
//! `tokio::io::duplex` pipes so protocol crates can be tested without QUIC.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use libp2p_identity::PeerId;
use parking_lot::RwLock;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

use crate::errors::TransportError;
use crate::frame::{FrameStream, FramedStream};
use crate::ports::{PeerDirectory, ProtocolHandler, StreamOpener, TimeSource};

/// Framed stream over one end of a duplex pipe.
pub type DuplexFramed = FramedStream<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

/// Two connected framed streams.
pub fn duplex_pair() -> (DuplexFramed, DuplexFramed) {
    let (a, b) = tokio::io::duplex(1024 * 1024);
    let (ar, aw) = tokio::io::split(a);
    let (br, bw) = tokio::io::split(b);
    (FramedStream::new(ar, aw), FramedStream::new(br, bw))
}

/// Controllable clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now: AtomicU64,
}

impl ManualTimeSource {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

type HandlerTable = Arc<RwLock<HashMap<String, Arc<dyn ProtocolHandler>>>>;

/// A set of in-process peers that can open streams to each other.
#[derive(Default)]
pub struct InMemoryNetwork {
    nodes: RwLock<HashMap<PeerId, HandlerTable>>,
}

impl InMemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Join the network under a fresh random peer id.
    pub fn join(self: &Arc<Self>) -> MemoryEndpoint {
        self.join_as(PeerId::random())
    }

    /// Join the network under `peer`.
    pub fn join_as(self: &Arc<Self>, peer: PeerId) -> MemoryEndpoint {
        self.nodes.write().entry(peer).or_default();
        MemoryEndpoint {
            network: Arc::clone(self),
            peer,
        }
    }

    /// Remove `peer`; later streams to it fail with `NotConnected`.
    pub fn leave(&self, peer: &PeerId) {
        self.nodes.write().remove(peer);
    }
}

/// One peer's view of an [`InMemoryNetwork`].
#[derive(Clone)]
pub struct MemoryEndpoint {
    network: Arc<InMemoryNetwork>,
    peer: PeerId,
}

impl MemoryEndpoint {
    pub fn peer_id(&self) -> PeerId {
        self.peer
    }

    pub fn register_handler(&self, handler: Arc<dyn ProtocolHandler>) {
        let nodes = self.network.nodes.read();
        if let Some(table) = nodes.get(&self.peer) {
            table.write().insert(handler.protocol().to_string(), handler);
        }
    }
}

#[async_trait]
impl StreamOpener for MemoryEndpoint {
    async fn open_stream(
        &self,
        peer: &PeerId,
        protocol: &str,
    ) -> Result<Box<dyn FrameStream>, TransportError> {
        let handler = {
            let nodes = self.network.nodes.read();
            let table = nodes.get(peer).ok_or_else(|| TransportError::NotConnected {
                peer: peer.to_string(),
            })?;
            let handlers = table.read();
            handlers
                .get(protocol)
                .cloned()
                .ok_or_else(|| TransportError::UnsupportedProtocol {
                    peer: peer.to_string(),
                    protocol: protocol.to_string(),
                })?
        };

        let (client, server) = duplex_pair();
        let remote = self.peer;
        tokio::spawn(async move {
            handler.handle(remote, Box::new(server)).await;
        });
        Ok(Box::new(client))
    }

    fn local_peer_id(&self) -> PeerId {
        self.peer
    }
}

impl PeerDirectory for MemoryEndpoint {
    fn connected_peers(&self) -> Vec<PeerId> {
        self.network
            .nodes
            .read()
            .keys()
            .filter(|peer| **peer != self.peer)
            .copied()
            .collect()
    }
}
