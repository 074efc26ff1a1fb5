//! Connection lifecycle: dial, accept, identify, stream dispatch and
//! disconnect cleanup.

use std::time::Duration;

use multiaddr::Multiaddr;
use quinn::Connection;
use shared_types::{
    read_json, write_json, FrameStream, PeerId, StreamHeader, StreamRejection, IDENTIFY_PROTOCOL,
    PEER_EXCHANGE_PROTOCOL, RELAY_PROTOCOL,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{ConnectionEntry, NodeEvent, P2pNode};
use crate::domain::{
    parse_dial_target, with_peer_id, ConnectionStatus, DialTarget, IdentifyMessage, NodeError,
    VerifiedIdentity,
};
use crate::transport::{self, QuicStream};

/// Deadline for the header frame on an inbound stream.
const HEADER_TIMEOUT: Duration = Duration::from_secs(10);

impl P2pNode {
    /// Dial `addr` and complete the identify handshake. Circuit addresses
    /// connect to the relay first and route later streams through it.
    pub async fn dial(&self, addr: &Multiaddr) -> Result<PeerId, NodeError> {
        match parse_dial_target(addr)? {
            DialTarget::Direct { socket, peer } => self.dial_direct(socket, peer).await,
            DialTarget::Circuit {
                relay_addr,
                relay,
                target,
            } => {
                if self.is_connected(&target) {
                    return Ok(target);
                }
                if self.direct_connection(&relay).is_none() {
                    let DialTarget::Direct { socket, .. } = parse_dial_target(&relay_addr)? else {
                        return Err(NodeError::InvalidAddress {
                            addr: addr.to_string(),
                            reason: "nested circuit".into(),
                        });
                    };
                    self.dial_direct(socket, Some(relay)).await?;
                }
                self.connect_via_relay(relay, target).await?;
                Ok(target)
            }
        }
    }

    async fn dial_direct(
        &self,
        socket: std::net::SocketAddr,
        expected: Option<PeerId>,
    ) -> Result<PeerId, NodeError> {
        if let Some(peer) = expected {
            if self.direct_connection(&peer).is_some() {
                return Ok(peer);
            }
        }
        let connection = self.inner.transport.connect(socket).await?;

        let handshake = async {
            let mut stream =
                transport::open_stream(&connection, &StreamHeader::new(IDENTIFY_PROTOCOL)).await?;
            let identity = self.identify_exchange(&mut stream, true).await;
            let _ = stream.close().await;
            identity
        };
        let identity = match tokio::time::timeout(self.inner.config.transport.connect_timeout(), handshake).await {
            Ok(Ok(identity)) => identity,
            Ok(Err(reason)) => {
                connection.close(quinn::VarInt::from_u32(1), b"identify failed");
                return Err(NodeError::Handshake {
                    addr: socket.to_string(),
                    reason,
                });
            }
            Err(_) => {
                connection.close(quinn::VarInt::from_u32(1), b"identify timeout");
                return Err(NodeError::Handshake {
                    addr: socket.to_string(),
                    reason: "timed out".into(),
                });
            }
        };

        if let Some(expected) = expected {
            if identity.peer != expected {
                connection.close(quinn::VarInt::from_u32(1), b"unexpected peer");
                return Err(NodeError::Handshake {
                    addr: socket.to_string(),
                    reason: format!("expected {expected}, got {}", identity.peer),
                });
            }
        }

        let peer = identity.peer;
        self.register_connection(connection, identity);
        Ok(peer)
    }

    /// Send our identify message and read theirs, in the order given by
    /// `initiator`.
    pub(super) async fn identify_exchange<S>(
        &self,
        stream: &mut S,
        initiator: bool,
    ) -> Result<VerifiedIdentity, String>
    where
        S: FrameStream + ?Sized,
    {
        let local = IdentifyMessage::signed(
            &self.inner.keypair,
            &self.inner.listen_addrs,
            self.protocols(),
        )
        .map_err(|e| e.to_string())?;

        if initiator {
            write_json(stream, &local).await.map_err(|e| e.to_string())?;
        }
        let remote: IdentifyMessage = read_json(stream).await.map_err(|e| e.to_string())?;
        let identity = remote.verify()?;
        if !initiator {
            write_json(stream, &local).await.map_err(|e| e.to_string())?;
        }
        Ok(identity)
    }

    fn protocols(&self) -> Vec<String> {
        let mut protocols = vec![
            IDENTIFY_PROTOCOL.to_string(),
            PEER_EXCHANGE_PROTOCOL.to_string(),
        ];
        if self.inner.config.relay.enabled {
            protocols.push(RELAY_PROTOCOL.to_string());
        }
        protocols.extend(self.inner.handlers.read().keys().cloned());
        protocols
    }

    pub(super) fn spawn_accept_loop(&self) {
        let node = self.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    incoming = node.inner.transport.accept() => {
                        let Some(incoming) = incoming else { break };
                        let node = node.clone();
                        tokio::spawn(async move { node.handle_incoming(incoming).await });
                    }
                    _ = shutdown.changed() => break,
                }
            }
            debug!("[dw-01] Accept loop stopped");
        });
    }

    async fn handle_incoming(&self, incoming: quinn::Incoming) {
        let remote_addr = incoming.remote_address();
        let connection = match incoming.await {
            Ok(connection) => connection,
            Err(e) => {
                debug!(addr = %remote_addr, error = %e, "[dw-01] Inbound handshake failed");
                return;
            }
        };

        let handshake = async {
            let mut stream = transport::accept_stream(&connection)
                .await
                .ok_or_else(|| "connection closed before identify".to_string())?;
            let header: StreamHeader = read_json(&mut stream).await.map_err(|e| e.to_string())?;
            if header.protocol != IDENTIFY_PROTOCOL {
                return Err(format!("expected identify, got {}", header.protocol));
            }
            let identity = self.identify_exchange(&mut stream, false).await;
            let _ = stream.close().await;
            identity
        };

        match tokio::time::timeout(self.inner.config.transport.connect_timeout(), handshake).await {
            Ok(Ok(identity)) => self.register_connection(connection, identity),
            Ok(Err(reason)) => {
                warn!(addr = %remote_addr, reason = %reason, "[dw-01] Inbound identify failed");
                connection.close(quinn::VarInt::from_u32(1), b"identify failed");
            }
            Err(_) => {
                warn!(addr = %remote_addr, "[dw-01] Inbound identify timed out");
                connection.close(quinn::VarInt::from_u32(1), b"identify timeout");
            }
        }
    }

    fn register_connection(&self, connection: Connection, identity: VerifiedIdentity) {
        let peer = identity.peer;
        let stable_id = connection.stable_id();
        let remote_addr = connection.remote_address();

        {
            let mut book = self.inner.book.lock();
            book.merge_addrs(peer, &identity.listen_addrs, Instant::now());
            book.mark_connected(peer, ConnectionStatus::Direct, Instant::now());
        }
        self.inner.relay_routes.write().remove(&peer);
        self.inner.connections.write().insert(
            peer,
            ConnectionEntry {
                connection: connection.clone(),
                identity,
            },
        );

        info!(peer = %peer, addr = %remote_addr, "[dw-01] 🤝 Peer connected");
        self.emit(NodeEvent::PeerConnected { peer, relay: None });

        self.spawn_stream_loop(peer, connection.clone());
        self.spawn_close_watcher(peer, connection, stable_id);

        if self.is_bootstrap(&peer) {
            self.on_bootstrap_connected(peer);
        }
    }

    fn spawn_stream_loop(&self, peer: PeerId, connection: Connection) {
        let node = self.clone();
        tokio::spawn(async move {
            while let Some(stream) = transport::accept_stream(&connection).await {
                let node = node.clone();
                tokio::spawn(async move { node.dispatch(peer, stream).await });
            }
        });
    }

    fn spawn_close_watcher(&self, peer: PeerId, connection: Connection, stable_id: usize) {
        let node = self.clone();
        tokio::spawn(async move {
            let reason = connection.closed().await;
            let current = {
                let mut connections = node.inner.connections.write();
                let current = connections
                    .get(&peer)
                    .is_some_and(|entry| entry.connection.stable_id() == stable_id);
                if current {
                    connections.remove(&peer);
                }
                current
            };
            // A newer connection to the same peer replaced this one.
            if current {
                debug!(peer = %peer, reason = %reason, "[dw-01] Connection closed");
                node.on_disconnected(peer);
            }
        });
    }

    /// Forget `peer` and every circuit routed through it.
    fn on_disconnected(&self, peer: PeerId) {
        let orphaned: Vec<PeerId> = {
            let mut routes = self.inner.relay_routes.write();
            let orphaned: Vec<PeerId> = routes
                .iter()
                .filter(|(_, relay)| **relay == peer)
                .map(|(target, _)| *target)
                .collect();
            for target in &orphaned {
                routes.remove(target);
            }
            routes.remove(&peer);
            orphaned
        };

        {
            let mut book = self.inner.book.lock();
            book.remove(&peer);
            for target in &orphaned {
                book.remove(target);
            }
        }
        self.inner.reservations.lock().release(&peer);
        self.inner.held.lock().remove(&peer);

        info!(peer = %peer, "[dw-01] 👋 Peer disconnected");
        self.emit(NodeEvent::PeerDisconnected { peer });
        for target in orphaned {
            self.emit(NodeEvent::PeerDisconnected { peer: target });
        }
    }

    /// Route one inbound stream. `via` is the peer on the other end of the
    /// QUIC connection; relayed streams name their origin in the header.
    async fn dispatch(&self, via: PeerId, mut stream: QuicStream) {
        let header = match tokio::time::timeout(HEADER_TIMEOUT, read_json::<StreamHeader, _>(&mut stream)).await {
            Ok(Ok(header)) => header,
            Ok(Err(e)) => {
                debug!(peer = %via, error = %e, "[dw-01] Bad stream header");
                let _ = stream.close().await;
                return;
            }
            Err(_) => {
                debug!(peer = %via, "[dw-01] Stream header timed out");
                let _ = stream.close().await;
                return;
            }
        };

        let remote = match header.initiator.as_deref().map(str::parse::<PeerId>) {
            None => via,
            Some(Ok(initiator)) => initiator,
            Some(Err(_)) => {
                reject(&mut stream, &header.protocol).await;
                return;
            }
        };
        let relayed = remote != via;

        match header.protocol.as_str() {
            IDENTIFY_PROTOCOL if relayed => self.serve_relayed_identify(via, remote, stream).await,
            PEER_EXCHANGE_PROTOCOL => self.serve_exchange(remote, stream).await,
            RELAY_PROTOCOL if !relayed => self.serve_relay(remote, stream).await,
            protocol => {
                let handler = self.inner.handlers.read().get(protocol).cloned();
                match handler {
                    Some(handler) => handler.handle(remote, transport::boxed(stream)).await,
                    None => {
                        debug!(peer = %remote, protocol = %protocol, "[dw-01] Unsupported protocol");
                        reject(&mut stream, protocol).await;
                    }
                }
            }
        }
    }

    /// A peer reached us through `relay`: answer its identify and route
    /// our streams to it back through the same relay.
    async fn serve_relayed_identify(&self, relay: PeerId, remote: PeerId, mut stream: QuicStream) {
        let result = self.identify_exchange(&mut stream, false).await;
        let _ = stream.close().await;
        match result {
            Ok(identity) if identity.peer == remote => {
                self.record_relayed_peer(relay, remote, &identity.listen_addrs);
            }
            Ok(identity) => warn!(
                claimed = %remote,
                actual = %identity.peer,
                "[dw-01] Relayed identify does not match circuit initiator"
            ),
            Err(reason) => debug!(peer = %remote, reason = %reason, "[dw-01] Relayed identify failed"),
        }
    }

    pub(super) fn record_relayed_peer(&self, relay: PeerId, peer: PeerId, addrs: &[Multiaddr]) {
        if self.direct_connection(&peer).is_some() {
            return;
        }
        self.inner.relay_routes.write().insert(peer, relay);
        {
            let mut book = self.inner.book.lock();
            book.merge_addrs(peer, addrs, Instant::now());
            book.mark_connected(peer, ConnectionStatus::Relayed { relay }, Instant::now());
        }
        info!(peer = %peer, relay = %relay, "[dw-01] 🔀 Peer reachable via relay");
        self.emit(NodeEvent::PeerConnected {
            peer,
            relay: Some(relay),
        });
    }

    pub(super) fn dial_bootstrap_peers(&self) {
        for (peer, addr) in self.inner.bootstrap_peers.clone() {
            if self.is_connected(&peer) {
                continue;
            }
            self.schedule_dial(peer, vec![with_peer_id(&addr, peer)], Duration::ZERO);
        }
    }
}

async fn reject(stream: &mut QuicStream, protocol: &str) {
    let _ = write_json(stream, &StreamRejection::unsupported(protocol)).await;
    let _ = stream.close().await;
}
