//! Multiaddr handling for the QUIC transport.
//!
//! Direct:  `/ip4/<ip>/udp/<port>/quic-v1/p2p/<peer>`
//! Circuit: `<relay direct addr>/p2p-circuit/p2p/<target>`

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use multiaddr::{Multiaddr, Protocol};
use shared_types::PeerId;

use super::errors::NodeError;

/// A parsed dial target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialTarget {
    Direct {
        socket: SocketAddr,
        peer: Option<PeerId>,
    },
    Circuit {
        relay_addr: Multiaddr,
        relay: PeerId,
        target: PeerId,
    },
}

impl DialTarget {
    /// Peer the address names, if any.
    pub fn peer(&self) -> Option<PeerId> {
        match self {
            DialTarget::Direct { peer, .. } => *peer,
            DialTarget::Circuit { target, .. } => Some(*target),
        }
    }
}

fn invalid(addr: &Multiaddr, reason: &str) -> NodeError {
    NodeError::InvalidAddress {
        addr: addr.to_string(),
        reason: reason.to_string(),
    }
}

/// Classify `addr` as a direct QUIC address or a relay circuit.
pub fn parse_dial_target(addr: &Multiaddr) -> Result<DialTarget, NodeError> {
    let mut relay_part = Multiaddr::empty();
    let mut after_circuit: Option<Multiaddr> = None;

    for protocol in addr.iter() {
        if let Some(rest) = after_circuit.as_mut() {
            rest.push(protocol);
        } else if matches!(protocol, Protocol::P2pCircuit) {
            after_circuit = Some(Multiaddr::empty());
        } else {
            relay_part.push(protocol);
        }
    }

    match after_circuit {
        None => {
            let (socket, peer) = split_direct(&relay_part).ok_or_else(|| {
                invalid(addr, "expected /ip4|ip6/<ip>/udp/<port>/quic-v1[/p2p/<id>]")
            })?;
            Ok(DialTarget::Direct { socket, peer })
        }
        Some(rest) => {
            let (_, relay) = split_direct(&relay_part)
                .ok_or_else(|| invalid(addr, "relay part is not a QUIC address"))?;
            let relay = relay.ok_or_else(|| invalid(addr, "relay part needs /p2p/<relay id>"))?;
            let target = last_peer_id(&rest)
                .ok_or_else(|| invalid(addr, "circuit needs /p2p/<target id>"))?;
            Ok(DialTarget::Circuit {
                relay_addr: relay_part,
                relay,
                target,
            })
        }
    }
}

/// `(socket, peer)` of a direct QUIC multiaddr.
fn split_direct(addr: &Multiaddr) -> Option<(SocketAddr, Option<PeerId>)> {
    let mut ip: Option<IpAddr> = None;
    let mut port: Option<u16> = None;
    let mut quic = false;
    let mut peer = None;

    for protocol in addr.iter() {
        match protocol {
            Protocol::Ip4(v4) => ip = Some(IpAddr::V4(v4)),
            Protocol::Ip6(v6) => ip = Some(IpAddr::V6(v6)),
            Protocol::Udp(p) => port = Some(p),
            Protocol::QuicV1 | Protocol::Quic => quic = true,
            Protocol::P2p(id) => peer = Some(id),
            _ => return None,
        }
    }

    match (ip, port, quic) {
        (Some(ip), Some(port), true) => Some((SocketAddr::new(ip, port), peer)),
        _ => None,
    }
}

fn last_peer_id(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter()
        .filter_map(|p| match p {
            Protocol::P2p(id) => Some(id),
            _ => None,
        })
        .last()
}

/// Peer id carried by the last `/p2p/` component.
pub fn peer_id_of(addr: &Multiaddr) -> Option<PeerId> {
    last_peer_id(addr)
}

/// `/ip4/<ip>/udp/<port>/quic-v1`. An unspecified bind address is
/// advertised as loopback.
pub fn quic_multiaddr(socket: SocketAddr) -> Multiaddr {
    let ip = match socket.ip() {
        ip if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        ip => ip,
    };
    let base = match ip {
        IpAddr::V4(v4) => Multiaddr::empty().with(Protocol::Ip4(v4)),
        IpAddr::V6(v6) => Multiaddr::empty().with(Protocol::Ip6(v6)),
    };
    base.with(Protocol::Udp(socket.port())).with(Protocol::QuicV1)
}

/// Append `/p2p/<peer>` unless the address already ends in a peer id.
pub fn with_peer_id(addr: &Multiaddr, peer: PeerId) -> Multiaddr {
    match addr.iter().last() {
        Some(Protocol::P2p(_)) => addr.clone(),
        _ => addr.clone().with(Protocol::P2p(peer)),
    }
}

/// `<relay addr>/p2p/<relay>/p2p-circuit/p2p/<target>`.
pub fn circuit_addr(relay_addr: &Multiaddr, relay: PeerId, target: PeerId) -> Multiaddr {
    with_peer_id(relay_addr, relay)
        .with(Protocol::P2pCircuit)
        .with(Protocol::P2p(target))
}

pub fn is_circuit(addr: &Multiaddr) -> bool {
    addr.iter().any(|p| matches!(p, Protocol::P2pCircuit))
}
