//! Circuit relay: reservations, circuit setup and half-duplex forwarding.

use std::time::Duration;

use multiaddr::Multiaddr;
use shared_types::{
    read_json, write_json, FrameStream, PeerId, StreamHeader, TransportError, IDENTIFY_PROTOCOL,
    RELAY_PROTOCOL,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{NodeEvent, P2pNode};
use crate::domain::relay::{
    REASON_NO_RESERVATION, REASON_POOL_FULL, REASON_RELAY_DISABLED, REASON_TARGET_UNREACHABLE,
};
use crate::domain::{circuit_addr, NodeError, RelayMessage};
use crate::transport::{self, QuicStream};

/// Deadline for a reserve or connect round trip.
const RELAY_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A circuit is torn down when neither side sends a frame for this long.
const CIRCUIT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// A reservation this node holds on a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldReservation {
    pub relay: PeerId,
    /// Circuit addresses other peers can dial us on.
    pub addrs: Vec<Multiaddr>,
    /// Epoch millis.
    pub expires_at: u64,
}

impl P2pNode {
    /// Ask `relay` for a reservation so peers can reach us through it.
    pub async fn reserve(&self, relay: &PeerId) -> Result<HeldReservation, NodeError> {
        let connection = self
            .direct_connection(relay)
            .ok_or_else(|| TransportError::NotConnected {
                peer: relay.to_string(),
            })?;
        let mut stream = transport::open_stream(&connection, &StreamHeader::new(RELAY_PROTOCOL))
            .await
            .map_err(|reason| TransportError::StreamFailed {
                peer: relay.to_string(),
                reason,
            })?;

        let result = tokio::time::timeout(RELAY_REQUEST_TIMEOUT, async {
            write_json(&mut stream, &RelayMessage::Reserve).await?;
            Ok::<RelayMessage, NodeError>(read_json(&mut stream).await?)
        })
        .await;
        let _ = stream.close().await;

        match result.map_err(|_| NodeError::timeout("relay reservation", RELAY_REQUEST_TIMEOUT))?? {
            RelayMessage::ReserveOk { addrs, expires_at } => {
                let held = HeldReservation {
                    relay: *relay,
                    addrs: addrs.iter().filter_map(|a| a.parse().ok()).collect(),
                    expires_at,
                };
                self.inner.held.lock().insert(*relay, held.clone());
                info!(relay = %relay, expires_at, "[dw-01] 📡 Relay reservation accepted");
                self.emit(NodeEvent::ReservationAccepted {
                    relay: *relay,
                    expires_at,
                });
                Ok(held)
            }
            RelayMessage::Refused { reason } => Err(NodeError::Refused(reason)),
            other => Err(NodeError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    /// Renew every held reservation that expires within the renewal window.
    pub(super) async fn renew_reservations(&self) {
        let now = self.inner.time.now_millis();
        let window = self.inner.config.relay.renew_before().as_millis() as u64;
        let due: Vec<PeerId> = self
            .inner
            .held
            .lock()
            .values()
            .filter(|held| held.expires_at.saturating_sub(now) <= window)
            .map(|held| held.relay)
            .collect();

        for relay in due {
            match self.reserve(&relay).await {
                Ok(_) => debug!(relay = %relay, "[dw-01] Reservation renewed"),
                Err(e) => {
                    warn!(relay = %relay, error = %e, "[dw-01] Reservation renewal failed");
                    self.inner.held.lock().remove(&relay);
                }
            }
        }
    }

    /// Open a circuit to `target` through `relay`. The returned stream is
    /// positioned after the relay's `connect-ok`.
    pub(super) async fn open_circuit(
        &self,
        relay: &PeerId,
        target: &PeerId,
        protocol: &str,
    ) -> Result<Box<dyn FrameStream>, TransportError> {
        let stream_failed = |reason: String| TransportError::StreamFailed {
            peer: target.to_string(),
            reason,
        };
        let connection = self
            .direct_connection(relay)
            .ok_or_else(|| TransportError::NotConnected {
                peer: relay.to_string(),
            })?;
        let mut stream = transport::open_stream(&connection, &StreamHeader::new(RELAY_PROTOCOL))
            .await
            .map_err(stream_failed)?;

        let connect = RelayMessage::Connect {
            target: target.to_string(),
            protocol: protocol.to_string(),
        };
        let reply = tokio::time::timeout(RELAY_REQUEST_TIMEOUT, async {
            write_json(&mut stream, &connect).await?;
            read_json::<RelayMessage, _>(&mut stream).await
        })
        .await;

        match reply {
            Ok(Ok(RelayMessage::ConnectOk)) => Ok(transport::boxed(stream)),
            Ok(Ok(RelayMessage::Refused { reason })) => {
                let _ = stream.close().await;
                Err(TransportError::RelayRefused {
                    relay: relay.to_string(),
                    reason,
                })
            }
            Ok(Ok(other)) => {
                let _ = stream.close().await;
                Err(stream_failed(format!("unexpected relay reply: {other:?}")))
            }
            Ok(Err(e)) => {
                let _ = stream.close().await;
                Err(stream_failed(e.to_string()))
            }
            Err(_) => {
                let _ = stream.close().await;
                Err(stream_failed("relay connect timed out".into()))
            }
        }
    }

    /// Reach `target` through `relay` and identify over the circuit.
    pub(super) async fn connect_via_relay(&self, relay: PeerId, target: PeerId) -> Result<(), NodeError> {
        let mut stream = self.open_circuit(&relay, &target, IDENTIFY_PROTOCOL).await?;
        let result = tokio::time::timeout(
            RELAY_REQUEST_TIMEOUT,
            self.identify_exchange(&mut stream, true),
        )
        .await;
        let _ = stream.close().await;

        let identity = match result {
            Ok(Ok(identity)) => identity,
            Ok(Err(reason)) => {
                return Err(NodeError::Handshake {
                    addr: format!("{relay}/p2p-circuit/{target}"),
                    reason,
                })
            }
            Err(_) => return Err(NodeError::timeout("relayed identify", RELAY_REQUEST_TIMEOUT)),
        };
        if identity.peer != target {
            return Err(NodeError::Handshake {
                addr: format!("{relay}/p2p-circuit/{target}"),
                reason: format!("expected {target}, got {}", identity.peer),
            });
        }
        self.record_relayed_peer(relay, target, &identity.listen_addrs);
        Ok(())
    }

    /// Relay side of `/dweb/relay/1.0.0`.
    pub(super) async fn serve_relay(&self, remote: PeerId, mut stream: QuicStream) {
        let request = match tokio::time::timeout(RELAY_REQUEST_TIMEOUT, read_json::<RelayMessage, _>(&mut stream)).await {
            Ok(Ok(request)) => request,
            Ok(Err(e)) => {
                debug!(peer = %remote, error = %e, "[dw-01] Bad relay request");
                let _ = stream.close().await;
                return;
            }
            Err(_) => {
                let _ = stream.close().await;
                return;
            }
        };

        if !self.inner.config.relay.enabled {
            respond(&mut stream, &RelayMessage::refused(REASON_RELAY_DISABLED)).await;
            return;
        }

        match request {
            RelayMessage::Reserve => {
                let reply = self.grant_reservation(remote);
                respond(&mut stream, &reply).await;
            }
            RelayMessage::Connect { target, protocol } => {
                self.serve_connect(remote, &target, &protocol, stream).await;
            }
            _ => respond(&mut stream, &RelayMessage::refused("unexpected-message")).await,
        }
    }

    fn grant_reservation(&self, remote: PeerId) -> RelayMessage {
        let granted = self.inner.reservations.lock().reserve(remote, Instant::now());
        if granted.is_none() {
            warn!(peer = %remote, "[dw-01] Reservation pool full");
            return RelayMessage::refused(REASON_POOL_FULL);
        }

        let ttl = self.inner.config.relay.reservation_ttl();
        let expires_at = self.inner.time.now_millis() + ttl.as_millis() as u64;
        let addrs = self
            .inner
            .listen_addrs
            .iter()
            .map(|listen| circuit_addr(listen, self.inner.local_peer, remote).to_string())
            .collect();
        info!(peer = %remote, expires_at, "[dw-01] 📡 Reservation granted");
        RelayMessage::ReserveOk { addrs, expires_at }
    }

    async fn serve_connect(&self, remote: PeerId, target: &str, protocol: &str, mut stream: QuicStream) {
        let Ok(target) = target.parse::<PeerId>() else {
            respond(&mut stream, &RelayMessage::refused(REASON_TARGET_UNREACHABLE)).await;
            return;
        };
        if !self.inner.reservations.lock().is_reserved(&target, Instant::now()) {
            respond(&mut stream, &RelayMessage::refused(REASON_NO_RESERVATION)).await;
            return;
        }
        let Some(connection) = self.direct_connection(&target) else {
            respond(&mut stream, &RelayMessage::refused(REASON_TARGET_UNREACHABLE)).await;
            return;
        };

        let header = StreamHeader::relayed(protocol, remote.to_string());
        let mut outbound = match transport::open_stream(&connection, &header).await {
            Ok(outbound) => outbound,
            Err(reason) => {
                debug!(target = %target, reason = %reason, "[dw-01] Circuit stream to target failed");
                respond(&mut stream, &RelayMessage::refused(REASON_TARGET_UNREACHABLE)).await;
                return;
            }
        };

        if write_json(&mut stream, &RelayMessage::ConnectOk).await.is_err() {
            let _ = stream.close().await;
            let _ = outbound.close().await;
            return;
        }
        debug!(from = %remote, to = %target, protocol = %protocol, "[dw-01] Circuit open");
        let frames = splice(&mut stream, &mut outbound).await;
        debug!(from = %remote, to = %target, frames, "[dw-01] Circuit closed");
    }
}

async fn respond(stream: &mut QuicStream, message: &RelayMessage) {
    let _ = write_json(stream, message).await;
    let _ = stream.close().await;
}

/// Forward frames turn by turn: initiator to target, then target to
/// initiator, until either side ends its stream or goes idle. Returns the
/// number of frames forwarded.
pub(crate) async fn splice<A, B>(initiator: &mut A, target: &mut B) -> usize
where
    A: FrameStream + ?Sized,
    B: FrameStream + ?Sized,
{
    let mut forwarded = 0;
    loop {
        if !forward(initiator, target).await {
            break;
        }
        forwarded += 1;
        if !forward(target, initiator).await {
            break;
        }
        forwarded += 1;
    }
    let _ = initiator.close().await;
    let _ = target.close().await;
    forwarded
}

async fn forward<F, T>(from: &mut F, to: &mut T) -> bool
where
    F: FrameStream + ?Sized,
    T: FrameStream + ?Sized,
{
    match tokio::time::timeout(CIRCUIT_IDLE_TIMEOUT, from.read_frame()).await {
        Ok(Ok(Some(frame))) => to.write_frame(&frame).await.is_ok(),
        _ => false,
    }
}
