//! Peer exchange (client and server), auto-dial and the re-sync tick.

use std::time::Duration;

use multiaddr::Multiaddr;
use shared_types::{read_json, write_json, FrameStream, PeerId, StreamOpener, PEER_EXCHANGE_PROTOCOL};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{NodeEvent, P2pNode};
use crate::domain::{
    build_response, circuit_addr, is_circuit, usable_peers, ExchangeMessage, NodeError, PeerInfo,
};

/// Why an exchange request was not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No target given and no peer connected.
    NoTarget,
    /// Last sync with the target was under the minimum interval ago.
    Throttled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Skipped(SkipReason),
    Completed {
        target: PeerId,
        /// Records in the response.
        received: usize,
        /// Peers a dial was scheduled for.
        scheduled: usize,
    },
}

impl P2pNode {
    /// Ask `target` (or a connected bootstrap peer, the last target, or
    /// any connected peer) for the peers it knows, then dial the new ones.
    pub async fn request_peer_exchange(
        &self,
        target: Option<PeerId>,
        reason: &str,
        force: bool,
    ) -> Result<ExchangeOutcome, NodeError> {
        let Some(target) = target.or_else(|| self.default_exchange_target()) else {
            debug!(reason = %reason, "[dw-01] No peer to exchange with");
            return Ok(ExchangeOutcome::Skipped(SkipReason::NoTarget));
        };

        let min_interval = self.inner.config.exchange.min_interval();
        {
            let mut book = self.inner.book.lock();
            let now = Instant::now();
            if !force && !book.sync_due(&target, now, min_interval) {
                debug!(peer = %target, reason = %reason, "[dw-01] Exchange throttled");
                return Ok(ExchangeOutcome::Skipped(SkipReason::Throttled));
            }
            book.record_sync(target, now);
        }
        *self.inner.exchange_target.write() = Some(target);

        let known = self.connected_peers();
        let request = ExchangeMessage::request(reason, &known);
        let mut stream = self.open_stream(&target, PEER_EXCHANGE_PROTOCOL).await?;
        let timeout = self.inner.config.exchange.timeout();
        let result = tokio::time::timeout(timeout, async {
            write_json(&mut stream, &request).await?;
            Ok::<ExchangeMessage, NodeError>(read_json(&mut stream).await?)
        })
        .await;
        let _ = stream.close().await;

        let reply = result.map_err(|_| NodeError::timeout("peer exchange", timeout))??;
        match reply {
            ExchangeMessage::Response { peers, .. } => {
                let received = peers.len();
                let scheduled = self.ingest_peers(&peers);
                info!(
                    peer = %target,
                    reason = %reason,
                    received,
                    scheduled,
                    "[dw-01] 🔄 Peer exchange complete"
                );
                Ok(ExchangeOutcome::Completed {
                    target,
                    received,
                    scheduled,
                })
            }
            ExchangeMessage::Error { reason, .. } => Err(NodeError::Refused(reason)),
            other => Err(NodeError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    fn default_exchange_target(&self) -> Option<PeerId> {
        let connected = self.connected_peers();
        let bootstrap = self
            .inner
            .bootstrap_peers
            .iter()
            .map(|(peer, _)| *peer)
            .find(|peer| connected.contains(peer));
        let last = (*self.inner.exchange_target.read()).filter(|peer| connected.contains(peer));
        bootstrap.or(last).or_else(|| connected.first().copied())
    }

    /// Merge usable records into the peer book and schedule a dial for each
    /// peer not already connected or being dialed.
    pub fn ingest_peers(&self, peers: &[PeerInfo]) -> usize {
        let delay = self.inner.config.exchange.ingest_dial_delay();
        let mut scheduled = 0;
        for (peer, addrs) in usable_peers(&self.inner.local_peer, peers) {
            if self.discover(peer, addrs, delay) {
                scheduled += 1;
            }
        }
        scheduled
    }

    /// Record a discovered peer and auto-dial it after `delay`. Returns
    /// `true` if a dial was scheduled.
    pub fn discover(&self, peer: PeerId, addrs: Vec<Multiaddr>, delay: Duration) -> bool {
        if peer == self.inner.local_peer {
            return false;
        }
        let added = self
            .inner
            .book
            .lock()
            .merge_addrs(peer, &addrs, Instant::now());
        if added > 0 {
            self.emit(NodeEvent::PeerDiscovered {
                peer,
                addrs: addrs.clone(),
            });
        }
        self.schedule_dial(peer, addrs, delay)
    }

    /// Dial `peer` in the background unless it is connected or a dial is in
    /// flight. Direct addresses are tried before circuits.
    pub(super) fn schedule_dial(&self, peer: PeerId, mut addrs: Vec<Multiaddr>, delay: Duration) -> bool {
        if !self.inner.book.lock().begin_dial(peer) {
            return false;
        }
        addrs.sort_by_key(is_circuit);

        let node = self.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            node.dial_with_retry(peer, &addrs).await;
        });
        true
    }

    /// Up to `max_attempts` passes over `addrs` with linear backoff. Gives
    /// up with a log line, never an error.
    pub(super) async fn dial_with_retry(&self, peer: PeerId, addrs: &[Multiaddr]) {
        let dial = &self.inner.config.dial;
        let attempts = dial.max_attempts.max(1);

        for attempt in 1..=attempts {
            if self.is_shut_down() {
                break;
            }
            for addr in addrs {
                match self.dial(addr).await {
                    Ok(dialed) if dialed == peer => {
                        debug!(peer = %peer, addr = %addr, attempt, "[dw-01] Dial succeeded");
                        return;
                    }
                    Ok(other) => {
                        warn!(expected = %peer, actual = %other, addr = %addr, "[dw-01] Dialed a different peer");
                    }
                    Err(e) => debug!(peer = %peer, addr = %addr, attempt, error = %e, "[dw-01] Dial failed"),
                }
            }
            if attempt < attempts {
                tokio::time::sleep(dial.backoff(attempt)).await;
            }
        }

        self.inner.book.lock().end_dial(&peer);
        warn!(peer = %peer, attempts, "[dw-01] Giving up on peer");
    }

    /// Settle, exchange peers with the bootstrap node and ask it for a
    /// relay reservation.
    pub(super) fn on_bootstrap_connected(&self, peer: PeerId) {
        let node = self.clone();
        let settle = self.inner.config.exchange.settle_delay();
        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            if let Err(e) = node.request_peer_exchange(Some(peer), "bootstrap", false).await {
                warn!(peer = %peer, error = %e, "[dw-01] Bootstrap peer exchange failed");
            }
        });

        let node = self.clone();
        tokio::spawn(async move {
            if let Err(e) = node.reserve(&peer).await {
                debug!(relay = %peer, error = %e, "[dw-01] Relay reservation not granted");
            }
        });
    }

    /// Server side: one request, one response, close.
    pub(super) async fn serve_exchange<S: FrameStream>(&self, remote: PeerId, mut stream: S) {
        let timeout = self.inner.config.exchange.timeout();
        let reply = match tokio::time::timeout(timeout, read_json::<ExchangeMessage, _>(&mut stream)).await {
            Ok(Ok(ExchangeMessage::Request { reason, .. })) => {
                debug!(peer = %remote, reason = ?reason, "[dw-01] Serving peer exchange");
                build_response(&remote, self.exchange_entries())
            }
            Ok(Ok(_)) => ExchangeMessage::error("unexpected-message"),
            Ok(Err(e)) => ExchangeMessage::error(e.to_string()),
            Err(_) => ExchangeMessage::error("timeout"),
        };
        if let Err(e) = write_json(&mut stream, &reply).await {
            debug!(peer = %remote, error = %e, "[dw-01] Failed to write exchange reply");
        }
        let _ = stream.close().await;
    }

    /// Every connected peer with a circuit address through this node
    /// followed by the addresses it advertised.
    fn exchange_entries(&self) -> Vec<(PeerId, Vec<Multiaddr>)> {
        let local = self.inner.local_peer;
        let book = self.inner.book.lock();
        let connections = self.inner.connections.read();
        book.connected()
            .into_iter()
            .map(|peer| {
                let mut addrs: Vec<Multiaddr> = self
                    .inner
                    .listen_addrs
                    .iter()
                    .map(|listen| circuit_addr(listen, local, peer))
                    .collect();
                let advertised = match connections.get(&peer) {
                    Some(entry) => entry.identity.listen_addrs.clone(),
                    None => book.addrs(&peer),
                };
                for addr in advertised {
                    if !addrs.contains(&addr) {
                        addrs.push(addr);
                    }
                }
                (peer, addrs)
            })
            .collect()
    }

    /// Re-sync tick: exchange with the last target, renew reservations and
    /// redial bootstrap peers that dropped.
    pub(super) fn spawn_maintenance(&self) {
        let node = self.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        let period = self.inner.config.exchange.resync_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => node.resync().await,
                    _ = shutdown.changed() => break,
                }
            }
        });
    }

    async fn resync(&self) {
        self.inner.reservations.lock().prune(Instant::now());
        self.dial_bootstrap_peers();

        let target = *self.inner.exchange_target.read();
        if let Some(target) = target {
            if let Err(e) = self.request_peer_exchange(Some(target), "resync", false).await {
                debug!(peer = %target, error = %e, "[dw-01] Re-sync exchange failed");
            }
        }
        self.renew_reservations().await;
    }
}
