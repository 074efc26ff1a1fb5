//! Per-node peer state: known addresses, connection status, dial attempts
//! and exchange sync stamps.
//!
//! Records are ephemeral. A disconnect removes the record and clears the
//! peer from the dial-attempt set so a later discovery can dial again.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use multiaddr::Multiaddr;
use shared_types::PeerId;
use tokio::time::Instant;

/// How a peer is currently reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Known address, no connection.
    Discovered,
    /// Direct QUIC connection.
    Direct,
    /// Reached through a relay circuit.
    Relayed { relay: PeerId },
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        !matches!(self, ConnectionStatus::Discovered)
    }
}

#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub peer_id: PeerId,
    pub addrs: Vec<Multiaddr>,
    pub status: ConnectionStatus,
    pub first_seen: Instant,
    pub last_sync: Option<Instant>,
}

impl PeerRecord {
    fn new(peer_id: PeerId, now: Instant) -> Self {
        Self {
            peer_id,
            addrs: Vec::new(),
            status: ConnectionStatus::Discovered,
            first_seen: now,
            last_sync: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct PeerBook {
    records: HashMap<PeerId, PeerRecord>,
    dial_attempts: HashSet<PeerId>,
    last_sync: HashMap<PeerId, Instant>,
}

impl PeerBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge addresses into the record, creating it if needed. Returns the
    /// number of addresses that were new.
    pub fn merge_addrs(&mut self, peer: PeerId, addrs: &[Multiaddr], now: Instant) -> usize {
        let record = self
            .records
            .entry(peer)
            .or_insert_with(|| PeerRecord::new(peer, now));
        let mut added = 0;
        for addr in addrs {
            if !record.addrs.contains(addr) {
                record.addrs.push(addr.clone());
                added += 1;
            }
        }
        added
    }

    pub fn mark_connected(&mut self, peer: PeerId, status: ConnectionStatus, now: Instant) {
        let record = self
            .records
            .entry(peer)
            .or_insert_with(|| PeerRecord::new(peer, now));
        record.status = status;
        self.dial_attempts.remove(&peer);
    }

    /// Drop the record on disconnect.
    pub fn remove(&mut self, peer: &PeerId) -> Option<PeerRecord> {
        self.dial_attempts.remove(peer);
        self.records.remove(peer)
    }

    pub fn get(&self, peer: &PeerId) -> Option<&PeerRecord> {
        self.records.get(peer)
    }

    pub fn addrs(&self, peer: &PeerId) -> Vec<Multiaddr> {
        self.records
            .get(peer)
            .map(|r| r.addrs.clone())
            .unwrap_or_default()
    }

    pub fn status(&self, peer: &PeerId) -> ConnectionStatus {
        self.records
            .get(peer)
            .map(|r| r.status)
            .unwrap_or(ConnectionStatus::Discovered)
    }

    pub fn connected(&self) -> Vec<PeerId> {
        self.records
            .values()
            .filter(|r| r.status.is_connected())
            .map(|r| r.peer_id)
            .collect()
    }

    /// Claim the right to dial `peer`. `false` if a dial is already in
    /// flight or the peer is connected.
    pub fn begin_dial(&mut self, peer: PeerId) -> bool {
        if self.status(&peer).is_connected() {
            return false;
        }
        self.dial_attempts.insert(peer)
    }

    /// Release a dial claim after the attempt gave up.
    pub fn end_dial(&mut self, peer: &PeerId) {
        self.dial_attempts.remove(peer);
    }

    pub fn is_dialing(&self, peer: &PeerId) -> bool {
        self.dial_attempts.contains(peer)
    }

    /// `true` if an unforced exchange with `peer` may run now.
    pub fn sync_due(&self, peer: &PeerId, now: Instant, min_interval: Duration) -> bool {
        match self.last_sync.get(peer) {
            Some(last) => now.saturating_duration_since(*last) >= min_interval,
            None => true,
        }
    }

    pub fn record_sync(&mut self, peer: PeerId, now: Instant) {
        self.last_sync.insert(peer, now);
        if let Some(record) = self.records.get_mut(&peer) {
            record.last_sync = Some(now);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> Multiaddr {
        format!("/ip4/127.0.0.1/udp/{port}/quic-v1").parse().unwrap()
    }

    #[test]
    fn test_merge_dedups_addresses() {
        let mut book = PeerBook::new();
        let peer = PeerId::random();
        let now = Instant::now();
        assert_eq!(book.merge_addrs(peer, &[addr(1), addr(2)], now), 2);
        assert_eq!(book.merge_addrs(peer, &[addr(2), addr(3)], now), 1);
        assert_eq!(book.addrs(&peer), vec![addr(1), addr(2), addr(3)]);
        assert_eq!(book.status(&peer), ConnectionStatus::Discovered);
    }

    #[test]
    fn test_dial_attempts_are_deduplicated() {
        let mut book = PeerBook::new();
        let peer = PeerId::random();
        assert!(book.begin_dial(peer));
        assert!(!book.begin_dial(peer));
        book.end_dial(&peer);
        assert!(book.begin_dial(peer));
    }

    #[test]
    fn test_connected_peer_is_not_dialed_and_disconnect_removes_record() {
        let mut book = PeerBook::new();
        let peer = PeerId::random();
        let now = Instant::now();
        book.begin_dial(peer);
        book.mark_connected(peer, ConnectionStatus::Direct, now);
        assert!(!book.is_dialing(&peer));
        assert!(!book.begin_dial(peer));
        assert_eq!(book.connected(), vec![peer]);

        assert!(book.remove(&peer).is_some());
        assert!(book.connected().is_empty());
        assert!(book.begin_dial(peer));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_interval() {
        let mut book = PeerBook::new();
        let peer = PeerId::random();
        let interval = Duration::from_secs(5);
        assert!(book.sync_due(&peer, Instant::now(), interval));

        book.record_sync(peer, Instant::now());
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(!book.sync_due(&peer, Instant::now(), interval));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(book.sync_due(&peer, Instant::now(), interval));
    }
}
