//! `/dweb/relay/1.0.0` messages and the relay's reservation pool.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_types::PeerId;
use tokio::time::Instant;

pub const REASON_POOL_FULL: &str = "reservation-refused";
pub const REASON_NO_RESERVATION: &str = "no-reservation";
pub const REASON_RELAY_DISABLED: &str = "relay-disabled";
pub const REASON_TARGET_UNREACHABLE: &str = "target-unreachable";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RelayMessage {
    Reserve,
    ReserveOk {
        /// Circuit addresses through which the reserving peer is reachable.
        addrs: Vec<String>,
        /// Epoch millis.
        #[serde(rename = "expiresAt")]
        expires_at: u64,
    },
    Connect {
        target: String,
        protocol: String,
    },
    ConnectOk,
    Refused {
        reason: String,
    },
}

impl RelayMessage {
    pub fn refused(reason: &str) -> Self {
        RelayMessage::Refused {
            reason: reason.to_string(),
        }
    }
}

/// Bounded set of reservations with a fixed time to live.
#[derive(Debug)]
pub struct ReservationPool {
    max: usize,
    ttl: Duration,
    reservations: HashMap<PeerId, Instant>,
}

impl ReservationPool {
    pub fn new(max: usize, ttl: Duration) -> Self {
        Self {
            max,
            ttl,
            reservations: HashMap::new(),
        }
    }

    /// Grant or renew a reservation. `None` when the pool is full.
    pub fn reserve(&mut self, peer: PeerId, now: Instant) -> Option<Instant> {
        self.prune(now);
        if !self.reservations.contains_key(&peer) && self.reservations.len() >= self.max {
            return None;
        }
        let expires = now + self.ttl;
        self.reservations.insert(peer, expires);
        Some(expires)
    }

    pub fn is_reserved(&self, peer: &PeerId, now: Instant) -> bool {
        self.reservations
            .get(peer)
            .is_some_and(|expires| *expires > now)
    }

    pub fn release(&mut self, peer: &PeerId) {
        self.reservations.remove(peer);
    }

    /// Drop expired reservations, returning how many went.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.reservations.len();
        self.reservations.retain(|_, expires| *expires > now);
        before - self.reservations.len()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }
}
