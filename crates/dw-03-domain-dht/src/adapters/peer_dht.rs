//! Record DHT over connected peers on `/dweb/kad/1.0.0`.
//!
//! Puts land in the local table and on the `k` connected peers closest to
//! the key. Gets check the local table, then ask the closest peers one at a
//! time until one has the value.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use shared_types::{
    read_json, write_json, FrameStream, PeerDirectory, PeerId, ProtocolHandler, StreamOpener,
    KAD_PROTOCOL,
};
use tracing::{debug, info};

use crate::config::DhtConfig;
use crate::domain::{closest_peers, DhtError, KadMessage};
use crate::ports::DhtStore;

type RecordTable = Arc<RwLock<HashMap<String, Vec<u8>>>>;

pub struct PeerRecordDht {
    records: RecordTable,
    opener: Arc<dyn StreamOpener>,
    directory: Arc<dyn PeerDirectory>,
    replication: usize,
    request_timeout: Duration,
}

impl PeerRecordDht {
    pub fn new(
        opener: Arc<dyn StreamOpener>,
        directory: Arc<dyn PeerDirectory>,
        config: &DhtConfig,
    ) -> Self {
        Self {
            records: RecordTable::default(),
            opener,
            directory,
            replication: config.replication_factor.max(1),
            request_timeout: config.request_timeout(),
        }
    }

    /// Server-side handler sharing this node's record table.
    pub fn handler(&self) -> KadProtocolHandler {
        KadProtocolHandler {
            records: Arc::clone(&self.records),
        }
    }

    pub fn local_record(&self, key: &str) -> Option<Vec<u8>> {
        self.records.read().get(key).cloned()
    }

    fn targets(&self, key: &str) -> Vec<PeerId> {
        closest_peers(key, &self.directory.connected_peers(), self.replication)
    }

    async fn send(&self, peer: &PeerId, message: &KadMessage) -> Result<KadMessage, DhtError> {
        let mut stream = self.opener.open_stream(peer, KAD_PROTOCOL).await?;
        let result = tokio::time::timeout(self.request_timeout, async {
            write_json(&mut stream, message).await?;
            Ok::<KadMessage, DhtError>(read_json(&mut stream).await?)
        })
        .await;
        let _ = stream.close().await;
        match result {
            Ok(reply) => reply,
            Err(_) => Err(DhtError::Timeout {
                key: peer.to_string(),
                timeout_ms: self.request_timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl DhtStore for PeerRecordDht {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), DhtError> {
        self.records.write().insert(key.to_string(), value.clone());

        let targets = self.targets(key);
        let message = KadMessage::PutValue {
            key: key.to_string(),
            value,
        };
        let results = join_all(targets.iter().map(|peer| self.send(peer, &message))).await;

        let mut stored = 0usize;
        for (peer, result) in targets.iter().zip(results) {
            match result {
                Ok(KadMessage::PutAck { .. }) => stored += 1,
                Ok(other) => debug!(peer = %peer, reply = ?other, "[dw-03] Unexpected put reply"),
                Err(e) => debug!(peer = %peer, error = %e, "[dw-03] Put to peer failed"),
            }
        }
        info!(key = %key, replicas = stored, candidates = targets.len(), "[dw-03] 📌 Record stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DhtError> {
        if let Some(value) = self.local_record(key) {
            return Ok(Some(value));
        }
        let message = KadMessage::GetValue { key: key.to_string() };
        for peer in self.targets(key) {
            match self.send(&peer, &message).await {
                Ok(KadMessage::Value { value: Some(value), .. }) => {
                    debug!(key = %key, peer = %peer, "[dw-03] Record found on peer");
                    return Ok(Some(value));
                }
                Ok(_) => continue,
                Err(e) => debug!(peer = %peer, error = %e, "[dw-03] Get from peer failed"),
            }
        }
        Ok(None)
    }
}

/// Serves record puts and gets from other peers.
pub struct KadProtocolHandler {
    records: RecordTable,
}

impl KadProtocolHandler {
    fn respond(&self, remote: &PeerId, message: KadMessage) -> KadMessage {
        match message {
            KadMessage::PutValue { key, value } => {
                debug!(peer = %remote, key = %key, "[dw-03] Storing record for peer");
                self.records.write().insert(key.clone(), value);
                KadMessage::PutAck { key }
            }
            KadMessage::GetValue { key } => {
                let value = self.records.read().get(&key).cloned();
                KadMessage::Value { key, value }
            }
            _ => KadMessage::Error {
                reason: "unexpected-message".into(),
            },
        }
    }
}

#[async_trait]
impl ProtocolHandler for KadProtocolHandler {
    fn protocol(&self) -> &'static str {
        KAD_PROTOCOL
    }

    async fn handle(&self, remote: PeerId, mut stream: Box<dyn FrameStream>) {
        let reply = match read_json::<KadMessage, _>(&mut stream).await {
            Ok(message) => self.respond(&remote, message),
            Err(e) => KadMessage::Error {
                reason: e.to_string(),
            },
        };
        if let Err(e) = write_json(&mut stream, &reply).await {
            debug!(peer = %remote, error = %e, "[dw-03] Failed to write record reply");
        }
        let _ = stream.close().await;
    }
}
