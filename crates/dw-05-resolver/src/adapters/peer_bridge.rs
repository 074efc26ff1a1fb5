//! Background worker that owns the chunk client.
//!
//! Resolver tasks hand requests over a bounded queue. Handing off is
//! bounded by the queue timeout; the transfer itself is bounded by the
//! chunk client's own request timeout.

use std::time::Duration;

use async_trait::async_trait;
use dw_02_chunk_transfer::{ChunkClient, ChunkTransferError};
use shared_types::{PeerId, TransportError};
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::ports::PeerChunkSource;

/// Queue depth between resolver tasks and the worker.
const BRIDGE_QUEUE_CAPACITY: usize = 64;

struct BridgeRequest {
    peer: PeerId,
    manifest_id: String,
    chunk_index: u32,
    reply: oneshot::Sender<Result<Vec<u8>, ChunkTransferError>>,
}

#[derive(Clone)]
pub struct PeerBridge {
    requests: mpsc::Sender<BridgeRequest>,
    queue_timeout: Duration,
}

impl PeerBridge {
    /// Spawn the worker. It stops once every bridge handle is dropped.
    pub fn spawn(client: ChunkClient, queue_timeout: Duration) -> Self {
        let (requests, mut queue) = mpsc::channel::<BridgeRequest>(BRIDGE_QUEUE_CAPACITY);
        tokio::spawn(async move {
            while let Some(request) = queue.recv().await {
                let client = client.clone();
                tokio::spawn(async move {
                    let result = client
                        .request_chunk(&request.peer, &request.manifest_id, request.chunk_index)
                        .await;
                    if request.reply.send(result).is_err() {
                        debug!(peer = %request.peer, "[dw-05] Peer fetch finished after caller left");
                    }
                });
            }
            debug!("[dw-05] Peer bridge stopped");
        });
        Self {
            requests,
            queue_timeout,
        }
    }
}

#[async_trait]
impl PeerChunkSource for PeerBridge {
    async fn fetch_chunk(
        &self,
        peer_id: &str,
        manifest_id: &str,
        chunk_index: u32,
    ) -> Result<Vec<u8>, ChunkTransferError> {
        let peer: PeerId = peer_id.parse().map_err(|_| {
            ChunkTransferError::Transport(TransportError::NotConnected {
                peer: peer_id.to_string(),
            })
        })?;
        let (reply, response) = oneshot::channel();
        let request = BridgeRequest {
            peer,
            manifest_id: manifest_id.to_string(),
            chunk_index,
            reply,
        };

        match self.requests.send_timeout(request, self.queue_timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(peer = %peer, "[dw-05] Peer bridge queue is full");
                return Err(ChunkTransferError::Timeout(
                    self.queue_timeout.as_millis() as u64,
                ));
            }
            Err(SendTimeoutError::Closed(_)) => {
                return Err(ChunkTransferError::Transport(TransportError::Shutdown))
            }
        }
        response
            .await
            .unwrap_or(Err(ChunkTransferError::Transport(TransportError::Shutdown)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dw_02_chunk_transfer::{ChunkProtocolHandler, ChunkTransferConfig, LocalChunkStore};
    use shared_types::testing::InMemoryNetwork;

    use super::*;

    #[tokio::test]
    async fn test_bridge_fetches_through_worker() {
        let network = InMemoryNetwork::new();
        let holder = network.join();
        let store = Arc::new(LocalChunkStore::default());
        store.add_transfer("m1", vec![b"zero".to_vec(), b"one".to_vec()]);
        holder.register_handler(Arc::new(ChunkProtocolHandler::with_provider(
            holder.peer_id(),
            &ChunkTransferConfig::default(),
            store,
        )));

        let requester = network.join();
        let client = ChunkClient::new(Arc::new(requester), &ChunkTransferConfig::default());
        let bridge = PeerBridge::spawn(client, Duration::from_secs(2));

        let holder_id = holder.peer_id().to_string();
        assert_eq!(bridge.fetch_chunk(&holder_id, "m1", 1).await.unwrap(), b"one");

        let err = bridge.fetch_chunk(&holder_id, "m1", 5).await.unwrap_err();
        assert_eq!(err.status(), "error");
    }

    #[tokio::test]
    async fn test_unparseable_peer_is_unreachable() {
        let network = InMemoryNetwork::new();
        let client = ChunkClient::new(Arc::new(network.join()), &ChunkTransferConfig::default());
        let bridge = PeerBridge::spawn(client, Duration::from_secs(2));

        let err = bridge.fetch_chunk("not-a-peer", "m1", 0).await.unwrap_err();
        assert_eq!(err.status(), "unreachable");
    }
}
