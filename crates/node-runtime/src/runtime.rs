//! Peer runtime: one P2P node with every protocol it serves, plus the
//! registry role.
//!
//! ```text
//!  P2pNode ──┬── /dweb/chunk/1.0.0 ── ChunkProtocolHandler ── LocalChunkStore
//!            ├── /dweb/kad/1.0.0  ── KadProtocolHandler    (server mode)
//!            └── StreamOpener ───── ChunkClient ── PeerBridge ──▶ Resolver
//!                              └─── PeerRecordDht ── DomainDht ──▶ Resolver, Publisher
//! ```

use std::sync::Arc;
use std::time::Duration;

use dw_01_peer_discovery::{NodeError, NodeEvent, P2pNode};
use dw_02_chunk_transfer::{ChunkClient, ChunkProtocolHandler, ChunkProvider, LocalChunkStore};
use dw_03_domain_dht::{DomainDht, PeerRecordDht};
use dw_04_registry::{RegistryError, RegistryServer, RegistryService};
use dw_05_resolver::{
    ClientError, HttpPointerFetcher, HttpRegistryClient, MemoryChunkCache, PeerBridge, Publisher,
    Resolver, ResolverConfig, StorageClient,
};
use shared_types::{PeerDirectory, StreamOpener};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::config::DwebConfig;

/// Time given to spawned tasks to observe the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Registry server failed: {0}")]
    Serve(#[from] std::io::Error),
}

/// A running peer and the services layered on it.
pub struct PeerRuntime {
    node: P2pNode,
    store: Arc<LocalChunkStore>,
    chunk_client: ChunkClient,
    peers: PeerBridge,
    dht: DomainDht,
    resolver_config: ResolverConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl PeerRuntime {
    /// Start the node and register the chunk (and, in server mode, the
    /// DHT) protocol handlers.
    pub async fn start(config: &DwebConfig) -> Result<Self, RuntimeError> {
        let mut node_config = config.node.clone();
        node_config.identity_path = Some(config.identity_path());
        let node = P2pNode::start(node_config).await?;
        let local_peer = node.local_peer_id();

        let store = Arc::new(LocalChunkStore::new(config.chunks.received_capacity));
        let provider: Arc<dyn ChunkProvider> = store.clone();
        node.register_handler(Arc::new(ChunkProtocolHandler::with_provider(
            local_peer,
            &config.chunks,
            provider,
        )));

        let opener: Arc<dyn StreamOpener> = Arc::new(node.clone());
        let directory: Arc<dyn PeerDirectory> = Arc::new(node.clone());
        let peer_dht = PeerRecordDht::new(Arc::clone(&opener), directory, &config.dht);
        let server_mode = config.dht.server_mode || config.node.dht_server_mode;
        if server_mode {
            node.register_handler(Arc::new(peer_dht.handler()));
        }
        let dht = DomainDht::new(Arc::new(peer_dht), local_peer.to_string(), &config.dht);

        let chunk_client = ChunkClient::new(opener, &config.chunks);
        let peers = PeerBridge::spawn(chunk_client.clone(), config.resolver.peer_queue_timeout());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runtime = Self {
            node,
            store,
            chunk_client,
            peers,
            dht,
            resolver_config: config.resolver.clone(),
            shutdown_tx,
            shutdown_rx,
        };
        runtime.spawn_event_log();

        info!(
            peer = %local_peer,
            addrs = ?runtime.node.listen_addrs(),
            dht_server = server_mode,
            relay = config.node.relay.enabled,
            "[node] 🚀 Peer started"
        );
        Ok(runtime)
    }

    pub fn node(&self) -> &P2pNode {
        &self.node
    }

    pub fn store(&self) -> Arc<LocalChunkStore> {
        Arc::clone(&self.store)
    }

    pub fn chunk_client(&self) -> &ChunkClient {
        &self.chunk_client
    }

    pub fn dht(&self) -> DomainDht {
        self.dht.clone()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Resolver over the configured registry, this node's peers and DHT.
    pub fn resolver(&self) -> Result<Resolver, RuntimeError> {
        let config = self.resolver_config.clone();
        let registry = HttpRegistryClient::new(config.registry_url.clone(), config.http_timeout())?;
        let pointers = HttpPointerFetcher::new(config.http_timeout())?;
        let cache = MemoryChunkCache::with_capacity(config.cache_capacity);
        Ok(Resolver::new(Arc::new(registry), Arc::new(pointers), config)
            .with_peers(Arc::new(self.peers.clone()))
            .with_cache(Arc::new(cache))
            .with_dht(self.dht.clone()))
    }

    /// Publisher that seeds this node's store and writes to its DHT.
    ///
    /// `storage_url` adds pointer copies on a storage service.
    pub fn publisher(&self, storage_url: Option<&str>) -> Result<Publisher, RuntimeError> {
        let timeout = self.resolver_config.http_timeout();
        let registry = HttpRegistryClient::new(self.resolver_config.registry_url.clone(), timeout)?;
        let mut publisher = Publisher::new(Arc::new(registry))
            .with_seeding(self.store(), self.node.local_peer_id().to_string())
            .with_dht(self.dht.clone());
        if let Some(url) = storage_url {
            publisher = publisher.with_storage(StorageClient::new(url, timeout)?);
        }
        Ok(publisher)
    }

    /// Signal background tasks and close the node.
    pub async fn shutdown(&self) {
        info!(peer = %self.node.local_peer_id(), "[node] Initiating graceful shutdown...");
        // Receivers may all be gone already.
        let _ = self.shutdown_tx.send(true);
        self.node.shutdown();
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        info!("[node] Shutdown complete");
    }

    fn spawn_event_log(&self) {
        let mut events = self.node.subscribe();
        let mut shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => log_event(&event),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            debug!(missed, "[node] Event log lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
        });
    }
}

fn log_event(event: &NodeEvent) {
    match event {
        NodeEvent::PeerConnected { peer, relay: None } => {
            info!(peer = %peer, "[node] 🔗 Peer connected");
        }
        NodeEvent::PeerConnected {
            peer,
            relay: Some(relay),
        } => {
            info!(peer = %peer, relay = %relay, "[node] 🔗 Peer connected via relay");
        }
        NodeEvent::PeerDisconnected { peer } => {
            info!(peer = %peer, "[node] Peer disconnected");
        }
        NodeEvent::PeerDiscovered { peer, addrs } => {
            debug!(peer = %peer, addrs = addrs.len(), "[node] Peer discovered");
        }
        NodeEvent::ReservationAccepted { relay, expires_at } => {
            info!(relay = %relay, expires_at, "[node] 📡 Relay reservation accepted");
        }
    }
}

/// Open the registry store under the data directory and serve it until
/// `shutdown` turns true.
pub async fn run_registry(config: &DwebConfig, shutdown: watch::Receiver<bool>) -> Result<(), RuntimeError> {
    let mut registry_config = config.registry.clone();
    registry_config.data_path = Some(config.registry_data_path());

    let service = Arc::new(RegistryService::open(&registry_config)?);
    RegistryServer::new(service, registry_config).serve(shutdown).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use dw_01_peer_discovery::NodeConfig;

    use super::*;

    fn test_config(dir: &std::path::Path) -> DwebConfig {
        DwebConfig {
            data_dir: dir.to_path_buf(),
            node: NodeConfig::for_testing(),
            ..DwebConfig::default()
        }
    }

    #[tokio::test]
    async fn test_identity_persists_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let first = PeerRuntime::start(&config).await.unwrap();
        let peer = first.node().local_peer_id();
        first.shutdown().await;
        assert!(config.identity_path().exists());

        let second = PeerRuntime::start(&config).await.unwrap();
        assert_eq!(second.node().local_peer_id(), peer);
        second.shutdown().await;
    }

    #[tokio::test]
    async fn test_published_chunks_are_served_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = PeerRuntime::start(&test_config(dir.path())).await.unwrap();

        runtime.store().add_transfer("m-1", vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(runtime.store().get("m-1", 1), Some(b"second".to_vec()));
        assert!(runtime.resolver().is_ok());
        assert!(runtime.publisher(Some("http://127.0.0.1:9")).is_ok());

        runtime.shutdown().await;
        assert!(*runtime.shutdown_signal().borrow());
    }
}
