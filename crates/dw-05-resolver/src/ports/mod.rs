//! Ports the resolver and publisher depend on.
//!
//! Production adapters live in `adapters/`; tests substitute mocks.

use async_trait::async_trait;
use dw_02_chunk_transfer::ChunkTransferError;
use serde_json::Value;
use shared_types::{ChunkView, DomainRecord, ManifestView, Timestamp};

use crate::domain::{ChunkAttempt, ClientError, ManifestUpload, PointerError};

/// Registry REST API as seen by clients.
#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// Base URL, used to scope cache keys.
    fn endpoint(&self) -> &str;

    async fn get_manifest(&self, manifest_id: &str) -> Result<ManifestView, ClientError>;

    async fn get_chunk(&self, manifest_id: &str, chunk_index: u32) -> Result<ChunkView, ClientError>;

    async fn get_domain(&self, domain: &str) -> Result<DomainRecord, ClientError>;

    async fn create_manifest(&self, upload: &ManifestUpload) -> Result<ManifestView, ClientError>;

    /// `body` is the `POST /domains` JSON (domain, owner, manifestId and
    /// optional ownership proof).
    async fn register_domain(&self, body: &Value) -> Result<DomainRecord, ClientError>;

    async fn update_replicas(
        &self,
        manifest_id: &str,
        peer_id: &str,
        chunk_indexes: Option<&[u32]>,
    ) -> Result<ManifestView, ClientError>;

    async fn update_chunk_pointer(
        &self,
        manifest_id: &str,
        chunk_index: u32,
        pointer: &str,
        expires_at: Option<Timestamp>,
    ) -> Result<ChunkView, ClientError>;
}

/// Fetches a chunk from a replica peer.
#[async_trait]
pub trait PeerChunkSource: Send + Sync {
    async fn fetch_chunk(
        &self,
        peer_id: &str,
        manifest_id: &str,
        chunk_index: u32,
    ) -> Result<Vec<u8>, ChunkTransferError>;
}

/// Fetches chunk bytes from a pointer URL.
#[async_trait]
pub trait PointerFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PointerError>;
}

/// Local chunk cache keyed by [`cache_key`](crate::adapters::cache_key).
pub trait ChunkCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    fn put(&self, key: &str, data: Vec<u8>);
}

/// Sink for the attempt trail. Called inline, never awaited; must not block.
pub trait ResolutionObserver: Send + Sync {
    fn record(&self, attempt: &ChunkAttempt);
}
