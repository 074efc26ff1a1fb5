//! # Resolver & Publisher (dw-05)
//!
//! Turns a manifest id (or a domain) back into file bytes, degrading
//! through every transport that might hold each chunk:
//!
//! ```text
//!  cache ─▶ replica peers ─▶ registry chunk ─▶ pointer URL ─▶ inline data
//!   (hit)    (peer-<status>)   (chunk-missing)   (pointer-<code>)
//! ```
//!
//! A single chunk failing on one tier is never an error. The file fails
//! only when every tier is exhausted for some chunk
//! ([`ResolveError::ChunkUnavailable`] carries the reason trail).
//!
//! The publishing side splits bytes into 256 KiB chunks, registers the
//! manifest, seeds the local chunk store and optionally pushes copies to
//! a storage service and binds a domain in the registry and the DHT.
//!
//! ## Crate Structure
//!
//! - `domain/` - attempt trail, reasons, errors, chunking
//! - `ports/` - registry, peer source, pointer fetcher, cache, observer
//! - `adapters/` - reqwest clients, bounded chunk cache, peer bridge, observers
//! - `service/` - `Resolver`, `Publisher`

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{
    cache_key, HttpPointerFetcher, HttpRegistryClient, MemoryChunkCache, MemoryObserver,
    PeerBridge, StorageClient, TracingObserver,
};
pub use config::{ResolverConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_CHUNK_SIZE, DEFAULT_REGISTRY_URL};
pub use domain::{
    AttemptOutcome, ChunkAttempt, ChunkSource, ChunkedFile, ClientError, ManifestUpload,
    PointerError, ResolveError, Tier,
};
pub use ports::{ChunkCache, PeerChunkSource, PointerFetcher, RegistryApi, ResolutionObserver};
pub use service::{
    DomainBinding, DomainResolution, DomainSource, PublishOptions, PublishReport, Publisher,
    ResolvedFile, Resolver,
};
