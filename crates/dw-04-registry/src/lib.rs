//! # Registry Service (dw-04)
//!
//! Authoritative, centrally reachable store for manifests, per-chunk
//! pointer and replica state, pointer history and domain bindings. The
//! resolver falls back to it when the peer network cannot serve a chunk.
//!
//! ## Domain Invariants
//!
//! | Invariant | Description |
//! |-----------|-------------|
//! | Aligned arrays | Per-chunk arrays always have exactly `chunkCount` entries |
//! | Replace resets | Republishing a manifest id drops all prior chunk state |
//! | Ordered history | `recordedAt` strictly increases per (manifest, chunk) |
//! | Pure sweep | Expiry sweep clears pointers without writing history |
//! | First writer wins | A registered domain is never silently overwritten |
//! | Proven crypto owners | `dweb:0x` owners must sign the registration |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - validation, pointer state machine, ownership proofs
//! - `ports/` - `KeyValueStore` outbound port
//! - `adapters/` - in-memory and file-backed stores
//! - `service/` - `RegistryService` and the expiry sweep
//! - `http/` - axum REST surface (feature `http`)
//!
//! ## Usage
//!
//! ```ignore
//! use dw_04_registry::{RegistryConfig, RegistryServer, RegistryService};
//!
//! let config = RegistryConfig::default();
//! let service = Arc::new(RegistryService::open(&config)?);
//! RegistryServer::new(service, config).serve(shutdown_rx).await?;
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
#[cfg(feature = "http")]
pub mod http;
pub mod ports;
pub mod service;

pub use adapters::InMemoryKVStore;
#[cfg(feature = "file-store")]
pub use adapters::FileBackedKVStore;
pub use config::{RateLimitConfig, RegistryConfig, HISTORY_PAGE_CAP};
pub use domain::errors::{KVStoreError, RegistryError};
pub use domain::{
    pointer_state, DomainPatch, DomainRegistration, ManifestSubmission, PointerState,
    PointerUpdate, ReplicaUpdate,
};
pub use ports::{BatchOperation, KeyValueStore};
pub use service::{run_sweep_once, spawn_pointer_sweep, PointerHistoryPage, PruneReport, RegistryService};

#[cfg(feature = "http")]
pub use http::{build_router, RegistryServer};
