//! # Chunk Transfer (dw-02)
//!
//! Request/response protocol peers use to fetch and push content-addressed
//! chunks directly, on `/dweb/chunk/1.0.0`.
//!
//! ```text
//!  requester                       holder
//!      │── chunk-request ─────────────▶│  transfer store, then received cache
//!      │◀──────── chunk-response ──────│  (or chunk-error {reason})
//!
//!  uploader                        receiver
//!      │── chunk-upload {hash} ───────▶│  sha256(data) == hash ?
//!      │◀────── chunk-upload-ack ──────│  (or chunk-upload-nack "hash-mismatch")
//! ```
//!
//! One message per direction; the stream closes after the exchange. Every
//! client exchange is bounded by the request timeout (30 s default).
//!
//! ## Crate Structure
//!
//! - `domain/` - wire messages, errors
//! - `ports/` - `ChunkProvider` consulted by the handler
//! - `adapters/` - `LocalChunkStore`, `FifoCache`
//! - `service/` - `ChunkProtocolHandler`, `ChunkClient`

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{FifoCache, LocalChunkStore};
pub use config::ChunkTransferConfig;
pub use domain::{ChunkMessage, ChunkTransferError};
pub use ports::ChunkProvider;
pub use service::{
    ChunkClient, ChunkProtocolHandler, ChunkReceived, ReplicationFailure, ReplicationProgress,
    ReplicationReport,
};
