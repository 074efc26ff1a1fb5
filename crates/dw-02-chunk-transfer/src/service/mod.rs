//! Chunk protocol handler and client.

mod client;
mod handler;

#[cfg(test)]
mod tests;

pub use client::{ChunkClient, ReplicationFailure, ReplicationProgress, ReplicationReport};
pub use handler::{ChunkProtocolHandler, ChunkReceived};
