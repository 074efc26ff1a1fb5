//! Chunk protocol messages and errors.

pub mod errors;
pub mod messages;

pub use errors::ChunkTransferError;
pub use messages::*;
