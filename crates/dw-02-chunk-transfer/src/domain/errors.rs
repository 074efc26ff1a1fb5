//! Chunk transfer errors.

use shared_types::{FrameError, TransportError};
use thiserror::Error;

/// Failure of a single chunk request or upload.
#[derive(Debug, Error)]
pub enum ChunkTransferError {
    /// Could not open a stream to the peer.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Stream broke or carried malformed frames.
    #[error("Chunk stream failed: {0}")]
    Frame(#[from] FrameError),

    /// Exchange exceeded the request timeout.
    #[error("Chunk exchange timed out after {0} ms")]
    Timeout(u64),

    /// Remote answered `chunk-error`.
    #[error("Peer refused chunk request: {0}")]
    Remote(String),

    /// Remote answered `chunk-upload-nack`.
    #[error("Peer rejected chunk upload: {0}")]
    Rejected(String),

    /// Remote answered with a message that does not fit the exchange.
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
}

impl ChunkTransferError {
    /// Short status used in resolver fallback reasons (`peer-<status>`).
    pub fn status(&self) -> &'static str {
        match self {
            ChunkTransferError::Transport(e) => e.status(),
            ChunkTransferError::Frame(_) => "stream-failed",
            ChunkTransferError::Timeout(_) => "timeout",
            ChunkTransferError::Remote(_) => "error",
            ChunkTransferError::Rejected(_) => "rejected",
            ChunkTransferError::UnexpectedReply(_) => "protocol-error",
        }
    }
}
