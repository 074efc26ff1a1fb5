//! # Error Types
//!
//! Defines error types used across subsystems.

use thiserror::Error;

/// Errors raised while reading or writing length-prefixed frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Underlying stream failed.
    #[error("Stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame length exceeds the protocol maximum.
    #[error("Frame too large: {len} bytes exceeds {max}")]
    TooLarge { len: usize, max: usize },

    /// Length prefix is not a valid unsigned varint.
    #[error("Invalid length prefix: {0}")]
    InvalidPrefix(String),

    /// Stream ended in the middle of a frame.
    #[error("Stream ended mid-frame")]
    UnexpectedEof,

    /// Stream ended cleanly where a message was expected.
    #[error("Stream closed by remote")]
    Closed,

    /// Frame is not the expected JSON message.
    #[error("Malformed message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors raised when opening a protocol stream to a peer.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// No connection (direct or relayed) to the peer.
    #[error("Peer not connected: {peer}")]
    NotConnected { peer: String },

    /// Peer does not serve the requested protocol.
    #[error("Protocol {protocol} not supported by {peer}")]
    UnsupportedProtocol { peer: String, protocol: String },

    /// Connection or stream setup failed.
    #[error("Stream to {peer} failed: {reason}")]
    StreamFailed { peer: String, reason: String },

    /// Relay refused to open a circuit.
    #[error("Relay {relay} refused circuit: {reason}")]
    RelayRefused { relay: String, reason: String },

    /// Node has shut down.
    #[error("Transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Short machine-readable status used in diagnostics.
    pub fn status(&self) -> &'static str {
        match self {
            TransportError::NotConnected { .. } => "unreachable",
            TransportError::UnsupportedProtocol { .. } => "unsupported",
            TransportError::StreamFailed { .. } => "stream-failed",
            TransportError::RelayRefused { .. } => "relay-refused",
            TransportError::Shutdown => "shutdown",
        }
    }
}
