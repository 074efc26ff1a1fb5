//! Errors raised by the peer node.

use shared_types::{FrameError, TransportError};
use thiserror::Error;

/// Failures of node startup, dialing and the node-level protocols.
#[derive(Debug, Error)]
pub enum NodeError {
    /// QUIC endpoint could not bind.
    #[error("Failed to bind {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    /// Certificate generation or TLS configuration failed.
    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// Identity file unreadable, unwritable or malformed.
    #[error("Identity error: {0}")]
    Identity(String),

    /// Multiaddr cannot be dialed by this transport.
    #[error("Unsupported address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// QUIC connect failed or timed out.
    #[error("Dial {addr} failed: {reason}")]
    DialFailed { addr: String, reason: String },

    /// Identify handshake failed or the remote is not who the address claims.
    #[error("Identify with {addr} failed: {reason}")]
    Handshake { addr: String, reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Node stream failed: {0}")]
    Frame(#[from] FrameError),

    /// Exchange or relay round trip exceeded its deadline.
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout { operation: &'static str, timeout_ms: u64 },

    /// Remote answered with an error message.
    #[error("Peer refused: {0}")]
    Refused(String),

    /// Remote answered with a message that does not fit the exchange.
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
}

impl NodeError {
    pub(crate) fn timeout(operation: &'static str, timeout: std::time::Duration) -> Self {
        NodeError::Timeout {
            operation,
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}
