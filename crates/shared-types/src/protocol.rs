//! Protocol identifiers and the stream header.
//!
//! Every stream opened on a connection starts with a [`StreamHeader`] frame
//! naming the protocol. When a relay forwards a circuit stream it fills in
//! `initiator` with the peer that opened the circuit.

use serde::{Deserialize, Serialize};

/// Peer exchange: request/serve lists of known peers.
pub const PEER_EXCHANGE_PROTOCOL: &str = "/dweb/peer-exchange/1.0.0";

/// Chunk request and upload protocol.
pub const CHUNK_PROTOCOL: &str = "/dweb/chunk/1.0.0";

/// Identity handshake run once per connection.
pub const IDENTIFY_PROTOCOL: &str = "/dweb/identify/1.0.0";

/// Relay reservation and circuit protocol.
pub const RELAY_PROTOCOL: &str = "/dweb/relay/1.0.0";

/// DHT record put/get protocol.
pub const KAD_PROTOCOL: &str = "/dweb/kad/1.0.0";

/// Key prefix for domain records in the DHT.
pub const DOMAIN_KEY_PREFIX: &str = "/dweb/domain/";

/// First frame on every stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamHeader {
    pub protocol: String,
    /// Originating peer when the stream arrives through a relay circuit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,
}

impl StreamHeader {
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            initiator: None,
        }
    }

    pub fn relayed(protocol: impl Into<String>, initiator: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            initiator: Some(initiator.into()),
        }
    }
}

/// Generic rejection sent when a stream names an unknown protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRejection {
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: String,
}

impl StreamRejection {
    pub fn unsupported(protocol: &str) -> Self {
        Self {
            kind: "error".to_string(),
            reason: format!("unsupported-protocol: {protocol}"),
        }
    }
}
