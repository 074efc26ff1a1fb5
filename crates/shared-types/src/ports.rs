//! Transport ports shared by the peer protocols.
//!
//! The QUIC node implements [`StreamOpener`] and [`PeerDirectory`]; protocol
//! crates implement [`ProtocolHandler`] and register it with the node.

use async_trait::async_trait;
use libp2p_identity::PeerId;

use crate::errors::TransportError;
use crate::frame::FrameStream;

/// Opens outbound protocol streams.
#[async_trait]
pub trait StreamOpener: Send + Sync {
    /// Open a stream to `peer` speaking `protocol`. The returned stream is
    /// positioned after the stream header.
    async fn open_stream(
        &self,
        peer: &PeerId,
        protocol: &str,
    ) -> Result<Box<dyn FrameStream>, TransportError>;

    /// Identity of the local node.
    fn local_peer_id(&self) -> PeerId;
}

/// Serves inbound streams for one protocol.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// Protocol identifier this handler serves.
    fn protocol(&self) -> &'static str;

    /// Handle one inbound stream from `remote`. The handler owns the stream
    /// and must close it before returning.
    async fn handle(&self, remote: PeerId, stream: Box<dyn FrameStream>);
}

/// Read-only view of the live connection table.
pub trait PeerDirectory: Send + Sync {
    fn connected_peers(&self) -> Vec<PeerId>;
}

/// Abstract wall clock in milliseconds since the Unix epoch.
pub trait TimeSource: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}
