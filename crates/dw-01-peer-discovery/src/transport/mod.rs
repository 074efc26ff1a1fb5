//! # QUIC Transport
//!
//! One quinn endpoint per node, acting as both server and client. Each
//! protocol exchange runs on its own bidirectional stream, adapted to
//! [`FrameStream`] at this boundary.
//!
//! ## Security Properties
//!
//! - TLS 1.3 with a per-process self-signed certificate
//! - Peer identity bound by the signed identify handshake
//!
//! ## Reference
//!
//! - RFC 9000 (QUIC)
//! - RFC 9001 (QUIC-TLS)

pub mod tls;

use std::net::SocketAddr;
use std::sync::Arc;

use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use quinn::{Connection, Endpoint, IdleTimeout, VarInt};
use shared_types::{write_json, FrameStream, FramedStream, StreamHeader};

use crate::config::TransportConfig;
use crate::domain::NodeError;

/// Frame stream over one QUIC bidirectional stream.
pub type QuicStream = FramedStream<quinn::RecvStream, quinn::SendStream>;

/// Bound QUIC endpoint.
pub struct QuicTransport {
    endpoint: Endpoint,
    config: TransportConfig,
}

impl QuicTransport {
    /// Bind the endpoint. Must be called inside a tokio runtime.
    pub fn bind(addr: SocketAddr, config: &TransportConfig) -> Result<Self, NodeError> {
        let transport = Arc::new(transport_config(config));

        let server_crypto = QuicServerConfig::try_from(tls::server_crypto()?)
            .map_err(|e| NodeError::Tls(format!("QUIC server crypto: {e}")))?;
        let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(server_crypto));
        server_config.transport_config(Arc::clone(&transport));

        let client_crypto = QuicClientConfig::try_from(tls::client_crypto()?)
            .map_err(|e| NodeError::Tls(format!("QUIC client crypto: {e}")))?;
        let mut client_config = quinn::ClientConfig::new(Arc::new(client_crypto));
        client_config.transport_config(transport);

        let mut endpoint =
            Endpoint::server(server_config, addr).map_err(|e| NodeError::BindFailed {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        endpoint.set_default_client_config(client_config);

        Ok(Self {
            endpoint,
            config: config.clone(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NodeError> {
        self.endpoint
            .local_addr()
            .map_err(|e| NodeError::BindFailed {
                addr: "endpoint".into(),
                reason: e.to_string(),
            })
    }

    /// Connect to `remote`, bounded by the connect timeout.
    pub async fn connect(&self, remote: SocketAddr) -> Result<Connection, NodeError> {
        let dial_failed = |reason: String| NodeError::DialFailed {
            addr: remote.to_string(),
            reason,
        };
        let connecting = self
            .endpoint
            .connect(remote, "localhost")
            .map_err(|e| dial_failed(e.to_string()))?;

        tokio::time::timeout(self.config.connect_timeout(), connecting)
            .await
            .map_err(|_| dial_failed("connect timed out".into()))?
            .map_err(|e| dial_failed(e.to_string()))
    }

    /// Next inbound connection attempt. `None` once the endpoint is closed.
    pub async fn accept(&self) -> Option<quinn::Incoming> {
        self.endpoint.accept().await
    }

    pub fn close(&self) {
        self.endpoint.close(VarInt::from_u32(0), b"shutdown");
    }
}

fn transport_config(config: &TransportConfig) -> quinn::TransportConfig {
    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(
        IdleTimeout::try_from(config.idle_timeout())
            .unwrap_or_else(|_| IdleTimeout::from(VarInt::from_u32(30_000))),
    ));
    transport.keep_alive_interval(config.keep_alive());
    transport.max_concurrent_bidi_streams(VarInt::from_u32(config.max_streams));
    transport
}

/// Open a bidirectional stream on `connection` and send the header frame.
pub async fn open_stream(
    connection: &Connection,
    header: &StreamHeader,
) -> Result<QuicStream, String> {
    let (send, recv) = connection.open_bi().await.map_err(|e| e.to_string())?;
    let mut stream = FramedStream::new(recv, send);
    write_json(&mut stream, header)
        .await
        .map_err(|e| e.to_string())?;
    Ok(stream)
}

/// Accept the next bidirectional stream on `connection`.
pub async fn accept_stream(connection: &Connection) -> Option<QuicStream> {
    let (send, recv) = connection.accept_bi().await.ok()?;
    Some(FramedStream::new(recv, send))
}

/// Boxed form handed to protocol handlers.
pub fn boxed(stream: QuicStream) -> Box<dyn FrameStream> {
    Box::new(stream)
}
