//! # Shared Types Crate
//!
//! This crate contains the data model, wire protocol identifiers and the
//! framed stream abstraction used by every dweb subsystem.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: manifests, chunk records, domain records and
//!   DHT values are defined once here and serialized identically by the
//!   registry, the resolver and the peer protocols.
//! - **Transport Agnostic**: peer protocols speak to a [`FrameStream`], not to
//!   QUIC. The same handler code runs over a real connection, a relay circuit
//!   or an in-memory duplex pipe in tests.
//! - **Length-Prefixed JSON**: every protocol message is one UTF-8 JSON
//!   document preceded by an unsigned-varint length.

pub mod encoding;
pub mod entities;
pub mod errors;
pub mod frame;
pub mod ports;
pub mod protocol;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use entities::*;
pub use errors::*;
pub use frame::{read_json, write_json, FrameStream, FramedStream, MAX_FRAME_LEN};
pub use ports::{PeerDirectory, ProtocolHandler, StreamOpener, SystemTimeSource, TimeSource};
pub use protocol::*;

pub use libp2p_identity::PeerId;
pub use multiaddr::Multiaddr;
