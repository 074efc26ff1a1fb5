pub mod address;
pub mod errors;
pub mod exchange;
pub mod identify;
pub mod peer_book;
pub mod relay;

pub use address::{circuit_addr, is_circuit, parse_dial_target, peer_id_of, quic_multiaddr, with_peer_id, DialTarget};
pub use errors::NodeError;
pub use exchange::{build_response, usable_peers, ExchangeMessage, PeerInfo};
pub use identify::{IdentifyMessage, VerifiedIdentity};
pub use peer_book::{ConnectionStatus, PeerBook, PeerRecord};
pub use relay::{RelayMessage, ReservationPool};
