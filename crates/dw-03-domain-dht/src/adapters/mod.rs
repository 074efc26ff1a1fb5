pub mod memory;
pub mod peer_dht;

pub use memory::InMemoryDht;
pub use peer_dht::{KadProtocolHandler, PeerRecordDht};
