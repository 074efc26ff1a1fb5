//! DHT domain layer.

pub mod distance;
pub mod errors;
pub mod records;

pub use distance::{closest_peers, common_prefix_len, xor_distance, KeyHash};
pub use errors::DhtError;
pub use records::{domain_key, KadMessage};
