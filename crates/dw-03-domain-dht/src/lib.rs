//! # Domain DHT (dw-03)
//!
//! Decentralized `domain -> manifest` records stored under
//! `/dweb/domain/<domain>`. Values are JSON:
//!
//! ```json
//! { "manifestId": "...", "domain": "...", "timestamp": 0, "registeredBy": "<peer id>", "...": "metadata" }
//! ```
//!
//! Eventually consistent: the last write a reader sees wins. Nothing here
//! retries; callers fall back to the registry service.
//!
//! ## Crate Structure
//!
//! - `domain/` - keys, XOR distance, record protocol messages
//! - `ports/` - `DhtStore`
//! - `adapters/` - `InMemoryDht`, `PeerRecordDht` + `KadProtocolHandler`
//! - `service/` - `DomainDht` register/resolve

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{InMemoryDht, KadProtocolHandler, PeerRecordDht};
pub use config::{DhtConfig, DEFAULT_GET_TIMEOUT, K_VALUE};
pub use domain::{domain_key, DhtError, KadMessage};
pub use ports::DhtStore;
pub use service::DomainDht;
