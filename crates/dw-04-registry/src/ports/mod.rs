//! Ports for the registry service.

pub mod outbound;

pub use outbound::{BatchOperation, KeyValueStore, ScanResult};
