//! Adapters implementing the registry's outbound ports.

pub mod storage;

pub use storage::*;
