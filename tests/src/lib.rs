//! # DWeb Test Suite
//!
//! Cross-crate flows that no single subsystem crate can cover on its own.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Criterion benchmarks (chunking, ownership, cascade)
//! └── src/integration/
//!     ├── fixtures.rs   # Live registry + storage service on loopback
//!     ├── registry_flows.rs   # publish/resolve against the real REST surface
//!     └── mesh_flows.rs       # PeerRuntime nodes over QUIC
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p dweb-tests
//! cargo test -p dweb-tests integration::mesh_flows::
//! cargo bench -p dweb-tests
//! ```

#![allow(dead_code)]

pub mod integration;
