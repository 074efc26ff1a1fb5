//! # Node Runtime Library
//!
//! Wiring behind the `dweb-node` binary, exposed for tests.
//!
//! ## Modular Structure
//!
//! - `config` - TOML file + `DWEB_*` environment overrides
//! - `runtime` - `PeerRuntime` (node, chunk store, DHT, peer bridge) and
//!   the registry role
//! - `telemetry` - `tracing-subscriber` setup
//!
//! ## Roles
//!
//! | Subcommand  | Runs                                               |
//! |-------------|----------------------------------------------------|
//! | `bootstrap` | peer with relay + DHT server mode, optional registry |
//! | `peer`      | peer that seeds chunks and answers DHT queries     |
//! | `registry`  | REST registry with the pointer expiry sweep        |
//! | `publish`   | peer that registers a file, optionally keeps seeding |
//! | `resolve`   | peer that fetches a file through the cascade       |

#![allow(clippy::too_many_lines)]

pub mod config;
pub mod runtime;
pub mod telemetry;

pub use config::{ConfigError, DwebConfig};
pub use runtime::{run_registry, PeerRuntime, RuntimeError};
pub use telemetry::{init_logging, TelemetryError};
