//! Domain layer for the registry.
//!
//! Pure validation and state-transition rules. No storage, no HTTP.

pub mod domain_name;
pub mod errors;
pub mod manifest;
pub mod ownership;
pub mod pointer;
pub mod replicas;

pub use domain_name::{validate_domain, DomainPatch, DomainRegistration};
pub use errors::{KVStoreError, RegistryError};
pub use manifest::{validate_manifest_id, ManifestSubmission, ValidatedManifest};
pub use ownership::{verify_ownership, OwnershipProof};
pub use pointer::{pointer_state, PointerState, PointerUpdate};
pub use replicas::{check_index, ReplicaUpdate};
