//! Domain registration and patch requests.

use serde::Deserialize;
use serde_json::Value;
use shared_types::normalize_domain;

use super::errors::RegistryError;
use super::manifest::validate_manifest_id;

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Normalize and validate a domain name.
///
/// Accepts dot-separated labels of `[a-z0-9-]`, each 1..=63 characters and
/// not starting or ending with a hyphen.
pub fn validate_domain(raw: &str) -> Result<String, RegistryError> {
    let domain = normalize_domain(raw);
    if domain.is_empty() {
        return Err(RegistryError::InvalidDomain("domain is required".into()));
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(RegistryError::InvalidDomain(format!(
            "domain exceeds {MAX_DOMAIN_LEN} characters"
        )));
    }
    for label in domain.split('.') {
        let valid = !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid {
            return Err(RegistryError::InvalidDomain(format!("bad label {label:?} in {domain}")));
        }
    }
    Ok(domain)
}

/// Body of `POST /domains`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRegistration {
    pub domain: Option<String>,
    pub owner: Option<String>,
    pub manifest_id: Option<String>,
    pub replicas: Option<Vec<String>>,
    pub metadata: Option<Value>,
    /// Hex SEC1 secp256k1 public key, required for `dweb:0x` owners.
    pub public_key: Option<String>,
    /// Hex 64/65-byte signature over `message`.
    pub signature: Option<String>,
    pub message: Option<String>,
}

/// Body of `PATCH /domains/:domain`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainPatch {
    pub owner: Option<String>,
    pub manifest_id: Option<String>,
    pub replicas: Option<Vec<String>>,
    pub metadata: Option<Value>,
    /// Proof for a new `dweb:0x` owner, same shape as on registration.
    pub public_key: Option<String>,
    pub signature: Option<String>,
    pub message: Option<String>,
}

impl DomainPatch {
    pub fn is_empty(&self) -> bool {
        self.owner.is_none()
            && self.manifest_id.is_none()
            && self.replicas.is_none()
            && self.metadata.is_none()
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.is_empty() {
            return Err(RegistryError::InvalidDomainUpdate("no fields to update".into()));
        }
        if let Some(owner) = &self.owner {
            validate_owner(owner)?;
        }
        if let Some(manifest_id) = &self.manifest_id {
            validate_manifest_id(manifest_id)?;
        }
        if let Some(replicas) = &self.replicas {
            validate_replicas(replicas)?;
        }
        Ok(())
    }
}

pub fn validate_owner(owner: &str) -> Result<(), RegistryError> {
    if owner.trim().is_empty() {
        return Err(RegistryError::InvalidOwner("owner is required".into()));
    }
    Ok(())
}

pub fn validate_replicas(replicas: &[String]) -> Result<(), RegistryError> {
    if replicas.iter().any(|r| r.trim().is_empty()) {
        return Err(RegistryError::InvalidPeerId("empty replica peer id".into()));
    }
    Ok(())
}
