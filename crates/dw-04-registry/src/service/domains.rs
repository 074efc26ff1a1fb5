//! Domain bindings: first writer wins, explicit patch and delete.

use shared_types::DomainRecord;
use tracing::info;

use super::repository::{encode, keys};
use super::RegistryService;
use crate::domain::domain_name::{validate_owner, validate_replicas};
use crate::domain::errors::RegistryError;
use crate::domain::{
    validate_domain, validate_manifest_id, verify_ownership, DomainPatch, DomainRegistration,
    OwnershipProof,
};
use crate::ports::BatchOperation;

impl RegistryService {
    /// Bind a new domain to a manifest.
    ///
    /// Fails with `DOMAIN_ALREADY_REGISTERED` if the normalized name exists.
    /// `dweb:0x` owners must attach a proof that verifies against the owner.
    pub fn register_domain(
        &self,
        registration: DomainRegistration,
    ) -> Result<DomainRecord, RegistryError> {
        let domain = validate_domain(registration.domain.as_deref().unwrap_or_default())?;
        let owner = registration
            .owner
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        validate_owner(&owner)?;
        let manifest_id = registration.manifest_id.clone().unwrap_or_default();
        validate_manifest_id(&manifest_id)?;
        let replicas = registration.replicas.clone().unwrap_or_default();
        validate_replicas(&replicas)?;

        let proof = OwnershipProof::from_parts(
            registration.public_key.as_deref(),
            registration.signature.as_deref(),
            registration.message.as_deref(),
        );
        verify_ownership(&owner, proof)?;

        let now = self.now();
        let record = DomainRecord {
            domain: domain.clone(),
            owner,
            manifest_id,
            replicas,
            metadata: registration.metadata,
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.lock();
        if state.exists(&keys::domain(&domain))? {
            return Err(RegistryError::DomainAlreadyRegistered(domain));
        }
        state.write(vec![BatchOperation::put(keys::domain(&domain), encode(&record)?)])?;

        info!(domain = %domain, manifest_id = %record.manifest_id, "[dw-04] 🌐 Domain registered");
        Ok(record)
    }

    /// Apply a partial update to an existing domain.
    pub fn update_domain(
        &self,
        domain: &str,
        patch: DomainPatch,
    ) -> Result<DomainRecord, RegistryError> {
        let domain = validate_domain(domain)?;
        patch.validate()?;
        if let Some(owner) = patch.owner.as_deref() {
            let proof = OwnershipProof::from_parts(
                patch.public_key.as_deref(),
                patch.signature.as_deref(),
                patch.message.as_deref(),
            );
            verify_ownership(owner.trim(), proof)?;
        }

        let mut state = self.state.lock();
        let mut record: DomainRecord = state
            .get_json(&keys::domain(&domain))?
            .ok_or_else(|| RegistryError::DomainNotFound(domain.clone()))?;

        if let Some(owner) = patch.owner {
            record.owner = owner.trim().to_string();
        }
        if let Some(manifest_id) = patch.manifest_id {
            record.manifest_id = manifest_id;
        }
        if let Some(replicas) = patch.replicas {
            record.replicas = replicas;
        }
        if let Some(metadata) = patch.metadata {
            record.metadata = Some(metadata);
        }
        record.updated_at = self.now();

        state.write(vec![BatchOperation::put(keys::domain(&domain), encode(&record)?)])?;
        info!(domain = %domain, manifest_id = %record.manifest_id, "[dw-04] Domain updated");
        Ok(record)
    }

    pub fn get_domain(&self, domain: &str) -> Result<DomainRecord, RegistryError> {
        let domain = validate_domain(domain)?;
        self.state
            .lock()
            .get_json(&keys::domain(&domain))?
            .ok_or(RegistryError::DomainNotFound(domain))
    }

    /// All domains, ordered by name.
    pub fn list_domains(&self) -> Result<Vec<DomainRecord>, RegistryError> {
        self.state.lock().scan_json(keys::DOMAIN_PREFIX)
    }

    /// Remove a domain. Returns the removed record.
    pub fn delete_domain(&self, domain: &str) -> Result<DomainRecord, RegistryError> {
        let domain = validate_domain(domain)?;
        let mut state = self.state.lock();
        let record: DomainRecord = state
            .get_json(&keys::domain(&domain))?
            .ok_or_else(|| RegistryError::DomainNotFound(domain.clone()))?;
        state.write(vec![BatchOperation::delete(keys::domain(&domain))])?;
        info!(domain = %domain, "[dw-04] Domain deleted");
        Ok(record)
    }
}
