//! Publishing a file: chunk, register, seed, optionally push to storage and
//! bind a domain.

use std::sync::Arc;

use dw_02_chunk_transfer::LocalChunkStore;
use dw_03_domain_dht::DomainDht;
use serde_json::{json, Map, Value};
use shared_types::{DomainRecord, ManifestView, SystemTimeSource, TimeSource};
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::StorageClient;
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::domain::{ChunkedFile, ResolveError};
use crate::ports::RegistryApi;

/// Domain binding requested alongside a publish.
#[derive(Debug, Clone, Default)]
pub struct DomainBinding {
    pub domain: String,
    pub owner: String,
    pub metadata: Map<String, Value>,
    /// Ownership proof fields for `dweb:0x` owners.
    pub public_key: Option<String>,
    pub signature: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub file_name: String,
    pub mime_type: String,
    /// Random UUID when absent.
    pub manifest_id: Option<String>,
    pub chunk_size: usize,
    /// Store chunk bytes inline in the registry.
    pub inline_data: bool,
    /// Pointer lifetime for storage-service copies, in milliseconds.
    pub pointer_ttl_ms: Option<u64>,
    pub domain: Option<DomainBinding>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            file_name: "file.bin".to_string(),
            mime_type: "application/octet-stream".to_string(),
            manifest_id: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            inline_data: false,
            pointer_ttl_ms: None,
            domain: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublishReport {
    pub manifest: ManifestView,
    /// Chunks given a storage-service pointer.
    pub pointers_set: usize,
    pub domain: Option<DomainRecord>,
    pub dht_published: bool,
}

pub struct Publisher {
    registry: Arc<dyn RegistryApi>,
    store: Option<Arc<LocalChunkStore>>,
    local_peer: Option<String>,
    storage: Option<StorageClient>,
    dht: Option<DomainDht>,
    time: Arc<dyn TimeSource>,
}

impl Publisher {
    pub fn new(registry: Arc<dyn RegistryApi>) -> Self {
        Self {
            registry,
            store: None,
            local_peer: None,
            storage: None,
            dht: None,
            time: Arc::new(SystemTimeSource),
        }
    }

    /// Seed `store` with published chunks and list `local_peer` as replica.
    pub fn with_seeding(mut self, store: Arc<LocalChunkStore>, local_peer: impl Into<String>) -> Self {
        self.store = Some(store);
        self.local_peer = Some(local_peer.into());
        self
    }

    pub fn with_storage(mut self, storage: StorageClient) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_dht(mut self, dht: DomainDht) -> Self {
        self.dht = Some(dht);
        self
    }

    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    pub async fn publish(&self, data: &[u8], options: PublishOptions) -> Result<PublishReport, ResolveError> {
        let manifest_id = options
            .manifest_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let file = ChunkedFile::new(
            manifest_id.clone(),
            options.file_name.clone(),
            options.mime_type.clone(),
            data,
            options.chunk_size,
        );

        let replicas: Vec<String> = self.local_peer.iter().cloned().collect();
        if let Some(store) = &self.store {
            store.add_transfer(manifest_id.clone(), file.chunks.clone());
        }
        let mut manifest = self
            .registry
            .create_manifest(&file.upload(options.inline_data, &replicas))
            .await?;
        info!(
            manifest_id = %manifest_id,
            chunks = file.manifest.chunk_count,
            bytes = data.len(),
            "[dw-05] 📦 Manifest published"
        );

        let pointers_set = self.push_to_storage(&file, options.pointer_ttl_ms).await;
        if pointers_set > 0 {
            manifest = self.registry.get_manifest(&manifest_id).await?;
        }

        let (domain, dht_published) = match &options.domain {
            Some(binding) => {
                let (record, dht) = self.bind_domain(binding, &manifest_id).await?;
                (Some(record), dht)
            }
            None => (None, false),
        };

        Ok(PublishReport {
            manifest,
            pointers_set,
            domain,
            dht_published,
        })
    }

    /// Copy every chunk to the storage service and point the registry at
    /// it. Failures are logged and skipped.
    async fn push_to_storage(&self, file: &ChunkedFile, ttl_ms: Option<u64>) -> usize {
        let Some(storage) = &self.storage else {
            return 0;
        };
        let manifest_id = &file.manifest.manifest_id;
        let expires_at = ttl_ms.map(|ttl| self.time.now_millis() + ttl);

        let mut pointers_set = 0;
        for (index, chunk) in file.chunks.iter().enumerate() {
            let index = index as u32;
            let url = match storage.put_chunk(manifest_id, index, chunk).await {
                Ok(url) => url,
                Err(e) => {
                    warn!(manifest_id = %manifest_id, chunk_index = index, error = %e, "[dw-05] Storage upload failed");
                    continue;
                }
            };
            match self
                .registry
                .update_chunk_pointer(manifest_id, index, &url, expires_at)
                .await
            {
                Ok(_) => pointers_set += 1,
                Err(e) => {
                    warn!(manifest_id = %manifest_id, chunk_index = index, error = %e, "[dw-05] Pointer update failed")
                }
            }
        }
        pointers_set
    }

    /// Register in the registry, then best-effort in the DHT.
    async fn bind_domain(
        &self,
        binding: &DomainBinding,
        manifest_id: &str,
    ) -> Result<(DomainRecord, bool), ResolveError> {
        let mut body = json!({
            "domain": binding.domain,
            "owner": binding.owner,
            "manifestId": manifest_id,
            "replicas": self.local_peer.iter().collect::<Vec<_>>(),
        });
        if !binding.metadata.is_empty() {
            body["metadata"] = Value::Object(binding.metadata.clone());
        }
        for (field, value) in [
            ("publicKey", &binding.public_key),
            ("signature", &binding.signature),
            ("message", &binding.message),
        ] {
            if let Some(value) = value {
                body[field] = json!(value);
            }
        }
        let record = self.registry.register_domain(&body).await?;

        let dht_published = match &self.dht {
            Some(dht) => match dht
                .register_domain(&binding.domain, manifest_id, binding.metadata.clone())
                .await
            {
                Ok(_) => true,
                Err(e) => {
                    warn!(domain = %binding.domain, error = %e, "[dw-05] DHT publish failed");
                    false
                }
            },
            None => false,
        };
        info!(domain = %record.domain, manifest_id = %manifest_id, dht_published, "[dw-05] 🌐 Domain bound");
        Ok((record, dht_published))
    }
}
