//! Domain registration and resolution on top of a [`DhtStore`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use shared_types::{normalize_domain, DhtDomainValue, SystemTimeSource, TimeSource};
use tracing::{debug, info};

use crate::config::DhtConfig;
use crate::domain::{domain_key, DhtError};
use crate::ports::DhtStore;

/// Publishes and looks up `/dweb/domain/<domain>` records.
#[derive(Clone)]
pub struct DomainDht {
    store: Arc<dyn DhtStore>,
    local_peer: String,
    time: Arc<dyn TimeSource>,
    default_timeout: Duration,
}

impl DomainDht {
    pub fn new(store: Arc<dyn DhtStore>, local_peer: impl Into<String>, config: &DhtConfig) -> Self {
        Self {
            store,
            local_peer: local_peer.into(),
            time: Arc::new(SystemTimeSource),
            default_timeout: config.get_timeout(),
        }
    }

    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    /// Put `{manifestId, domain, timestamp, registeredBy, ...metadata}` under
    /// the domain key. Not retried.
    pub async fn register_domain(
        &self,
        domain: &str,
        manifest_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<DhtDomainValue, DhtError> {
        let key = domain_key(domain)?;
        let record = DhtDomainValue {
            manifest_id: manifest_id.to_string(),
            domain: normalize_domain(domain),
            timestamp: self.time.now_millis(),
            registered_by: self.local_peer.clone(),
            metadata,
        };
        self.store.put(&key, serde_json::to_vec(&record)?).await?;
        info!(domain = %record.domain, manifest_id = %manifest_id, "[dw-03] 🌐 Domain published to DHT");
        Ok(record)
    }

    /// Get the domain record. A missing value or an elapsed deadline is
    /// reported as [`DhtError::NotFound`].
    pub async fn resolve_domain(
        &self,
        domain: &str,
        timeout: Option<Duration>,
    ) -> Result<DhtDomainValue, DhtError> {
        let key = domain_key(domain)?;
        let timeout = timeout.unwrap_or(self.default_timeout);

        let bytes = match tokio::time::timeout(timeout, self.store.get(&key)).await {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => {
                debug!(key = %key, "[dw-03] No DHT record");
                return Err(DhtError::NotFound { key });
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                debug!(key = %key, timeout_ms = timeout.as_millis() as u64, "[dw-03] DHT lookup timed out");
                return Err(DhtError::NotFound { key });
            }
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}
