//! Domain record keys and `/dweb/kad/1.0.0` messages.

use serde::{Deserialize, Serialize};
use shared_types::encoding::{base64_bytes, base64_opt};
use shared_types::{normalize_domain, DOMAIN_KEY_PREFIX};

use super::errors::DhtError;

/// DHT key for a domain: `/dweb/domain/<normalized domain>`.
pub fn domain_key(domain: &str) -> Result<String, DhtError> {
    let domain = normalize_domain(domain);
    if domain.is_empty() {
        return Err(DhtError::InvalidDomain(domain));
    }
    Ok(format!("{DOMAIN_KEY_PREFIX}{domain}"))
}

/// One request or reply on the record protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum KadMessage {
    PutValue {
        key: String,
        #[serde(with = "base64_bytes")]
        value: Vec<u8>,
    },
    PutAck {
        key: String,
    },
    GetValue {
        key: String,
    },
    Value {
        key: String,
        #[serde(with = "base64_opt", default)]
        value: Option<Vec<u8>>,
    },
    Error {
        reason: String,
    },
}
