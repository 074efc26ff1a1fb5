//! DHT store port.

use async_trait::async_trait;

use crate::domain::DhtError;

/// Key/value record store backing domain resolution.
///
/// Implementations are eventually consistent; `get` may return a stale or
/// missing value. Callers bound `get` with their own timeout.
#[async_trait]
pub trait DhtStore: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), DhtError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DhtError>;
}
