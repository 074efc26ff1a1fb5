//! Replica announcements.

use serde_json::Value;

use super::errors::RegistryError;

/// Body of `PATCH /manifests/:id/replicas`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaUpdate {
    pub peer_id: String,
    /// Indexes the peer holds; `None` means every chunk.
    pub chunk_indexes: Option<Vec<u64>>,
}

impl ReplicaUpdate {
    pub fn all_chunks(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            chunk_indexes: None,
        }
    }

    pub fn from_json(body: &Value) -> Result<Self, RegistryError> {
        let object = body
            .as_object()
            .ok_or_else(|| RegistryError::InvalidJson("expected a JSON object".into()))?;

        let peer_id = match object.get("peerId") {
            Some(Value::String(peer)) if !peer.trim().is_empty() => peer.trim().to_string(),
            _ => return Err(RegistryError::InvalidPeerId("peerId is required".into())),
        };

        let chunk_indexes = match object.get("chunkIndexes") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .map(|item| {
                        item.as_u64().ok_or_else(|| {
                            RegistryError::InvalidChunkIndex(format!("{item} is not a chunk index"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Some(other) => {
                return Err(RegistryError::InvalidChunkIndex(format!(
                    "chunkIndexes must be an array, got {other}"
                )))
            }
        };

        Ok(Self {
            peer_id,
            chunk_indexes,
        })
    }

    /// Resolve the target indexes against `chunk_count`, rejecting any out
    /// of range.
    pub fn indexes(&self, chunk_count: u32) -> Result<Vec<u32>, RegistryError> {
        match &self.chunk_indexes {
            None => Ok((0..chunk_count).collect()),
            Some(indexes) => indexes
                .iter()
                .map(|&index| check_index(index, chunk_count))
                .collect(),
        }
    }
}

/// Check `index < chunk_count`.
pub fn check_index(index: u64, chunk_count: u32) -> Result<u32, RegistryError> {
    if index < chunk_count as u64 {
        Ok(index as u32)
    } else {
        Err(RegistryError::ChunkIndexOutOfRange { index, chunk_count })
    }
}
