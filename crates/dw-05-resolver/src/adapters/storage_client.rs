//! Client for the external storage service.
//!
//! `POST /chunks {manifestId, chunkIndex, data}` stores a copy;
//! `GET /chunks/:manifestId/:index` returns `{data}`. The GET URL doubles as
//! the chunk pointer.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use shared_types::encoding::base64_bytes;

use super::registry_client::{decode, http_client};
use crate::domain::ClientError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoreChunk<'a> {
    manifest_id: &'a str,
    chunk_index: u32,
    #[serde(with = "base64_bytes")]
    data: &'a [u8],
}

#[derive(Deserialize)]
struct StoredChunk {
    #[serde(with = "base64_bytes")]
    data: Vec<u8>,
}

#[derive(Clone)]
pub struct StorageClient {
    client: Client,
    base_url: String,
}

impl StorageClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// URL serving one chunk.
    pub fn chunk_url(&self, manifest_id: &str, chunk_index: u32) -> String {
        format!("{}/chunks/{manifest_id}/{chunk_index}", self.base_url)
    }

    /// Store a chunk copy and return its pointer URL.
    pub async fn put_chunk(
        &self,
        manifest_id: &str,
        chunk_index: u32,
        data: &[u8],
    ) -> Result<String, ClientError> {
        let body = StoreChunk {
            manifest_id,
            chunk_index,
            data,
        };
        let response = self
            .client
            .post(format!("{}/chunks", self.base_url))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::Status {
                status: response.status().as_u16(),
                code: None,
            });
        }
        Ok(self.chunk_url(manifest_id, chunk_index))
    }

    /// Fetch a stored chunk; `None` on 404.
    pub async fn get_chunk(
        &self,
        manifest_id: &str,
        chunk_index: u32,
    ) -> Result<Option<Vec<u8>>, ClientError> {
        let response = self
            .client
            .get(self.chunk_url(manifest_id, chunk_index))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let stored: StoredChunk = decode(response).await?;
        Ok(Some(stored.data))
    }
}
