//! Pointer URL fetcher. A pointer answers `{ "data": "<base64>" }`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use shared_types::encoding::base64_bytes;

use super::registry_client::http_client;
use crate::domain::{ClientError, PointerError};
use crate::ports::PointerFetcher;

#[derive(Deserialize)]
struct PointerBody {
    #[serde(with = "base64_bytes")]
    data: Vec<u8>,
}

#[derive(Clone)]
pub struct HttpPointerFetcher {
    client: Client,
}

impl HttpPointerFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl PointerFetcher for HttpPointerFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PointerError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PointerError::Fetch(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PointerError::Status(status.as_u16()));
        }
        let body: PointerBody = response
            .json()
            .await
            .map_err(|e| PointerError::Fetch(e.to_string()))?;
        Ok(body.data)
    }
}
