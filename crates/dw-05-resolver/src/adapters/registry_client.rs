//! reqwest client for the registry REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::{ChunkView, DomainRecord, ManifestView, Timestamp};

use crate::domain::{ClientError, ManifestUpload};
use crate::ports::RegistryApi;

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Build the shared HTTP client used by every adapter in this crate.
pub(crate) fn http_client(timeout: Duration) -> Result<Client, ClientError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5).min(timeout))
        .build()
        .map_err(|e| ClientError::Transport(e.to_string()))
}

/// Turn a response into `T`, or into [`ClientError::Status`] carrying the
/// `{error}` code of a non-2xx body.
pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let code = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error);
        return Err(ClientError::Status {
            status: status.as_u16(),
            code,
        });
    }
    response
        .json()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))
}

/// Registry client over HTTP.
#[derive(Clone)]
pub struct HttpRegistryClient {
    client: Client,
    base_url: String,
}

impl HttpRegistryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client: http_client(timeout)?,
            base_url,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                ClientError::Connection(format!("Cannot connect to {}", self.base_url))
            } else {
                ClientError::from(e)
            }
        })?;
        decode(response).await
    }

    /// `GET /health`.
    pub async fn health(&self) -> Result<Value, ClientError> {
        self.send(self.request(Method::GET, "/health")).await
    }
}

#[async_trait]
impl RegistryApi for HttpRegistryClient {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn get_manifest(&self, manifest_id: &str) -> Result<ManifestView, ClientError> {
        self.send(self.request(Method::GET, &format!("/manifests/{manifest_id}")))
            .await
    }

    async fn get_chunk(&self, manifest_id: &str, chunk_index: u32) -> Result<ChunkView, ClientError> {
        self.send(self.request(
            Method::GET,
            &format!("/manifests/{manifest_id}/chunks/{chunk_index}"),
        ))
        .await
    }

    async fn get_domain(&self, domain: &str) -> Result<DomainRecord, ClientError> {
        self.send(self.request(Method::GET, &format!("/domains/{domain}")))
            .await
    }

    async fn create_manifest(&self, upload: &ManifestUpload) -> Result<ManifestView, ClientError> {
        self.send(self.request(Method::POST, "/manifests").json(upload))
            .await
    }

    async fn register_domain(&self, body: &Value) -> Result<DomainRecord, ClientError> {
        self.send(self.request(Method::POST, "/domains").json(body))
            .await
    }

    async fn update_replicas(
        &self,
        manifest_id: &str,
        peer_id: &str,
        chunk_indexes: Option<&[u32]>,
    ) -> Result<ManifestView, ClientError> {
        let mut body = json!({ "peerId": peer_id });
        if let Some(indexes) = chunk_indexes {
            body["chunkIndexes"] = json!(indexes);
        }
        self.send(
            self.request(Method::PATCH, &format!("/manifests/{manifest_id}/replicas"))
                .json(&body),
        )
        .await
    }

    async fn update_chunk_pointer(
        &self,
        manifest_id: &str,
        chunk_index: u32,
        pointer: &str,
        expires_at: Option<Timestamp>,
    ) -> Result<ChunkView, ClientError> {
        let body = json!({ "pointer": pointer, "expiresAt": expires_at });
        self.send(
            self.request(
                Method::PATCH,
                &format!("/manifests/{manifest_id}/chunks/{chunk_index}"),
            )
            .json(&body),
        )
        .await
    }
}
