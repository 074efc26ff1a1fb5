//! Loopback services shared by the integration flows.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use dw_04_registry::{RateLimitConfig, RegistryConfig, RegistryServer, RegistryService};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// A registry REST server on `127.0.0.1:<random>`, stopped on drop.
pub struct RegistryFixture {
    pub url: String,
    pub service: Arc<RegistryService>,
    shutdown: watch::Sender<bool>,
}

impl RegistryFixture {
    pub async fn start() -> std::io::Result<Self> {
        let config = RegistryConfig {
            rate_limit: RateLimitConfig {
                enabled: false,
                ..RateLimitConfig::default()
            },
            ..RegistryConfig::default()
        };
        let service = RegistryService::open(&config)
            .map(Arc::new)
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let server = RegistryServer::new(Arc::clone(&service), config);
        tokio::spawn(async move {
            let _ = server.serve_on(listener, shutdown_rx).await;
        });

        Ok(Self {
            url: format!("http://{addr}"),
            service,
            shutdown,
        })
    }
}

impl Drop for RegistryFixture {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

type Blobs = Arc<Mutex<HashMap<(String, u32), String>>>;

/// Minimal storage service: `POST /chunks`, `GET /chunks/:id/:index`.
pub struct StorageFixture {
    pub url: String,
    blobs: Blobs,
}

impl StorageFixture {
    pub async fn start() -> std::io::Result<Self> {
        let blobs: Blobs = Arc::default();
        let router = Router::new()
            .route("/chunks", post(store_chunk))
            .route("/chunks/:id/:index", get(load_chunk))
            .with_state(Arc::clone(&blobs));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(Self {
            url: format!("http://{addr}"),
            blobs,
        })
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }

    /// Drop a stored copy so its pointer starts returning 404.
    pub fn forget(&self, manifest_id: &str, chunk_index: u32) {
        self.blobs.lock().remove(&(manifest_id.to_string(), chunk_index));
    }
}

async fn store_chunk(State(blobs): State<Blobs>, Json(body): Json<Value>) -> StatusCode {
    let (Some(id), Some(index), Some(data)) = (
        body["manifestId"].as_str(),
        body["chunkIndex"].as_u64(),
        body["data"].as_str(),
    ) else {
        return StatusCode::BAD_REQUEST;
    };
    blobs
        .lock()
        .insert((id.to_string(), index as u32), data.to_string());
    StatusCode::CREATED
}

async fn load_chunk(
    State(blobs): State<Blobs>,
    Path((id, index)): Path<(String, u32)>,
) -> Result<Json<Value>, StatusCode> {
    blobs
        .lock()
        .get(&(id, index))
        .map(|data| Json(json!({ "data": data })))
        .ok_or(StatusCode::NOT_FOUND)
}
