//! REST handlers. Each handler is a thin shell over [`RegistryService`].

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use super::error::{parse_body, parse_index};
use super::AppState;
use crate::domain::errors::RegistryError;
use crate::domain::{DomainPatch, DomainRegistration, ManifestSubmission, PointerUpdate, ReplicaUpdate};
use crate::service::RegistryService;

type ApiResult<T> = Result<T, RegistryError>;

/// Run a service call on the blocking pool. Calls hold the service mutex
/// and the file store writes to disk synchronously.
async fn blocking<T, F>(state: &AppState, call: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&RegistryService) -> ApiResult<T> + Send + 'static,
{
    let service = Arc::clone(&state.service);
    tokio::task::spawn_blocking(move || call(&service))
        .await
        .map_err(|e| RegistryError::Storage(format!("registry task failed: {e}")))?
}

/// Health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "dweb-registry",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn create_manifest(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let value: Value = parse_body(&body)?;
    let submission: ManifestSubmission = serde_json::from_value(value)
        .map_err(|e| RegistryError::InvalidManifest(e.to_string()))?;
    let view = blocking(&state, move |s| s.create_manifest(submission)).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn list_manifests(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(blocking(&state, |s| s.list_manifests()).await?))
}

pub async fn get_manifest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(blocking(&state, move |s| s.get_manifest(&id)).await?))
}

pub async fn update_replicas(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let value: Value = parse_body(&body)?;
    let update = ReplicaUpdate::from_json(&value)?;
    Ok(Json(
        blocking(&state, move |s| s.update_manifest_replicas(&id, &update)).await?,
    ))
}

pub async fn get_chunk(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let index = parse_index(&index)?;
    Ok(Json(blocking(&state, move |s| s.get_manifest_chunk(&id, index)).await?))
}

pub async fn update_chunk_pointer(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let index = parse_index(&index)?;
    let value: Value = parse_body(&body)?;
    let update = PointerUpdate::from_json(&value)?;
    Ok(Json(
        blocking(&state, move |s| s.update_chunk_pointer(&id, index, &update)).await?,
    ))
}

pub async fn get_pointer_history(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    let index = parse_index(&index)?;
    // Unparseable limits fall back to the default page size.
    let limit = params.get("limit").and_then(|raw| raw.trim().parse::<usize>().ok());
    Ok(Json(
        blocking(&state, move |s| s.get_chunk_pointer_history(&id, index, limit)).await?,
    ))
}

pub async fn register_domain(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let value: Value = parse_body(&body)?;
    let registration: DomainRegistration =
        serde_json::from_value(value).map_err(|e| RegistryError::InvalidJson(e.to_string()))?;
    let record = blocking(&state, move |s| s.register_domain(registration)).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_domains(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(blocking(&state, |s| s.list_domains()).await?))
}

pub async fn get_domain(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(blocking(&state, move |s| s.get_domain(&domain)).await?))
}

pub async fn update_domain(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let value: Value = parse_body(&body)?;
    let patch: DomainPatch = serde_json::from_value(value)
        .map_err(|e| RegistryError::InvalidDomainUpdate(e.to_string()))?;
    Ok(Json(blocking(&state, move |s| s.update_domain(&domain, patch)).await?))
}

pub async fn delete_domain(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let record = blocking(&state, move |s| s.delete_domain(&domain)).await?;
    Ok(Json(json!({ "domain": record.domain, "deleted": true })))
}

/// `POST /maintenance/prune-pointers`. An optional `{ "now": ms }` body
/// overrides the service clock.
pub async fn prune_pointers(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let now = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let value: Value = parse_body(&body)?;
        match value.get("now") {
            None | Some(Value::Null) => None,
            Some(now) => Some(now.as_u64().ok_or_else(|| {
                RegistryError::InvalidJson(format!("now must be a millisecond timestamp, got {now}"))
            })?),
        }
    };
    let report = blocking(&state, move |s| match now {
        Some(now) => s.prune_expired_pointers(now),
        None => s.prune_expired_pointers_now(),
    })
    .await?;
    Ok(Json(report))
}
