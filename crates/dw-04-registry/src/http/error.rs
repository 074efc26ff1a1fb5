//! Rendering of registry errors as HTTP responses.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::domain::errors::RegistryError;

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "[dw-04] Request failed");
        } else {
            debug!(code = self.code(), error = %self, "[dw-04] Request rejected");
        }

        let mut response = (status, Json(serde_json::json!({ "error": self.code() }))).into_response();
        if let RegistryError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

/// Parse a request body, mapping any syntax error to `INVALID_JSON`.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, RegistryError> {
    serde_json::from_slice(body).map_err(|e| RegistryError::InvalidJson(e.to_string()))
}

/// Parse a chunk index path segment.
pub(crate) fn parse_index(raw: &str) -> Result<u64, RegistryError> {
    raw.parse::<u64>()
        .map_err(|_| RegistryError::InvalidChunkIndex(raw.to_string()))
}
