//! `/dweb/chunk/1.0.0` wire messages.
//!
//! One message per stream direction. The `type` field selects the variant:
//!
//! ```text
//! chunk-request     -> chunk-response | chunk-error
//! chunk-upload      -> chunk-upload-ack | chunk-upload-nack
//! ```

use serde::{Deserialize, Serialize};
use shared_types::encoding::base64_bytes;
use shared_types::Timestamp;

/// Reason sent when no chunk provider is installed.
pub const REASON_NO_HANDLER: &str = "no-handler";
/// Reason sent when the provider does not hold the chunk.
pub const REASON_NOT_FOUND: &str = "Chunk not found";
/// Nack reason for an upload whose data does not hash to `hash`.
pub const REASON_HASH_MISMATCH: &str = "hash-mismatch";
/// Reason sent for a message the receiver does not accept as a request.
pub const REASON_UNEXPECTED: &str = "unexpected-message";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Success,
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRequest {
    pub request_id: String,
    pub manifest_id: String,
    pub chunk_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub request_id: String,
    pub manifest_id: String,
    pub chunk_index: u32,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub status: TransferStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkErrorReply {
    pub request_id: String,
    pub reason: String,
    pub status: TransferStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUpload {
    pub manifest_id: String,
    pub chunk_index: u32,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// Lowercase hex SHA-256 of `data`.
    pub hash: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadAck {
    pub manifest_id: String,
    pub chunk_index: u32,
    /// Peer id of the node that stored the chunk.
    pub peer_id: String,
    pub status: TransferStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadNack {
    pub manifest_id: String,
    pub chunk_index: u32,
    pub reason: String,
    pub status: TransferStatus,
}

/// Every message on the chunk protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChunkMessage {
    ChunkRequest(ChunkRequest),
    ChunkResponse(ChunkResponse),
    ChunkError(ChunkErrorReply),
    ChunkUpload(ChunkUpload),
    ChunkUploadAck(ChunkUploadAck),
    ChunkUploadNack(ChunkUploadNack),
}

impl ChunkMessage {
    pub fn request(request_id: impl Into<String>, manifest_id: impl Into<String>, chunk_index: u32) -> Self {
        ChunkMessage::ChunkRequest(ChunkRequest {
            request_id: request_id.into(),
            manifest_id: manifest_id.into(),
            chunk_index,
        })
    }

    pub fn response(request: &ChunkRequest, data: Vec<u8>) -> Self {
        ChunkMessage::ChunkResponse(ChunkResponse {
            request_id: request.request_id.clone(),
            manifest_id: request.manifest_id.clone(),
            chunk_index: request.chunk_index,
            data,
            status: TransferStatus::Success,
        })
    }

    pub fn error(request_id: impl Into<String>, reason: impl Into<String>) -> Self {
        ChunkMessage::ChunkError(ChunkErrorReply {
            request_id: request_id.into(),
            reason: reason.into(),
            status: TransferStatus::Error,
        })
    }

    pub fn ack(upload: &ChunkUpload, peer_id: impl Into<String>) -> Self {
        ChunkMessage::ChunkUploadAck(ChunkUploadAck {
            manifest_id: upload.manifest_id.clone(),
            chunk_index: upload.chunk_index,
            peer_id: peer_id.into(),
            status: TransferStatus::Ok,
        })
    }

    pub fn nack(upload: &ChunkUpload, reason: impl Into<String>) -> Self {
        ChunkMessage::ChunkUploadNack(ChunkUploadNack {
            manifest_id: upload.manifest_id.clone(),
            chunk_index: upload.chunk_index,
            reason: reason.into(),
            status: TransferStatus::Error,
        })
    }

    /// Wire name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            ChunkMessage::ChunkRequest(_) => "chunk-request",
            ChunkMessage::ChunkResponse(_) => "chunk-response",
            ChunkMessage::ChunkError(_) => "chunk-error",
            ChunkMessage::ChunkUpload(_) => "chunk-upload",
            ChunkMessage::ChunkUploadAck(_) => "chunk-upload-ack",
            ChunkMessage::ChunkUploadNack(_) => "chunk-upload-nack",
        }
    }
}
