//! Inbound side of `/dweb/chunk/1.0.0`.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::encoding::sha256_hex;
use shared_types::{read_json, write_json, FrameStream, PeerId, ProtocolHandler, CHUNK_PROTOCOL};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::ChunkTransferConfig;
use crate::domain::{
    ChunkMessage, ChunkRequest, ChunkUpload, REASON_HASH_MISMATCH, REASON_NO_HANDLER,
    REASON_UNEXPECTED,
};
use crate::ports::ChunkProvider;

/// A chunk accepted from a peer upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReceived {
    pub manifest_id: String,
    pub chunk_index: u32,
    pub from: PeerId,
}

/// Serves chunk requests and accepts chunk uploads.
pub struct ChunkProtocolHandler {
    local_peer: PeerId,
    provider: RwLock<Option<Arc<dyn ChunkProvider>>>,
    verify_upload_hash: bool,
    events: broadcast::Sender<ChunkReceived>,
}

impl ChunkProtocolHandler {
    /// Handler without a provider. Requests are answered with `no-handler`
    /// until [`set_provider`](Self::set_provider) is called.
    pub fn new(local_peer: PeerId, config: &ChunkTransferConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            local_peer,
            provider: RwLock::new(None),
            verify_upload_hash: config.verify_upload_hash,
            events,
        }
    }

    pub fn with_provider(
        local_peer: PeerId,
        config: &ChunkTransferConfig,
        provider: Arc<dyn ChunkProvider>,
    ) -> Self {
        let handler = Self::new(local_peer, config);
        handler.set_provider(provider);
        handler
    }

    pub fn set_provider(&self, provider: Arc<dyn ChunkProvider>) {
        *self.provider.write() = Some(provider);
    }

    /// Uploads accepted from peers.
    pub fn subscribe(&self) -> broadcast::Receiver<ChunkReceived> {
        self.events.subscribe()
    }

    /// Reply for one inbound message.
    pub fn respond(&self, remote: &PeerId, message: ChunkMessage) -> ChunkMessage {
        match message {
            ChunkMessage::ChunkRequest(request) => self.on_request(remote, &request),
            ChunkMessage::ChunkUpload(upload) => self.on_upload(remote, upload),
            other => {
                debug!(peer = %remote, kind = other.kind(), "[dw-02] Unexpected inbound message");
                ChunkMessage::error("", REASON_UNEXPECTED)
            }
        }
    }

    fn on_request(&self, remote: &PeerId, request: &ChunkRequest) -> ChunkMessage {
        let provider = self.provider.read().clone();
        let Some(provider) = provider else {
            return ChunkMessage::error(&request.request_id, REASON_NO_HANDLER);
        };
        match provider.get_chunk(&request.manifest_id, request.chunk_index) {
            Ok(data) => {
                debug!(
                    peer = %remote,
                    manifest_id = %request.manifest_id,
                    chunk_index = request.chunk_index,
                    bytes = data.len(),
                    "[dw-02] Serving chunk"
                );
                ChunkMessage::response(request, data)
            }
            Err(reason) => {
                debug!(
                    peer = %remote,
                    manifest_id = %request.manifest_id,
                    chunk_index = request.chunk_index,
                    reason = %reason,
                    "[dw-02] Chunk request refused"
                );
                ChunkMessage::error(&request.request_id, reason)
            }
        }
    }

    fn on_upload(&self, remote: &PeerId, upload: ChunkUpload) -> ChunkMessage {
        if self.verify_upload_hash && !sha256_hex(&upload.data).eq_ignore_ascii_case(upload.hash.trim()) {
            warn!(
                peer = %remote,
                manifest_id = %upload.manifest_id,
                chunk_index = upload.chunk_index,
                "[dw-02] ⚠️ Upload hash mismatch, rejecting"
            );
            return ChunkMessage::nack(&upload, REASON_HASH_MISMATCH);
        }

        let provider = self.provider.read().clone();
        let Some(provider) = provider else {
            return ChunkMessage::nack(&upload, REASON_NO_HANDLER);
        };

        let reply = ChunkMessage::ack(&upload, self.local_peer.to_string());
        info!(
            peer = %remote,
            manifest_id = %upload.manifest_id,
            chunk_index = upload.chunk_index,
            bytes = upload.data.len(),
            "[dw-02] 📥 Chunk stored from upload"
        );
        let event = ChunkReceived {
            manifest_id: upload.manifest_id.clone(),
            chunk_index: upload.chunk_index,
            from: *remote,
        };
        provider.store_received(&upload.manifest_id, upload.chunk_index, upload.data);
        // No subscribers is fine.
        let _ = self.events.send(event);
        reply
    }
}

#[async_trait]
impl ProtocolHandler for ChunkProtocolHandler {
    fn protocol(&self) -> &'static str {
        CHUNK_PROTOCOL
    }

    async fn handle(&self, remote: PeerId, mut stream: Box<dyn FrameStream>) {
        let reply = match read_json::<ChunkMessage, _>(&mut stream).await {
            Ok(message) => self.respond(&remote, message),
            Err(e) => {
                debug!(peer = %remote, error = %e, "[dw-02] Unreadable chunk message");
                ChunkMessage::error("", e.to_string())
            }
        };
        if let Err(e) = write_json(&mut stream, &reply).await {
            debug!(peer = %remote, error = %e, "[dw-02] Failed to write chunk reply");
        }
        if let Err(e) = stream.close().await {
            debug!(peer = %remote, error = %e, "[dw-02] Failed to close chunk stream");
        }
    }
}
