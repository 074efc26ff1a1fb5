//! Outbound side of `/dweb/chunk/1.0.0`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use shared_types::encoding::sha256_hex;
use shared_types::{
    read_json, write_json, FrameStream, PeerId, StreamOpener, SystemTimeSource, TimeSource,
    CHUNK_PROTOCOL,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ChunkTransferConfig;
use crate::domain::{ChunkMessage, ChunkTransferError, ChunkUpload, ChunkUploadAck};

/// Progress after each replication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationProgress {
    pub chunk_index: u32,
    pub completed: usize,
    pub total: usize,
    pub succeeded: bool,
}

/// One failed chunk in a replication pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationFailure {
    pub chunk_index: u32,
    pub reason: String,
}

/// Aggregate result of [`ChunkClient::replicate_to_peer`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplicationReport {
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<ReplicationFailure>,
}

/// Requests and uploads chunks over streams from a [`StreamOpener`].
#[derive(Clone)]
pub struct ChunkClient {
    opener: Arc<dyn StreamOpener>,
    time: Arc<dyn TimeSource>,
    timeout: Duration,
}

impl ChunkClient {
    pub fn new(opener: Arc<dyn StreamOpener>, config: &ChunkTransferConfig) -> Self {
        Self {
            opener,
            time: Arc::new(SystemTimeSource),
            timeout: config.request_timeout(),
        }
    }

    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    /// Fetch one chunk from `peer`.
    pub async fn request_chunk(
        &self,
        peer: &PeerId,
        manifest_id: &str,
        chunk_index: u32,
    ) -> Result<Vec<u8>, ChunkTransferError> {
        let request_id = Uuid::new_v4().to_string();
        let request = ChunkMessage::request(&request_id, manifest_id, chunk_index);

        match self.exchange(peer, &request).await? {
            ChunkMessage::ChunkResponse(response) => {
                if response.request_id != request_id
                    || response.manifest_id != manifest_id
                    || response.chunk_index != chunk_index
                {
                    return Err(ChunkTransferError::UnexpectedReply(format!(
                        "response for {}#{} (request {})",
                        response.manifest_id, response.chunk_index, response.request_id
                    )));
                }
                debug!(
                    peer = %peer,
                    manifest_id = %manifest_id,
                    chunk_index,
                    bytes = response.data.len(),
                    "[dw-02] Chunk received"
                );
                Ok(response.data)
            }
            ChunkMessage::ChunkError(error) => Err(ChunkTransferError::Remote(error.reason)),
            other => Err(ChunkTransferError::UnexpectedReply(other.kind().to_string())),
        }
    }

    /// Push one chunk to `peer`. The hash is computed here.
    pub async fn upload_chunk(
        &self,
        peer: &PeerId,
        manifest_id: &str,
        chunk_index: u32,
        data: Vec<u8>,
    ) -> Result<ChunkUploadAck, ChunkTransferError> {
        let hash = sha256_hex(&data);
        self.upload_with_hash(peer, manifest_id, chunk_index, data, hash)
            .await
    }

    /// Push one chunk with a caller-supplied hash.
    pub async fn upload_with_hash(
        &self,
        peer: &PeerId,
        manifest_id: &str,
        chunk_index: u32,
        data: Vec<u8>,
        hash: String,
    ) -> Result<ChunkUploadAck, ChunkTransferError> {
        let upload = ChunkMessage::ChunkUpload(ChunkUpload {
            manifest_id: manifest_id.to_string(),
            chunk_index,
            data,
            hash,
            timestamp: self.time.now_millis(),
        });

        match self.exchange(peer, &upload).await? {
            ChunkMessage::ChunkUploadAck(ack) => Ok(ack),
            ChunkMessage::ChunkUploadNack(nack) => Err(ChunkTransferError::Rejected(nack.reason)),
            ChunkMessage::ChunkError(error) => Err(ChunkTransferError::Remote(error.reason)),
            other => Err(ChunkTransferError::UnexpectedReply(other.kind().to_string())),
        }
    }

    /// Upload every chunk of a file to `peer`, one at a time in index order.
    ///
    /// Individual failures do not stop the pass. `on_progress` runs after
    /// every attempt.
    pub async fn replicate_to_peer<F>(
        &self,
        peer: &PeerId,
        manifest_id: &str,
        chunks: &[Vec<u8>],
        mut on_progress: F,
    ) -> ReplicationReport
    where
        F: FnMut(ReplicationProgress),
    {
        let mut report = ReplicationReport::default();
        let total = chunks.len();

        for (position, data) in chunks.iter().enumerate() {
            let chunk_index = position as u32;
            let result = self
                .upload_chunk(peer, manifest_id, chunk_index, data.clone())
                .await;
            let succeeded = result.is_ok();
            match result {
                Ok(_) => report.successful += 1,
                Err(e) => {
                    debug!(
                        peer = %peer,
                        manifest_id = %manifest_id,
                        chunk_index,
                        error = %e,
                        "[dw-02] Replication upload failed"
                    );
                    report.failed += 1;
                    report.errors.push(ReplicationFailure {
                        chunk_index,
                        reason: e.to_string(),
                    });
                }
            }
            on_progress(ReplicationProgress {
                chunk_index,
                completed: position + 1,
                total,
                succeeded,
            });
        }

        if report.failed == 0 {
            info!(peer = %peer, manifest_id = %manifest_id, chunks = total, "[dw-02] 📤 Replication complete");
        } else {
            warn!(
                peer = %peer,
                manifest_id = %manifest_id,
                successful = report.successful,
                failed = report.failed,
                "[dw-02] Replication finished with failures"
            );
        }
        report
    }

    /// One message out, one message back. The stream is closed on every path.
    async fn exchange(
        &self,
        peer: &PeerId,
        message: &ChunkMessage,
    ) -> Result<ChunkMessage, ChunkTransferError> {
        let mut stream = self.opener.open_stream(peer, CHUNK_PROTOCOL).await?;
        let result = tokio::time::timeout(self.timeout, round_trip(&mut stream, message)).await;
        if let Err(e) = stream.close().await {
            debug!(peer = %peer, error = %e, "[dw-02] Failed to close chunk stream");
        }
        match result {
            Ok(reply) => reply,
            Err(_) => Err(ChunkTransferError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

async fn round_trip(
    stream: &mut Box<dyn FrameStream>,
    message: &ChunkMessage,
) -> Result<ChunkMessage, ChunkTransferError> {
    write_json(stream, message).await?;
    Ok(read_json(stream).await?)
}
