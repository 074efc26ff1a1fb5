//! Ports for the chunk protocol.

/// Local chunk storage consulted by the protocol handler.
pub trait ChunkProvider: Send + Sync {
    /// Bytes of one chunk. The error string is sent to the requester as the
    /// `chunk-error` reason.
    fn get_chunk(&self, manifest_id: &str, chunk_index: u32) -> Result<Vec<u8>, String>;

    /// Keep a chunk accepted from a peer upload.
    fn store_received(&self, manifest_id: &str, chunk_index: u32, data: Vec<u8>);
}
