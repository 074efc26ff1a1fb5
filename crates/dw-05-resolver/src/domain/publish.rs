//! Chunking and manifest construction for publishing.

use serde::Serialize;
use shared_types::encoding::{encode_base64, sha256_hex};
use shared_types::Manifest;

use crate::config::DEFAULT_CHUNK_SIZE;

/// Split `data` into `chunk_size` slices. The last slice may be shorter.
/// Empty input yields no chunks.
pub fn split_chunks(data: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    data.chunks(chunk_size.max(1)).map(<[u8]>::to_vec).collect()
}

/// A file cut into chunks together with its manifest.
#[derive(Debug, Clone)]
pub struct ChunkedFile {
    pub manifest: Manifest,
    pub chunks: Vec<Vec<u8>>,
}

impl ChunkedFile {
    pub fn new(
        manifest_id: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        data: &[u8],
        chunk_size: usize,
    ) -> Self {
        let chunk_size = if chunk_size == 0 { DEFAULT_CHUNK_SIZE } else { chunk_size };
        let chunks = split_chunks(data, chunk_size);
        let manifest = Manifest {
            manifest_id: manifest_id.into(),
            file_name: file_name.into(),
            file_size: data.len() as u64,
            mime_type: mime_type.into(),
            chunk_size: chunk_size as u64,
            chunk_count: chunks.len() as u32,
            sha256: sha256_hex(data),
            chunk_hashes: chunks.iter().map(|c| sha256_hex(c)).collect(),
        };
        Self { manifest, chunks }
    }

    /// Body for `POST /manifests`.
    pub fn upload(&self, inline_data: bool, replicas: &[String]) -> ManifestUpload {
        let count = self.chunks.len();
        ManifestUpload {
            manifest: self.manifest.clone(),
            chunk_data: inline_data
                .then(|| self.chunks.iter().map(|c| Some(encode_base64(c))).collect()),
            chunk_replicas: (!replicas.is_empty()).then(|| vec![replicas.to_vec(); count]),
            replicas: (!replicas.is_empty()).then(|| replicas.to_vec()),
        }
    }
}

/// `POST /manifests` payload: the manifest plus optional index-aligned
/// chunk arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestUpload {
    #[serde(flatten)]
    pub manifest: Manifest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_data: Option<Vec<Option<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_replicas: Option<Vec<Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keeps_short_tail() {
        let chunks = split_chunks(&[1, 2, 3, 4, 5], 2);
        assert_eq!(chunks, vec![vec![1, 2], vec![3, 4], vec![5]]);
        assert!(split_chunks(&[], 2).is_empty());
    }

    #[test]
    fn test_manifest_hashes() {
        let file = ChunkedFile::new("m1", "a.txt", "text/plain", b"hello world", 4);
        assert_eq!(file.manifest.chunk_count, 3);
        assert_eq!(file.manifest.file_size, 11);
        assert_eq!(file.manifest.sha256, sha256_hex(b"hello world"));
        assert_eq!(file.manifest.chunk_hashes[2], sha256_hex(b"rld"));
    }

    #[test]
    fn test_upload_body_shape() {
        let file = ChunkedFile::new("m1", "a.bin", "application/octet-stream", b"abcdef", 3);

        let bare = serde_json::to_value(file.upload(false, &[])).unwrap();
        assert_eq!(bare["manifestId"], "m1");
        assert!(bare.get("chunkData").is_none());
        assert!(bare.get("replicas").is_none());

        let full = serde_json::to_value(file.upload(true, &["peer-a".to_string()])).unwrap();
        assert_eq!(full["chunkData"][1], encode_base64(b"def"));
        assert_eq!(full["chunkReplicas"], serde_json::json!([["peer-a"], ["peer-a"]]));
    }
}
