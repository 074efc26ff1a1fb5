//! Length-prefixed frame codec.
//!
//! Wire format: `[unsigned varint length][payload]`, payload is one UTF-8
//! JSON document. A clean end of stream before a length prefix is reported
//! as `Ok(None)`; an end of stream inside a frame is an error.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::FrameError;

/// Upper bound on a single frame. Large enough for a 256 KiB chunk after
/// base64 expansion with generous headroom.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// Longest unsigned varint accepted for a frame length.
const MAX_PREFIX_BYTES: usize = 10;

/// A bidirectional stream of frames.
#[async_trait]
pub trait FrameStream: Send {
    /// Read the next frame. `Ok(None)` on clean end of stream.
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError>;

    /// Write one frame and flush it.
    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), FrameError>;

    /// Finish the write side. Reading may continue until the remote closes.
    async fn close(&mut self) -> Result<(), FrameError>;
}

#[async_trait]
impl FrameStream for Box<dyn FrameStream> {
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        (**self).read_frame().await
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), FrameError> {
        (**self).write_frame(frame).await
    }

    async fn close(&mut self) -> Result<(), FrameError> {
        (**self).close().await
    }
}

/// Read one frame and decode it as JSON. End of stream is [`FrameError::Closed`].
pub async fn read_json<T, S>(stream: &mut S) -> Result<T, FrameError>
where
    T: DeserializeOwned,
    S: FrameStream + ?Sized,
{
    let frame = stream.read_frame().await?.ok_or(FrameError::Closed)?;
    Ok(serde_json::from_slice(&frame)?)
}

/// Encode `message` as JSON and write it as one frame.
pub async fn write_json<T, S>(stream: &mut S, message: &T) -> Result<(), FrameError>
where
    T: Serialize + Sync,
    S: FrameStream + ?Sized,
{
    let frame = serde_json::to_vec(message)?;
    stream.write_frame(&frame).await
}

/// [`FrameStream`] over any tokio reader/writer pair.
///
/// Used for QUIC bidirectional streams and for `tokio::io::duplex` pipes.
pub struct FramedStream<R, W> {
    reader: R,
    writer: W,
    write_closed: bool,
}

impl<R, W> FramedStream<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            write_closed: false,
        }
    }

    /// Read the varint length prefix byte by byte.
    async fn read_prefix(&mut self) -> Result<Option<usize>, FrameError> {
        let mut prefix = [0u8; MAX_PREFIX_BYTES];
        for i in 0..MAX_PREFIX_BYTES {
            let mut byte = [0u8; 1];
            let read = self.reader.read(&mut byte).await?;
            if read == 0 {
                return if i == 0 {
                    Ok(None)
                } else {
                    Err(FrameError::UnexpectedEof)
                };
            }
            prefix[i] = byte[0];
            if unsigned_varint::decode::is_last(byte[0]) {
                let (len, _) = unsigned_varint::decode::usize(&prefix[..=i])
                    .map_err(|e| FrameError::InvalidPrefix(e.to_string()))?;
                return Ok(Some(len));
            }
        }
        Err(FrameError::InvalidPrefix("varint overflow".to_string()))
    }
}

#[async_trait]
impl<R, W> FrameStream for FramedStream<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let Some(len) = self.read_prefix().await? else {
            return Ok(None);
        };
        if len > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        let mut payload = vec![0u8; len];
        self.reader
            .read_exact(&mut payload)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => FrameError::UnexpectedEof,
                _ => FrameError::Io(e),
            })?;
        Ok(Some(payload))
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), FrameError> {
        if frame.len() > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge {
                len: frame.len(),
                max: MAX_FRAME_LEN,
            });
        }
        let mut buf = unsigned_varint::encode::usize_buffer();
        let prefix = unsigned_varint::encode::usize(frame.len(), &mut buf);
        self.writer.write_all(prefix).await?;
        self.writer.write_all(frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), FrameError> {
        if self.write_closed {
            return Ok(());
        }
        self.write_closed = true;
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn pipe() -> (
        FramedStream<tokio::io::ReadHalf<tokio::io::DuplexStream>, tokio::io::WriteHalf<tokio::io::DuplexStream>>,
        FramedStream<tokio::io::ReadHalf<tokio::io::DuplexStream>, tokio::io::WriteHalf<tokio::io::DuplexStream>>,
    ) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let (ar, aw) = tokio::io::split(a);
        let (br, bw) = tokio::io::split(b);
        (FramedStream::new(ar, aw), FramedStream::new(br, bw))
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ping {
        seq: u32,
    }

    #[tokio::test]
    async fn test_json_frames_cross_the_pipe() {
        let (mut left, mut right) = pipe();
        write_json(&mut left, &Ping { seq: 7 }).await.unwrap();
        left.close().await.unwrap();

        let ping: Ping = read_json(&mut right).await.unwrap();
        assert_eq!(ping, Ping { seq: 7 });
        assert!(right.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_frame_larger_than_one_varint_byte() {
        let (mut left, mut right) = pipe();
        let payload = vec![b'x'; 300];
        let writer = tokio::spawn(async move {
            left.write_frame(&payload).await.unwrap();
            left.close().await.unwrap();
        });
        let frame = right.read_frame().await.unwrap().unwrap();
        assert_eq!(frame.len(), 300);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_stream_is_reported_to_json_reader() {
        let (mut left, mut right) = pipe();
        left.close().await.unwrap();
        let result: Result<Ping, _> = read_json(&mut right).await;
        assert!(matches!(result, Err(FrameError::Closed)));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_an_error() {
        let (a, b) = tokio::io::duplex(1024);
        let (_ar, mut aw) = tokio::io::split(a);
        let (br, bw) = tokio::io::split(b);
        // Announce 10 bytes, deliver 3.
        aw.write_all(&[10, b'a', b'b', b'c']).await.unwrap();
        aw.shutdown().await.unwrap();

        let mut reader = FramedStream::new(br, bw);
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_oversized_announcement_is_rejected() {
        let (a, b) = tokio::io::duplex(1024);
        let (_ar, mut aw) = tokio::io::split(a);
        let (br, bw) = tokio::io::split(b);
        let mut buf = unsigned_varint::encode::usize_buffer();
        aw.write_all(unsigned_varint::encode::usize(MAX_FRAME_LEN + 1, &mut buf))
            .await
            .unwrap();

        let mut reader = FramedStream::new(br, bw);
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::TooLarge { .. })
        ));
    }
}
