//! `Blob`: an abstract, possibly-retryable producer of bytes.

use crate::digest::{BlobDescriptor, Digest};
use crate::error::{Error, Result};
use sha2::{Digest as _, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Abstract producer of bytes with a single operation: write self to a sink,
/// returning the observed [`BlobDescriptor`].
///
/// The returned descriptor is authoritative: callers must not trust any size
/// asserted before the write completes.
#[async_trait::async_trait]
pub trait Blob: Send + Sync {
    /// Write this blob's bytes to `sink`, returning the digest and byte count
    /// actually observed.
    async fn write_to(&self, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<BlobDescriptor>;

    /// Whether this blob can be re-read from the beginning after a partial
    /// transport failure. Non-retryable blobs (e.g. one-shot streams) must
    /// not be retried by the transport layer.
    fn is_retryable(&self) -> bool;
}

/// An in-memory byte blob. Always retryable.
#[derive(Clone)]
pub struct BytesBlob(Arc<Vec<u8>>);

impl BytesBlob {
    /// Wrap an owned byte vector.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Arc::new(bytes))
    }
}

#[async_trait::async_trait]
impl Blob for BytesBlob {
    async fn write_to(&self, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<BlobDescriptor> {
        sink.write_all(&self.0)
            .await
            .map_err(|e| Error::io(e, "write"))?;
        let digest = Digest::of_bytes(&self.0);
        Ok(BlobDescriptor::new(self.0.len() as u64, digest))
    }

    fn is_retryable(&self) -> bool {
        true
    }
}

/// A blob backed by a file on disk. Retryable, since the file can be reopened.
#[derive(Clone)]
pub struct FileBlob(PathBuf);

impl FileBlob {
    /// Reference a file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }
}

#[async_trait::async_trait]
impl Blob for FileBlob {
    async fn write_to(&self, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<BlobDescriptor> {
        let mut file = tokio::fs::File::open(&self.0)
            .await
            .map_err(|e| Error::io(e, format!("open {}", self.0.display())))?;
        compute_digest(&mut file, Some(sink)).await
    }

    fn is_retryable(&self) -> bool {
        true
    }
}

/// A blob whose content is a serialized JSON value. Retryable.
#[derive(Clone)]
pub struct JsonBlob(Arc<Vec<u8>>);

impl JsonBlob {
    /// Serialize `value` with `serde_json` and wrap the result.
    pub fn new<T: serde::Serialize>(value: &T) -> std::result::Result<Self, serde_json::Error> {
        Ok(Self(Arc::new(serde_json::to_vec(value)?)))
    }
}

#[async_trait::async_trait]
impl Blob for JsonBlob {
    async fn write_to(&self, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<BlobDescriptor> {
        sink.write_all(&self.0)
            .await
            .map_err(|e| Error::io(e, "write"))?;
        let digest = Digest::of_bytes(&self.0);
        Ok(BlobDescriptor::new(self.0.len() as u64, digest))
    }

    fn is_retryable(&self) -> bool {
        true
    }
}

/// A blob produced by a one-shot callback that fills a buffer. Not
/// retryable: the callback is consumed on first use, matching the source's
/// "callback-driven producer" Blob kind.
pub struct CallbackBlob {
    producer: std::sync::Mutex<Option<Box<dyn FnOnce(&mut Vec<u8>) -> Result<()> + Send>>>,
}

impl CallbackBlob {
    /// Wrap a one-shot producer closure that appends its output to `buf`.
    #[must_use]
    pub fn new(producer: impl FnOnce(&mut Vec<u8>) -> Result<()> + Send + 'static) -> Self {
        Self {
            producer: std::sync::Mutex::new(Some(Box::new(producer))),
        }
    }
}

#[async_trait::async_trait]
impl Blob for CallbackBlob {
    async fn write_to(&self, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<BlobDescriptor> {
        let producer = self
            .producer
            .lock()
            .expect("callback blob mutex poisoned")
            .take()
            .expect("callback blob consumed more than once");
        let mut buf = Vec::new();
        producer(&mut buf)?;
        sink.write_all(&buf).await.map_err(|e| Error::io(e, "write"))?;
        let digest = Digest::of_bytes(&buf);
        Ok(BlobDescriptor::new(buf.len() as u64, digest))
    }

    fn is_retryable(&self) -> bool {
        false
    }
}

/// Stream `reader` to completion, computing its digest and byte count. If
/// `sink` is given, bytes are copied through to it as they are read; the
/// streaming hasher is flushed before the final digest is taken.
pub async fn compute_digest(
    reader: &mut (dyn AsyncRead + Send + Unpin),
    mut sink: Option<&mut (dyn AsyncWrite + Send + Unpin)>,
) -> Result<BlobDescriptor> {
    use tokio::io::AsyncReadExt;

    let mut hasher = Sha256::new();
    let mut size: u64 = 0;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| Error::io(e, "read"))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
        if let Some(sink) = sink.as_mut() {
            sink.write_all(&buf[..n])
                .await
                .map_err(|e| Error::io(e, "write"))?;
        }
    }
    if let Some(sink) = sink {
        sink.flush().await.map_err(|e| Error::io(e, "flush"))?;
    }
    let hash = hasher.finalize();
    let digest =
        Digest::from_hash(hex::encode(hash)).expect("hex::encode always yields valid hex");
    Ok(BlobDescriptor::new(size, digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bytes_blob_reports_authoritative_size_and_digest() {
        let blob = BytesBlob::new(b"hello world".to_vec());
        let mut out = Vec::new();
        let desc = blob.write_to(&mut out).await.unwrap();
        assert_eq!(out, b"hello world");
        assert_eq!(desc.size, 11);
        assert_eq!(desc.digest, Digest::of_bytes(b"hello world"));
        assert!(blob.is_retryable());
    }

    #[tokio::test]
    async fn file_blob_streams_and_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        tokio::fs::write(&path, b"file contents").await.unwrap();
        let blob = FileBlob::new(&path);
        let mut out = Vec::new();
        let desc = blob.write_to(&mut out).await.unwrap();
        assert_eq!(out, b"file contents");
        assert_eq!(desc.digest, Digest::of_bytes(b"file contents"));
    }

    #[tokio::test]
    async fn json_blob_serializes_and_hashes() {
        #[derive(serde::Serialize)]
        struct Payload {
            a: u32,
        }
        let blob = JsonBlob::new(&Payload { a: 1 }).unwrap();
        let mut out = Vec::new();
        let desc = blob.write_to(&mut out).await.unwrap();
        assert_eq!(out, br#"{"a":1}"#);
        assert_eq!(desc.digest, Digest::of_bytes(br#"{"a":1}"#));
    }

    #[tokio::test]
    async fn callback_blob_is_not_retryable() {
        let blob = CallbackBlob::new(|buf| {
            buf.extend_from_slice(b"produced");
            Ok(())
        });
        assert!(!blob.is_retryable());
        let mut out = Vec::new();
        let desc = blob.write_to(&mut out).await.unwrap();
        assert_eq!(out, b"produced");
        assert_eq!(desc.digest, Digest::of_bytes(b"produced"));
    }

    #[tokio::test]
    async fn compute_digest_copies_through_to_sink() {
        let mut reader: &[u8] = b"streamed bytes";
        let mut sink = Vec::new();
        let desc = compute_digest(&mut reader, Some(&mut sink)).await.unwrap();
        assert_eq!(sink, b"streamed bytes");
        assert_eq!(desc.digest, Digest::of_bytes(b"streamed bytes"));
        assert_eq!(desc.size, 14);
    }

    #[tokio::test]
    async fn compute_digest_without_sink_just_hashes() {
        let mut reader: &[u8] = b"abc";
        let desc = compute_digest(&mut reader, None).await.unwrap();
        assert_eq!(desc.digest, Digest::of_bytes(b"abc"));
    }
}
