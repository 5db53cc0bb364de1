//! Stream a Docker-tar image archive to a container daemon's image-load
//! endpoint, reporting written-byte progress.
//!
//! The daemon speaks plain HTTP/1.1 over a Unix-domain socket (the usual
//! `/var/run/docker.sock`) or, less commonly, a TCP endpoint. Pulling in a
//! full HTTP client for one streaming POST is unnecessary, so this writes
//! the request by hand.

use crate::error::{Error, Result};
use crate::tarball::ImageTarball;
use ocibuild_events::{AllocationRegistry, Event, EventSender};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};

const LOAD_PATH: &str = "/images/load";
const PROGRESS_ALLOCATION: &str = "daemon-image-load";

/// Where the daemon's image-load endpoint is reachable.
#[derive(Clone, Debug)]
pub enum DaemonEndpoint {
    /// A Unix-domain socket path, e.g. `/var/run/docker.sock`.
    Unix(std::path::PathBuf),
    /// A `host:port` TCP endpoint.
    Tcp(String),
}

/// Stream `tarball` to the daemon at `endpoint`, rendered as a Docker-tar
/// archive, reporting progress against `PROGRESS_ALLOCATION` through
/// `events` (if given).
pub async fn load(
    tarball: &ImageTarball,
    endpoint: &DaemonEndpoint,
    events: Option<(Arc<EventSender>, Arc<AllocationRegistry>)>,
) -> Result<()> {
    let mut body = Vec::new();
    crate::docker_tar::write(tarball, &mut body)?;

    if let Some((_, allocations)) = &events {
        allocations.open(PROGRESS_ALLOCATION, Some(body.len() as u64));
    }

    let request = format!(
        "POST {LOAD_PATH} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/x-tar\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    match endpoint {
        DaemonEndpoint::Unix(path) => {
            let stream = UnixStream::connect(path)
                .await
                .map_err(|e| Error::io(path.display().to_string(), "connect", e))?;
            stream_request(stream, request, &body, events).await
        }
        DaemonEndpoint::Tcp(addr) => {
            let stream = TcpStream::connect(addr)
                .await
                .map_err(|e| Error::io(addr.clone(), "connect", e))?;
            stream_request(stream, request, &body, events).await
        }
    }
}

async fn stream_request<S>(
    mut stream: S,
    request_head: String,
    body: &[u8],
    events: Option<(Arc<EventSender>, Arc<AllocationRegistry>)>,
) -> Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    stream
        .write_all(request_head.as_bytes())
        .await
        .map_err(|e| Error::io("<daemon socket>", "write request head", e))?;

    const CHUNK: usize = 64 * 1024;
    for chunk in body.chunks(CHUNK) {
        stream
            .write_all(chunk)
            .await
            .map_err(|e| Error::io("<daemon socket>", "write request body", e))?;
        if let Some((sender, allocations)) = &events {
            allocations.advance(PROGRESS_ALLOCATION, chunk.len() as u64);
            let _ = sender.send(Event::progress(PROGRESS_ALLOCATION, chunk.len() as u64));
        }
    }

    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .await
        .map_err(|e| Error::io("<daemon socket>", "read response", e))?;

    let status_line = response
        .split(|&b| b == b'\n')
        .next()
        .map(|line| String::from_utf8_lossy(line).trim().to_string())
        .unwrap_or_default();

    if !status_line.contains("200") {
        return Err(Error::DaemonLoadFailed { status_line });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tarball::LayerBlob;
    use ocibuild_digest::Digest;
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    struct MockStream {
        written: Vec<u8>,
        response: std::io::Cursor<Vec<u8>>,
    }

    impl AsyncWrite for MockStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.written.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }
        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncRead for MockStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.response).poll_read(cx, buf)
        }
    }

    fn sample_tarball() -> ImageTarball {
        ImageTarball {
            manifest_media_type: "application/vnd.oci.image.manifest.v1+json".to_string(),
            manifest_bytes: b"{}".to_vec(),
            manifest_digest: Digest::of_bytes(b"{}"),
            config_bytes: b"{}".to_vec(),
            config_digest: Digest::of_bytes(b"config"),
            layers: vec![LayerBlob {
                diff_id: Digest::of_bytes(b"diff"),
                compressed_digest: Digest::of_bytes(b"compressed"),
                compressed_bytes: b"gz".to_vec(),
                uncompressed_tar: b"tar".to_vec(),
            }],
            repo_tags: vec!["app:latest".to_string()],
        }
    }

    #[tokio::test]
    async fn success_response_is_accepted() {
        let tarball = sample_tarball();
        let mut body = Vec::new();
        crate::docker_tar::write(&tarball, &mut body).unwrap();

        let mock = MockStream {
            written: Vec::new(),
            response: std::io::Cursor::new(b"HTTP/1.1 200 OK\r\n\r\n".to_vec()),
        };
        let result = stream_request(mock, "POST /images/load HTTP/1.1\r\n\r\n".to_string(), &body, None).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn error_response_is_rejected() {
        let mock = MockStream {
            written: Vec::new(),
            response: std::io::Cursor::new(b"HTTP/1.1 500 Internal Server Error\r\n\r\n".to_vec()),
        };
        let result = stream_request(mock, "POST /images/load HTTP/1.1\r\n\r\n".to_string(), b"x", None).await;
        assert!(matches!(result, Err(Error::DaemonLoadFailed { .. })));
    }
}
