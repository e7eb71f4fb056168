//! Minimal HTTP/1.1 listener that turns `GET /logs/<name>` requests into
//! live-tail consumers.

use crate::watcher::{Consumer, Watcher};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_HEADER_LINES: usize = 100;

const STREAM_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: application/json\r\n\
Transfer-Encoding: chunked\r\n\r\n";

const NOT_FOUND_RESPONSE: &[u8] = b"HTTP/1.1 404 Not Found\r\n\
Content-Length: 0\r\n\
Connection: close\r\n\r\n";

pub struct TailServer {
    listener: TcpListener,
    watcher: Arc<Watcher>,
}

impl TailServer {
    pub async fn bind(addr: SocketAddr, watcher: Arc<Watcher>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, watcher })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        match self.local_addr() {
            Ok(addr) => info!("Live tail listening on {}", addr),
            Err(e) => warn!("Live tail listening on unknown address: {}", e),
        }

        loop {
            let accepted = tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let watcher = self.watcher.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, watcher).await {
                            debug!("Live tail request from {} failed: {}", peer, e);
                        }
                    });
                }
                Err(e) => warn!("Failed to accept live tail connection: {}", e),
            }
        }

        info!("Live tail listener stopped");
    }
}

impl std::fmt::Debug for TailServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailServer")
            .field("local_addr", &self.listener.local_addr().ok())
            .finish()
    }
}

async fn handle_connection(stream: TcpStream, watcher: Arc<Watcher>) -> io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let stream_name = match tokio::time::timeout(REQUEST_TIMEOUT, read_request(&mut reader)).await
    {
        Ok(result) => result?,
        Err(_) => None,
    };

    let Some(stream_name) = stream_name else {
        write_half.write_all(NOT_FOUND_RESPONSE).await?;
        write_half.shutdown().await?;
        return Ok(());
    };

    write_half.write_all(STREAM_RESPONSE).await?;
    write_half.flush().await?;

    let consumer = Consumer::new(stream_name, write_half);
    info!(
        "Live tail consumer {} subscribed to {}",
        consumer.id(),
        consumer.stream_name()
    );
    watcher
        .register(consumer)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))
}

/// Reads the request line and skips the headers. Returns the requested
/// stream name, or `None` when the request is not a live-tail request.
async fn read_request<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        return Ok(None);
    }

    let mut header = String::new();
    for _ in 0..MAX_HEADER_LINES {
        header.clear();
        if reader.read_line(&mut header).await? == 0 || header.trim_end().is_empty() {
            break;
        }
    }

    Ok(parse_request_line(&request_line))
}

/// Extracts `<name>` from `GET /logs/<name> HTTP/1.x`.
pub(crate) fn parse_request_line(line: &str) -> Option<String> {
    let mut parts = line.split_whitespace();
    let (method, target, version) = (parts.next()?, parts.next()?, parts.next()?);
    if method != "GET" || !version.starts_with("HTTP/1.") || parts.next().is_some() {
        return None;
    }

    let path = target.split('?').next().unwrap_or(target);
    let name = path.strip_prefix("/logs/")?.trim_end_matches('/');
    if name.is_empty() || name.contains('/') {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_line() {
        assert_eq!(
            parse_request_line("GET /logs/web HTTP/1.1\r\n"),
            Some("web".to_string())
        );
        assert_eq!(
            parse_request_line("GET /logs/web/?follow=1 HTTP/1.0"),
            Some("web".to_string())
        );
        assert_eq!(parse_request_line("POST /logs/web HTTP/1.1"), None);
        assert_eq!(parse_request_line("GET /metrics HTTP/1.1"), None);
        assert_eq!(parse_request_line("GET /logs/ HTTP/1.1"), None);
        assert_eq!(parse_request_line("GET /logs/a/b HTTP/1.1"), None);
        assert_eq!(parse_request_line("GET /logs/web"), None);
        assert_eq!(parse_request_line(""), None);
    }

    #[tokio::test]
    async fn test_read_request_skips_headers() {
        let request: &[u8] = b"GET /logs/api HTTP/1.1\r\nHost: localhost\r\nAccept: */*\r\n\r\n";
        let mut reader = BufReader::new(request);
        assert_eq!(
            read_request(&mut reader).await.unwrap(),
            Some("api".to_string())
        );
    }
}
