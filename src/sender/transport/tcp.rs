use super::{CONNECT_TIMEOUT, TransportError, encode_json_lines, ensure_kind};
use crate::domain::{Backend, BackendKind, LogRecord};
use std::net::SocketAddr;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tokio::time::timeout;
use tracing::{debug, error};

const SEND_BUFFER_SIZE: u32 = 1024 * 1024;
const WRITER_CAPACITY: usize = 128 * 1024;

/// Ships newline-delimited JSON over a long-lived TCP connection.
#[derive(Debug)]
pub struct TcpTransport {
    writer: Option<BufWriter<TcpStream>>,
    peer: String,
}

impl TcpTransport {
    pub async fn connect(backend: &Backend) -> Result<Self, TransportError> {
        ensure_kind(backend, BackendKind::Tcp)?;

        let stream = timeout(CONNECT_TIMEOUT, dial(backend))
            .await
            .map_err(|_| TransportError::ConnectTimeout(backend.to_string()))??;
        stream.set_nodelay(true)?;

        debug!("Connected to {}", backend);
        Ok(Self {
            writer: Some(BufWriter::with_capacity(WRITER_CAPACITY, stream)),
            peer: backend.to_string(),
        })
    }

    pub async fn send(&mut self, records: &[LogRecord]) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            return false;
        };

        let mut result = Ok(());
        for frame in encode_json_lines(records, None) {
            result = writer.write_all(&frame).await;
            if result.is_err() {
                break;
            }
        }
        if result.is_ok() {
            result = writer.flush().await;
        }

        match result {
            Ok(()) => true,
            Err(e) => {
                error!("[TCP] Sending batch to {} failed: {}", self.peer, e);
                self.close();
                false
            }
        }
    }

    pub fn close(&mut self) {
        // Dropping the stream closes the socket; batches are flushed as they go
        self.writer = None;
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }
}

async fn dial(backend: &Backend) -> Result<TcpStream, TransportError> {
    let addrs: Vec<SocketAddr> = lookup_host((backend.host.as_str(), backend.port))
        .await
        .map_err(|e| TransportError::ConnectFailed {
            backend: backend.to_string(),
            source: e,
        })?
        .collect();

    let mut last_error = None;
    for addr in addrs {
        match open_socket(addr) {
            Ok(socket) => match socket.connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            },
            Err(e) => last_error = Some(e),
        }
    }

    match last_error {
        Some(source) => Err(TransportError::ConnectFailed {
            backend: backend.to_string(),
            source,
        }),
        None => Err(TransportError::Unresolvable(backend.to_string())),
    }
}

fn open_socket(addr: SocketAddr) -> std::io::Result<TcpSocket> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_keepalive(true)?;
    socket.set_send_buffer_size(SEND_BUFFER_SIZE)?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_wrong_kind_is_rejected() {
        let err = TcpTransport::connect(&Backend::black_hole())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::WrongKind { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_port_fails_to_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpTransport::connect(&Backend::new(BackendKind::Tcp, "127.0.0.1", port)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_batches_arrive_as_ordered_lines() {
        const TOTAL: usize = 5;
        const ROUND: usize = 15;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let reader = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(socket).lines();
            let mut names = Vec::new();
            while names.len() < TOTAL * ROUND * 2 {
                let Some(line) = lines.next_line().await.unwrap() else {
                    break;
                };
                let record: LogRecord = serde_json::from_str(&line).unwrap();
                names.push(record.name);
            }
            names
        });

        let mut transport = TcpTransport::connect(&Backend::new(BackendKind::Tcp, "127.0.0.1", port))
            .await
            .unwrap();

        let large = "demo".repeat(500);
        for data in ["", large.as_str()] {
            for i in 0..TOTAL {
                let batch: Vec<LogRecord> = (0..ROUND)
                    .map(|_| LogRecord::new(format!("test{i}"), data))
                    .collect();
                assert!(transport.send(&batch).await);
            }
        }

        let names = reader.await.unwrap();
        assert_eq!(names.len(), TOTAL * ROUND * 2);
        for (i, name) in names.iter().enumerate() {
            assert_eq!(name, &format!("test{}", (i % (TOTAL * ROUND)) / ROUND));
        }

        transport.close();
        assert!(transport.is_closed());
        assert!(!transport.send(&[LogRecord::new("late", "")]).await);
    }
}
