use std::io;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::time::timeout;
use uuid::Uuid;

/// Longest one chunk may take to reach a consumer before it counts as gone.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_millis(500);

const DISCONNECT_TIMEOUT: Duration = Duration::from_millis(100);

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A live-tail subscriber: a connection that wants every record of one stream.
pub struct Consumer {
    id: String,
    stream_name: String,
    writer: BufWriter<BoxedWriter>,
}

impl Consumer {
    pub fn new(
        stream_name: impl Into<String>,
        connection: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            stream_name: stream_name.into(),
            writer: BufWriter::new(Box::new(connection)),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Writes and flushes one chunk, failing with `TimedOut` when the peer
    /// stops reading.
    pub(crate) async fn deliver(&mut self, chunk: &[u8]) -> io::Result<()> {
        let write = async {
            self.writer.write_all(chunk).await?;
            self.writer.flush().await
        };
        timeout(DELIVERY_TIMEOUT, write).await.map_err(|_| {
            io::Error::new(io::ErrorKind::TimedOut, "consumer stopped reading")
        })?
    }

    pub(crate) async fn disconnect(&mut self) {
        // The peer may already be gone or no longer reading
        let _ = timeout(DISCONNECT_TIMEOUT, self.writer.shutdown()).await;
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("id", &self.id)
            .field("stream_name", &self.stream_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_ids_are_unique_by_default() {
        let (a, _) = tokio::io::duplex(16);
        let (b, _) = tokio::io::duplex(16);
        let first = Consumer::new("web", a);
        let second = Consumer::new("web", b);
        assert_ne!(first.id(), second.id());
        assert_eq!(first.stream_name(), "web");
    }

    #[tokio::test]
    async fn test_deliver_flushes_to_connection() {
        let (client, mut server) = tokio::io::duplex(256);
        let mut consumer = Consumer::new("web", client).with_id("c1");
        consumer.deliver(b"hello").await.unwrap();

        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(consumer.id(), "c1");
    }

    #[tokio::test]
    async fn test_deliver_fails_once_peer_is_gone() {
        let (client, server) = tokio::io::duplex(256);
        drop(server);
        let mut consumer = Consumer::new("web", client);
        assert!(consumer.deliver(b"hello").await.is_err());
    }

    #[tokio::test]
    async fn test_deliver_times_out_when_peer_stops_reading() {
        let (client, _server) = tokio::io::duplex(16);
        let mut consumer = Consumer::new("web", client);

        let err = consumer.deliver(&[b'x'; 64]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        // Shutting down must not hang on the unflushed buffer either
        tokio::time::timeout(Duration::from_secs(1), consumer.disconnect())
            .await
            .unwrap();
    }
}
