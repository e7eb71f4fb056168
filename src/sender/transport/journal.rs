//! Native journald protocol over the daemon's datagram socket.

use super::TransportError;
use crate::domain::LogRecord;
use bytes::{BufMut, BytesMut};
use std::path::{Path, PathBuf};
use tokio::net::UnixDatagram;
use tracing::debug;

pub const JOURNAL_SOCKET: &str = "/run/systemd/journal/socket";

/// syslog `LOG_ERR`
const PRIORITY: &str = "3";

/// Forwards each record to the local journal with its metadata as fields.
///
/// All instances talk to the same daemon socket, so there is little value in
/// pooling more than one.
#[derive(Debug)]
pub struct JournalTransport {
    socket: Option<UnixDatagram>,
    path: PathBuf,
}

impl JournalTransport {
    pub fn connect() -> Result<Self, TransportError> {
        Self::with_socket_path(JOURNAL_SOCKET)
    }

    pub fn with_socket_path(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TransportError::JournalUnavailable(path.display().to_string()));
        }
        Ok(Self {
            socket: Some(UnixDatagram::unbound()?),
            path: path.to_path_buf(),
        })
    }

    /// Individual entries the daemon refuses are skipped; the batch still counts
    /// as delivered.
    pub async fn send(&mut self, records: &[LogRecord]) -> bool {
        let Some(socket) = self.socket.as_ref() else {
            return false;
        };
        for record in records {
            let entry = encode_entry(record);
            if let Err(e) = socket.send_to(&entry, &self.path).await {
                debug!("Journal rejected entry of '{}': {}", record.name, e);
            }
        }
        true
    }

    pub fn close(&mut self) {
        self.socket = None;
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }
}

fn encode_entry(record: &LogRecord) -> BytesMut {
    let extra = serde_json::to_string(&record.extra).unwrap_or_default();
    let message = format!("message {}", record.data);

    let mut buf = BytesMut::with_capacity(256 + message.len());
    put_field(&mut buf, "MESSAGE", &message);
    put_field(&mut buf, "PRIORITY", PRIORITY);
    put_field(&mut buf, "SYSLOG_IDENTIFIER", &record.name);
    put_field(&mut buf, "ID", &record.stream_id);
    put_field(&mut buf, "TYPE", &record.kind);
    put_field(&mut buf, "ENTRY_POINT", &record.entrypoint);
    put_field(&mut buf, "IDENT", &record.ident);
    put_field(&mut buf, "DATE_TIME", &record.timestamp);
    put_field(&mut buf, "EXTRA", &extra);
    buf
}

/// `KEY=value\n`, or the length-prefixed form when the value spans lines.
fn put_field(buf: &mut BytesMut, key: &str, value: &str) {
    buf.put_slice(key.as_bytes());
    if value.contains('\n') {
        buf.put_u8(b'\n');
        buf.put_u64_le(value.len() as u64);
    } else {
        buf.put_u8(b'=');
    }
    buf.put_slice(value.as_bytes());
    buf.put_u8(b'\n');
}
