use super::{CONNECT_TIMEOUT, TransportError, encode_json_lines, ensure_kind};
use crate::domain::{Backend, BackendKind, LogRecord};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::{UdpSocket, lookup_host};
use tokio::time::timeout;
use tracing::error;

/// Budget for one datagram, kept under a typical path MTU to avoid fragmentation.
pub const PACKET_LIMIT: usize = 1420;

/// Ships newline-delimited JSON in datagrams of at most [`PACKET_LIMIT`] bytes.
#[derive(Debug)]
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    peer: String,
}

impl UdpTransport {
    pub async fn connect(backend: &Backend) -> Result<Self, TransportError> {
        ensure_kind(backend, BackendKind::Udp)?;

        let socket = timeout(CONNECT_TIMEOUT, dial(backend))
            .await
            .map_err(|_| TransportError::ConnectTimeout(backend.to_string()))??;

        Ok(Self {
            socket: Some(socket),
            peer: backend.to_string(),
        })
    }

    pub async fn send(&mut self, records: &[LogRecord]) -> bool {
        let Some(socket) = self.socket.as_ref() else {
            return false;
        };

        for frame in encode_json_lines(records, Some(PACKET_LIMIT)) {
            if let Err(e) = socket.send(&frame).await {
                error!("[UDP] Sending batch to {} failed: {}", self.peer, e);
                self.close();
                return false;
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

async fn dial(backend: &Backend) -> Result<UdpSocket, TransportError> {
    let addr: SocketAddr = lookup_host((backend.host.as_str(), backend.port))
        .await
        .map_err(|e| TransportError::ConnectFailed {
            backend: backend.to_string(),
            source: e,
        })?
        .next()
        .ok_or_else(|| TransportError::Unresolvable(backend.to_string()))?;

    let local = if addr.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    };
    let socket = UdpSocket::bind(local).await?;
    socket
        .connect(addr)
        .await
        .map_err(|e| TransportError::ConnectFailed {
            backend: backend.to_string(),
            source: e,
        })?;
    Ok(socket)
}
