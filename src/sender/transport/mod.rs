//! Delivery transports, one per backend kind.
//!
//! A transport owns its socket or handle and is not shared: the dispatch
//! pool hands each instance to exactly one worker at a time.

pub mod blackhole;
pub mod console;
pub mod encoding;
#[cfg(unix)]
pub mod journal;
pub mod log;
pub mod tcp;
pub mod udp;

pub use blackhole::BlackHoleTransport;
pub use console::ConsoleTransport;
pub use encoding::encode_json_lines;
#[cfg(unix)]
pub use journal::JournalTransport;
pub use log::LogTransport;
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

use crate::domain::{Backend, BackendKind, LogRecord};
use std::time::Duration;
use thiserror::Error;

/// Upper bound for establishing a backend connection, DNS included.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Backend {backend} can not be served by a {expected:?} transport")]
    WrongKind {
        backend: String,
        expected: BackendKind,
    },
    #[error("Could not resolve backend {0}")]
    Unresolvable(String),
    #[error("Connecting to {0} timed out")]
    ConnectTimeout(String),
    #[error("Connecting to {backend} failed: {source}")]
    ConnectFailed {
        backend: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Journal daemon is not available at {0}")]
    JournalUnavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub(crate) fn ensure_kind(backend: &Backend, expected: BackendKind) -> Result<(), TransportError> {
    if backend.kind == expected {
        Ok(())
    } else {
        Err(TransportError::WrongKind {
            backend: backend.to_string(),
            expected,
        })
    }
}

/// A live, single-owner connection to one backend.
#[derive(Debug)]
pub enum Transport {
    Tcp(TcpTransport),
    Udp(UdpTransport),
    #[cfg(unix)]
    Journal(JournalTransport),
    Console(ConsoleTransport),
    Log(LogTransport),
    BlackHole(BlackHoleTransport),
}

impl Transport {
    /// Opens the transport matching the backend's kind.
    pub async fn connect(backend: &Backend) -> Result<Self, TransportError> {
        let transport = match backend.kind {
            BackendKind::Tcp => Transport::Tcp(TcpTransport::connect(backend).await?),
            BackendKind::Udp => Transport::Udp(UdpTransport::connect(backend).await?),
            #[cfg(unix)]
            BackendKind::Journal => Transport::Journal(JournalTransport::connect()?),
            #[cfg(not(unix))]
            BackendKind::Journal => {
                return Err(TransportError::JournalUnavailable(
                    "unsupported platform".to_string(),
                ));
            }
            BackendKind::Console => Transport::Console(ConsoleTransport::new()),
            BackendKind::Log => Transport::Log(LogTransport::new()),
            BackendKind::BlackHole => Transport::BlackHole(BlackHoleTransport::new()),
        };
        Ok(transport)
    }

    /// Delivers the records in order.
    ///
    /// `false` means the transport is unusable and has already closed itself;
    /// the caller must discard it.
    pub async fn send(&mut self, records: &[LogRecord]) -> bool {
        match self {
            Transport::Tcp(t) => t.send(records).await,
            Transport::Udp(t) => t.send(records).await,
            #[cfg(unix)]
            Transport::Journal(t) => t.send(records).await,
            Transport::Console(t) => t.send(records),
            Transport::Log(t) => t.send(records),
            Transport::BlackHole(t) => t.send(records),
        }
    }

    pub fn close(&mut self) {
        match self {
            Transport::Tcp(t) => t.close(),
            Transport::Udp(t) => t.close(),
            #[cfg(unix)]
            Transport::Journal(t) => t.close(),
            Transport::Console(t) => t.close(),
            Transport::Log(t) => t.close(),
            Transport::BlackHole(t) => t.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Transport::Tcp(t) => t.is_closed(),
            Transport::Udp(t) => t.is_closed(),
            #[cfg(unix)]
            Transport::Journal(t) => t.is_closed(),
            Transport::Console(t) => t.is_closed(),
            Transport::Log(t) => t.is_closed(),
            Transport::BlackHole(t) => t.is_closed(),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Transport::Tcp(_) => BackendKind::Tcp,
            Transport::Udp(_) => BackendKind::Udp,
            #[cfg(unix)]
            Transport::Journal(_) => BackendKind::Journal,
            Transport::Console(_) => BackendKind::Console,
            Transport::Log(_) => BackendKind::Log,
            Transport::BlackHole(_) => BackendKind::BlackHole,
        }
    }
}
