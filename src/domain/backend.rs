use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend can not be empty")]
    Empty,
    #[error("Illegal backend format '{0}', it must be in kind://host:port form")]
    IllegalFormat(String),
    #[error("Port of backend '{0}' should be a positive number")]
    IllegalPort(String),
    #[error("Backend kind '{0}' is not supported")]
    UnsupportedKind(String),
}

/// Transport family a backend is delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Tcp,
    Udp,
    Journal,
    Console,
    Log,
    BlackHole,
}

impl BackendKind {
    pub fn scheme(&self) -> &'static str {
        match self {
            BackendKind::Tcp => "tcp",
            BackendKind::Udp => "udp",
            BackendKind::Journal => "journal",
            BackendKind::Console => "console",
            BackendKind::Log => "log",
            BackendKind::BlackHole => "blackhole",
        }
    }

    /// Kinds that never look at host and port.
    fn ignores_address(&self) -> bool {
        matches!(
            self,
            BackendKind::Console | BackendKind::Log | BackendKind::BlackHole
        )
    }

    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "tcp" => Some(BackendKind::Tcp),
            "udp" => Some(BackendKind::Udp),
            "journal" => Some(BackendKind::Journal),
            "console" => Some(BackendKind::Console),
            "log" => Some(BackendKind::Log),
            "blackhole" => Some(BackendKind::BlackHole),
            _ => None,
        }
    }
}

/// Immutable description of one delivery destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Backend {
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    pub host_with_port: String,
}

impl Backend {
    /// Builds a descriptor without any validation.
    pub fn new(kind: BackendKind, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let host_with_port = format!("{host}:{port}");
        Self {
            kind,
            host,
            port,
            host_with_port,
        }
    }

    pub fn black_hole() -> Self {
        Self::new(BackendKind::BlackHole, "", 0)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.ignores_address() {
            write!(f, "{}://", self.kind.scheme())
        } else {
            write!(f, "{}://{}", self.kind.scheme(), self.host_with_port)
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_backend(s)
    }
}

/// Parses `kind://host:port` into a [`Backend`].
pub fn parse_backend(address: &str) -> Result<Backend, BackendError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(BackendError::Empty);
    }

    let url = match Url::parse(address) {
        Ok(url) => url,
        Err(url::ParseError::InvalidPort) => {
            return Err(BackendError::IllegalPort(address.to_string()));
        }
        Err(_) => return Err(BackendError::IllegalFormat(address.to_string())),
    };

    let kind = BackendKind::from_scheme(url.scheme());
    if let Some(kind) = kind
        && kind.ignores_address()
    {
        return Ok(Backend::new(kind, "", 0));
    }

    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.trim_start_matches('[').trim_end_matches(']'),
        _ => return Err(BackendError::IllegalFormat(address.to_string())),
    };

    let Some(kind) = kind else {
        return Err(BackendError::UnsupportedKind(url.scheme().to_string()));
    };

    match url.port() {
        Some(port) if port > 0 => Ok(Backend::new(kind, host, port)),
        _ => Err(BackendError::IllegalPort(address.to_string())),
    }
}

/// Parses every address, failing on the first invalid one.
pub fn parse_backends<S: AsRef<str>>(addresses: &[S]) -> Result<Vec<Backend>, BackendError> {
    if addresses.is_empty() {
        return Err(BackendError::Empty);
    }
    addresses
        .iter()
        .map(|address| parse_backend(address.as_ref()))
        .collect()
}
