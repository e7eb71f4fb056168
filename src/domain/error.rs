use thiserror::Error;

/// Top-level error type for the shipper.
#[derive(Error, Debug)]
pub enum ShipperError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::app::ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] crate::app::LoggingError),

    #[error("Backend error: {0}")]
    Backend(#[from] super::backend::BackendError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] crate::sender::PoolError),

    #[error("Watcher error: {0}")]
    Watcher(#[from] crate::watcher::WatcherError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shutdown error: {0}")]
    Shutdown(String),
}
