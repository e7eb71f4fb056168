use super::config::LogLevel;
use std::sync::OnceLock;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Targets that are noisy below `warn`.
const DEFAULT_DIRECTIVES: &[&str] = &["tokio=warn", "tokio_util=warn"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {details}")]
    InvalidFilter { filter: String, details: String },
    #[error("Failed to install global subscriber: {0}")]
    InstallFailed(String),
}

/// Builds the filter string: the base level followed by the default
/// per-target directives.
pub fn build_filter_string(level: LogLevel) -> String {
    let mut parts = Vec::with_capacity(DEFAULT_DIRECTIVES.len() + 1);
    parts.push(level.as_str());
    parts.extend_from_slice(DEFAULT_DIRECTIVES);
    parts.join(",")
}

fn install(level: LogLevel) -> Result<(), LoggingError> {
    // RUST_LOG wins over the configured level when present
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let filter = build_filter_string(level);
            EnvFilter::try_new(&filter).map_err(|e| LoggingError::InvalidFilter {
                filter,
                details: e.to_string(),
            })?
        }
    };

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .compact(),
    );

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::InstallFailed(e.to_string()))
}

/// Installs the global subscriber once; later calls return the outcome of
/// the first one.
pub fn setup_logging(level: LogLevel) -> Result<(), LoggingError> {
    static INIT: OnceLock<Result<(), LoggingError>> = OnceLock::new();
    INIT.get_or_init(|| install(level)).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_string() {
        let filter = build_filter_string(LogLevel::Debug);
        assert!(filter.starts_with("debug,"));
        assert!(filter.contains("tokio=warn"));
        assert!(EnvFilter::try_new(&filter).is_ok());
    }

    #[test]
    fn test_setup_logging_is_idempotent() {
        let first = setup_logging(LogLevel::Info);
        let second = setup_logging(LogLevel::Trace);
        assert_eq!(first, second);
    }
}
