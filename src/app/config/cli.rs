use super::{ConfigError, LogLevel};
use crate::domain::{Backend, parse_backends};
use crate::sender::WriterConfig;
use crate::sender::writer::{DEFAULT_BUFFER_SIZE, DEFAULT_CONCURRENCY};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Backend addresses, comma separated (tcp://, udp://, journal://, blackhole://)
    #[arg(long, env = "LOG_FORWARDS", value_delimiter = ',')]
    pub forwards: Vec<String>,

    /// Concurrent dispatch workers
    #[arg(long, env = "LOG_CONNECTIONS", default_value = "10")]
    pub connections: usize,

    /// Ingestion queue capacity in records
    #[arg(long, env = "LOG_BUFFER_SIZE", default_value = "5000")]
    pub buffer_size: usize,

    /// Records per second, zero or negative disables limiting
    #[arg(
        long,
        env = "LOG_RATELIMIT",
        default_value = "-1",
        allow_negative_numbers = true
    )]
    pub rate_limit: i64,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Address of the live-tail listener (disabled if not set)
    #[arg(long, env = "TAIL_ADDR")]
    pub tail_addr: Option<String>,

    /// Seconds between counter reports, 0 disables reporting
    #[arg(long, env = "STATS_INTERVAL_SECS", default_value = "60")]
    pub stats_interval_secs: u64,

    /// Configuration file path (optional)
    #[arg(long, env = "CONFIG_FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            forwards: Vec::new(),
            connections: DEFAULT_CONCURRENCY,
            buffer_size: DEFAULT_BUFFER_SIZE,
            rate_limit: -1,
            log_level: LogLevel::Info,
            tail_addr: None,
            stats_interval_secs: 60,
            config_file: None,
        }
    }
}

impl Config {
    /// Parses arguments (with environment fallbacks) and, when a
    /// configuration file is named, loads that file instead.
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::try_parse_from(args)?;
        if let Some(path) = &config.config_file {
            let mut from_file = Self::from_file(path)?;
            from_file.config_file = Some(path.clone());
            return Ok(from_file);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parsed backends; an empty list means records are discarded.
    pub fn backends(&self) -> Result<Vec<Backend>, ConfigError> {
        let forwards: Vec<&str> = self
            .forwards
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .collect();
        if forwards.is_empty() {
            return Ok(Vec::new());
        }
        Ok(parse_backends(&forwards)?)
    }

    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            concurrency: self.connections,
            buffer_size: self.buffer_size,
            rate_limit: self.rate_limit,
        }
    }

    pub fn tail_socket_addr(&self) -> Result<Option<SocketAddr>, ConfigError> {
        self.tail_addr
            .as_deref()
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(|addr| {
                addr.parse::<SocketAddr>().map_err(|e| {
                    ConfigError::InvalidConfig(format!("Invalid tail address '{addr}': {e}"))
                })
            })
            .transpose()
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }
}
