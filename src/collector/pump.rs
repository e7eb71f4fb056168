//! Turns a byte stream of workload output into log records.

use crate::domain::LogRecord;
use crate::sender::Writer;
use crate::watcher::Watcher;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Format of the `datetime` field on pumped records.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Dropped or failed count at which a pump reports the shipping counters.
const REPORT_THRESHOLD: u64 = 1000;

/// Identity stamped on every record read from one output stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSource {
    pub id: String,
    pub name: String,
    pub entrypoint: String,
    pub ident: String,
    /// `stdout` or `stderr`.
    pub kind: String,
    pub extra: HashMap<String, String>,
}

impl StreamSource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn with_entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = entrypoint.into();
        self
    }

    pub fn with_ident(mut self, ident: impl Into<String>) -> Self {
        self.ident = ident.into();
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Builds the record for one line of this stream, stamped with local time.
    pub fn record(&self, data: String) -> LogRecord {
        LogRecord {
            stream_id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind.clone(),
            entrypoint: self.entrypoint.clone(),
            ident: self.ident.clone(),
            data,
            timestamp: chrono::Local::now().format(DATETIME_FORMAT).to_string(),
            extra: self.extra.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpSummary {
    pub lines: u64,
    pub rejected: u64,
}

/// Feeds every line of a stream to the live-tail hub and to the writer.
#[derive(Clone)]
pub struct LinePump {
    writer: Arc<Writer>,
    watcher: Arc<Watcher>,
}

impl LinePump {
    pub fn new(writer: Arc<Writer>, watcher: Arc<Watcher>) -> Self {
        Self { writer, watcher }
    }

    /// Reads until EOF or a read error.
    pub async fn pump<R>(&self, source: &StreamSource, reader: R) -> PumpSummary
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        let mut summary = PumpSummary::default();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    error!(
                        "Reading {} stream of {} failed: {}",
                        source.kind, source.name, e
                    );
                    break;
                }
            }

            let record = source.record(strip_line_ending(&line));
            summary.lines += 1;

            // Live-tail clients must never hold up shipping
            if let Err(e) = self.watcher.try_publish(record.clone()) {
                debug!("Live tail unavailable for {}: {}", source.name, e);
            }

            if let Err(e) = self.writer.write(record) {
                summary.rejected += 1;
                debug!("Record from {} rejected: {}", source.name, e);
                if self.writer.dropped() == REPORT_THRESHOLD
                    || self.writer.failed() == REPORT_THRESHOLD
                {
                    error!(
                        "Sending to backends fails: {} sent, {} dropped, {} failed",
                        self.writer.sent(),
                        self.writer.dropped(),
                        self.writer.failed()
                    );
                }
            }
        }

        info!(
            "Pump for {} {} finished after {} lines",
            source.name, source.kind, summary.lines
        );
        summary
    }

    /// Runs [`pump`](Self::pump) on its own task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn<R>(&self, source: StreamSource, reader: R) -> JoinHandle<PumpSummary>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let pump = self.clone();
        tokio::spawn(async move { pump.pump(&source, reader).await })
    }
}

impl std::fmt::Debug for LinePump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinePump")
            .field("writer", &self.writer)
            .field("watcher", &self.watcher)
            .finish()
    }
}

/// Drops one trailing `\n`, then one trailing `\r`.
fn strip_line_ending(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
