use crate::domain::LogRecord;
use tracing::info;

/// Bridges records into the process's own structured log.
#[derive(Debug, Default)]
pub struct LogTransport {
    closed: bool,
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, records: &[LogRecord]) -> bool {
        for record in records {
            info!(
                target: "rask_log_shipper::records",
                name = %record.name,
                id = %record.stream_id,
                kind = %record.kind,
                "{}",
                record.data
            );
        }
        true
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_sink_always_succeeds() {
        let mut transport = LogTransport::new();
        assert!(!transport.is_closed());
        assert!(transport.send(&[]));
        assert!(transport.send(&[
            LogRecord::new("web", "log1").with_timestamp("2024-01-01 10:00:00"),
            LogRecord::new("web", "log2").with_timestamp("2024-01-01 10:00:01"),
        ]));

        transport.close();
        assert!(transport.is_closed());
    }
}
