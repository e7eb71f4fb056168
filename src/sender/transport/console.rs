use crate::domain::LogRecord;
use std::io::Write;

/// Prints `[datetime] data` per record to standard output.
#[derive(Debug, Default)]
pub struct ConsoleTransport {
    closed: bool,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, records: &[LogRecord]) -> bool {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for record in records {
            // A closed stdout is not a delivery failure
            let _ = writeln!(out, "{}", format_line(record));
        }
        let _ = out.flush();
        true
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

fn format_line(record: &LogRecord) -> String {
    format!("[{}] {}", record.timestamp, record.data)
}
