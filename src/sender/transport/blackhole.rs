use crate::domain::LogRecord;

/// Accepts and discards everything. Used when no real backend is configured.
#[derive(Debug, Default)]
pub struct BlackHoleTransport {
    closed: bool,
}

impl BlackHoleTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, _records: &[LogRecord]) -> bool {
        true
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
