pub mod pump;

pub use pump::{LinePump, PumpSummary, StreamSource, DATETIME_FORMAT};
