//! Domain layer for rask-log-shipper.
//!
//! Contains the canonical types shared across all modules:
//! - `LogRecord`: one output line of a workload, the unit of shipping
//! - `Backend`: an immutable delivery destination parsed from `kind://host:port`
//! - `ShipperError`: Top-level error type

pub mod backend;
pub mod error;
pub mod log_record;

pub use backend::{Backend, BackendError, BackendKind, parse_backend, parse_backends};
pub use error::ShipperError;
pub use log_record::LogRecord;
