#![deny(rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
#![allow(
    clippy::cast_possible_truncation, // Sizes and counters stay far below u32/u64 limits
    clippy::missing_errors_doc,       // Internal API
    clippy::module_name_repetitions,  // e.g. TransportError in transport module
    clippy::must_use_candidate,       // Annotated selectively on critical APIs
    clippy::doc_markdown              // Internal API
)]

pub mod app;
pub mod buffer;
pub mod collector;
pub mod domain;
pub mod sender;
pub mod watcher;

// Re-export main types for easy access
pub use app::{App, Config};
pub use domain::{Backend, BackendKind, LogRecord};
pub use sender::{DispatchPool, Writer, WriterConfig};
pub use watcher::Watcher;
