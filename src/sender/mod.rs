pub mod pool;
pub mod stats;
pub mod transport;
pub mod writer;

pub use pool::{DispatchPool, PoolError, TRANSPORT_ATTEMPTS};
pub use stats::{Counter, StatsSnapshot};
pub use transport::{Transport, TransportError};
pub use writer::{WriteError, Writer, WriterConfig};
