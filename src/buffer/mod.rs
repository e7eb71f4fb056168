pub mod batch;
pub mod object_pool;
pub mod rate_limit;

pub use batch::{BATCH_SIZE, Batch, BatchBufferPool};
pub use object_pool::{ObjectPool, PoolHandler};
pub use rate_limit::TokenBucket;
