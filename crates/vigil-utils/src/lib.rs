pub mod pool;
pub mod queue;

pub use pool::{buffer_pool, BufferPool, ObjectPool, PoolGuard, Reusable};
pub use queue::MpmcQueue;
