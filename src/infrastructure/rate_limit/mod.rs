//! Counter stores backing the rate limiter.
//!
//! - [`RedisRateLimitStore`] - Shared across instances; atomic Lua scripts
//! - [`MemoryRateLimitStore`] - Single-process store for development and tests

mod memory_store;
mod redis_store;
mod store;

pub use memory_store::MemoryRateLimitStore;
pub use redis_store::RedisRateLimitStore;
pub use store::{
    BucketSpec, BucketState, RateLimitStore, RateLimitStoreError, StoreResult, WindowAcquire,
    WindowSnapshot,
};

#[cfg(test)]
pub use store::MockRateLimitStore;
