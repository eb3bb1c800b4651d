//! Counter stores for the fixed-window rate limiter.

mod config;
mod memory;

pub use config::RedisConfig;
pub use memory::InMemoryCounterStore;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::RedisCounterStore;
