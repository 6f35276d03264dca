//! Eviction policies.

pub mod byte_lru;

pub use byte_lru::{ByteLruCache, CacheStats, ConcurrentByteLruCache, EvictionCallback};
