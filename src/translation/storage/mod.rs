//! 存储模块
//!
//! 提供段落译文缓存。

pub mod cache;

pub use cache::{cache_key, create_cache_store, CacheStats, CacheStore, LruCacheStore, MemoryCacheStore};
