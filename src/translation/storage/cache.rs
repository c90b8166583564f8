//! 译文缓存
//!
//! 以 `(段落 ID, 引擎, 选项)` 为键保存还原与规范化之后的段落译文。
//! 提供两种实现：无上限的并发表，以及带容量与过期时间的 LRU。

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use blake3::Hasher;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lru::LruCache;

use crate::translation::config::CacheSettings;
use crate::translation::model::{EngineTag, SegmentTranslation, TranslationOptions};

// ============================================================================
// 核心类型
// ============================================================================

/// 缓存统计信息
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub evictions: u64,
}

impl CacheStats {
    /// 计算缓存命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests as f64
        }
    }

    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }
}

/// 缓存存储接口，由多个并发运行共享
pub trait CacheStore: Send + Sync {
    fn lookup(&self, key: &str) -> Option<SegmentTranslation>;

    fn save(&self, key: &str, result: &SegmentTranslation);

    /// 删除 `before` 之前写入的结果，返回删除条数
    fn purge(&self, before: DateTime<Utc>) -> usize;

    fn clear_all(&self);

    /// 删除属于这些段落的全部结果，返回删除条数
    fn clear_by_segment_ids(&self, ids: &[String]) -> usize;

    fn stats(&self) -> CacheStats;
}

/// 生成缓存键
///
/// 所有影响输出的选项都参与：格式保留、风格、是否套用术语、源语言与目标语言。
pub fn cache_key(segment_id: &str, engine: &EngineTag, options: &TranslationOptions) -> String {
    format!(
        "{}|{}|pf={}|style={}|g={}|src={}|tgt={}",
        segment_id,
        engine.as_str(),
        options.preserve_formatting,
        options.style.as_str(),
        options.apply_glossary,
        options.source_language.resolved().unwrap_or("auto"),
        options.target_language,
    )
}

/// 按配置创建缓存；关闭时返回 `None`
pub fn create_cache_store(settings: &CacheSettings) -> Option<std::sync::Arc<dyn CacheStore>> {
    if !settings.enabled {
        return None;
    }
    Some(std::sync::Arc::new(LruCacheStore::from_settings(settings)))
}

/// 命中与未命中计数
#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Counters {
    fn hit(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn evicted(&self, n: usize) {
        self.evictions.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn snapshot(&self, entries: usize) -> CacheStats {
        CacheStats {
            total_requests: self.requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedRecord {
    result: SegmentTranslation,
    stored_at: Instant,
}

impl CachedRecord {
    fn new(result: &SegmentTranslation) -> Self {
        Self { result: result.clone(), stored_at: Instant::now() }
    }

    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.stored_at.elapsed() > ttl)
    }
}

// ============================================================================
// 内存实现
// ============================================================================

/// 无上限的并发缓存
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CachedRecord>,
    ttl: Option<Duration>,
    counters: Counters,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl), ..Default::default() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryCacheStore {
    fn lookup(&self, key: &str) -> Option<SegmentTranslation> {
        let expired = match self.entries.get(key) {
            Some(record) if !record.is_expired(self.ttl) => {
                self.counters.hit();
                return Some(record.result.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
            self.counters.evicted(1);
        }
        self.counters.miss();
        None
    }

    fn save(&self, key: &str, result: &SegmentTranslation) {
        self.entries.insert(key.to_string(), CachedRecord::new(result));
    }

    fn purge(&self, before: DateTime<Utc>) -> usize {
        let initial = self.entries.len();
        self.entries.retain(|_, record| record.result.created_at >= before);
        let removed = initial - self.entries.len();
        self.counters.evicted(removed);
        removed
    }

    fn clear_all(&self) {
        self.entries.clear();
    }

    fn clear_by_segment_ids(&self, ids: &[String]) -> usize {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let initial = self.entries.len();
        self.entries.retain(|_, record| !ids.contains(record.result.segment_id.as_str()));
        initial - self.entries.len()
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.entries.len())
    }
}

// ============================================================================
// LRU 实现
// ============================================================================

/// 有容量上限的 LRU 缓存，键以 blake3 摘要存放
#[derive(Debug)]
pub struct LruCacheStore {
    cache: Mutex<LruCache<String, CachedRecord>>,
    ttl: Option<Duration>,
    counters: Counters,
}

impl LruCacheStore {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { cache: Mutex::new(LruCache::new(capacity)), ttl, counters: Counters::default() }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        let ttl = (settings.ttl_secs > 0).then(|| Duration::from_secs(settings.ttl_secs));
        Self::new(settings.capacity, ttl)
    }

    fn slot(key: &str) -> String {
        let mut hasher = Hasher::new();
        hasher.update(key.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// 锁中毒时沿用内部数据，缓存内容不受其他线程的 panic 影响
    fn guard(&self) -> MutexGuard<'_, LruCache<String, CachedRecord>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    fn remove_where(&self, predicate: impl Fn(&CachedRecord) -> bool) -> usize {
        let mut cache = self.guard();
        let doomed: Vec<String> =
            cache.iter().filter(|(_, record)| predicate(record)).map(|(slot, _)| slot.clone()).collect();
        for slot in &doomed {
            cache.pop(slot);
        }
        doomed.len()
    }
}

impl CacheStore for LruCacheStore {
    fn lookup(&self, key: &str) -> Option<SegmentTranslation> {
        let slot = Self::slot(key);
        let mut cache = self.guard();
        let state = cache.get(&slot).map(|record| (!record.is_expired(self.ttl)).then(|| record.result.clone()));
        match state {
            Some(Some(result)) => {
                self.counters.hit();
                Some(result)
            }
            Some(None) => {
                cache.pop(&slot);
                self.counters.evicted(1);
                self.counters.miss();
                None
            }
            None => {
                self.counters.miss();
                None
            }
        }
    }

    fn save(&self, key: &str, result: &SegmentTranslation) {
        let slot = Self::slot(key);
        let mut cache = self.guard();
        if let Some((evicted, _)) = cache.push(slot.clone(), CachedRecord::new(result)) {
            if evicted != slot {
                self.counters.evicted(1);
                tracing::debug!("缓存已满，淘汰最久未用的条目");
            }
        }
    }

    fn purge(&self, before: DateTime<Utc>) -> usize {
        let removed = self.remove_where(|record| record.result.created_at < before);
        self.counters.evicted(removed);
        removed
    }

    fn clear_all(&self) {
        self.guard().clear();
    }

    fn clear_by_segment_ids(&self, ids: &[String]) -> usize {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        self.remove_where(|record| ids.contains(record.result.segment_id.as_str()))
    }

    fn stats(&self) -> CacheStats {
        let entries = self.len();
        self.counters.snapshot(entries)
    }
}
