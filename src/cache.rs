//! C2: Content Cache.
//!
//! A read-through cache keyed by `sha256(namespace || canonical_params)`.
//! Concurrent misses for the same key coalesce: the first caller installs a
//! pending slot, later callers await the same in-flight fetch. Negative
//! results (fetch errors) are never cached.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, Notify};

use crate::error::DeepSearchResult;
use crate::logging::log_debug;

/// Separates unrelated key spaces so identical params in different phases
/// never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    SearchList,
    MajorReportBody,
    DocumentArchive,
    CompanyDirectory,
}

impl Namespace {
    fn label(self) -> &'static str {
        match self {
            Self::SearchList => "search_list",
            Self::MajorReportBody => "major_report_body",
            Self::DocumentArchive => "document_archive",
            Self::CompanyDirectory => "company_directory",
        }
    }

    /// Default TTL per spec §4.2: 7 days for the directory, 24h otherwise.
    fn default_ttl(self) -> Duration {
        match self {
            Self::CompanyDirectory => Duration::from_secs(7 * 24 * 3600),
            _ => Duration::from_secs(24 * 3600),
        }
    }
}

/// `sha256(namespace || canonical_params)`.
pub fn fingerprint(namespace: Namespace, canonical_params: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.label().as_bytes());
    hasher.update(b"|");
    hasher.update(canonical_params.as_bytes());
    format!("{:x}", hasher.finalize())
}

struct Entry {
    value: Arc<Vec<u8>>,
    inserted_at: Instant,
    ttl: Duration,
    size: usize,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

enum Slot {
    Ready(Entry),
    Pending(Arc<Notify>),
}

/// Read-through, LRU, bounded-byte-budget content cache.
///
/// Single-writer-many-reader per key: `DashMap` shards provide the
/// concurrency safety, an internal mutex around the LRU order list ensures
/// eviction bookkeeping stays consistent.
pub struct ContentCache {
    entries: DashMap<String, Slot>,
    lru_order: Mutex<VecDeque<String>>,
    max_bytes: usize,
    current_bytes: std::sync::atomic::AtomicUsize,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
}

impl ContentCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            lru_order: Mutex::new(VecDeque::new()),
            max_bytes,
            current_bytes: std::sync::atomic::AtomicUsize::new(0),
            hits: std::sync::atomic::AtomicU64::new(0),
            misses: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(std::sync::atomic::Ordering::Relaxed) as f64;
        let misses = self.misses.load(std::sync::atomic::Ordering::Relaxed) as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }

    /// Fetch from cache, or run `origin` on a miss. Concurrent misses for the
    /// same key coalesce onto a single `origin` invocation.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        namespace: Namespace,
        key: &str,
        origin: F,
    ) -> DeepSearchResult<Arc<Vec<u8>>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = DeepSearchResult<Vec<u8>>>,
    {
        let fp = fingerprint(namespace, key);

        loop {
            let notify = match self.entries.entry(fp.clone()) {
                dashmap::mapref::entry::Entry::Occupied(mut occ) => match occ.get() {
                    Slot::Ready(entry) if !entry.is_expired() => {
                        self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        self.touch(&fp).await;
                        log_debug!(namespace = namespace.label(), fp = %fp, "cache hit");
                        return Ok(entry.value.clone());
                    }
                    Slot::Ready(entry) => {
                        self.current_bytes
                            .fetch_sub(entry.size, std::sync::atomic::Ordering::Relaxed);
                        let notify = Arc::new(Notify::new());
                        occ.insert(Slot::Pending(notify.clone()));
                        self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        None
                    }
                    Slot::Pending(notify) => Some(notify.clone()),
                },
                dashmap::mapref::entry::Entry::Vacant(vac) => {
                    let notify = Arc::new(Notify::new());
                    vac.insert(Slot::Pending(notify));
                    self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    None
                }
            };

            if let Some(notify) = notify {
                notify.notified().await;
                continue;
            }

            // We installed the pending slot; run origin and publish the result.
            let result = origin().await;
            match result {
                Ok(bytes) => {
                    let size = bytes.len();
                    let entry = Entry {
                        value: Arc::new(bytes),
                        inserted_at: Instant::now(),
                        ttl: namespace.default_ttl(),
                        size,
                    };
                    let value = entry.value.clone();
                    if let Some(Slot::Pending(notify)) =
                        self.entries.insert(fp.clone(), Slot::Ready(entry))
                    {
                        notify.notify_waiters();
                    }
                    self.current_bytes
                        .fetch_add(size, std::sync::atomic::Ordering::Relaxed);
                    self.touch(&fp).await;
                    self.evict_if_needed().await;
                    return Ok(value);
                }
                Err(err) => {
                    // Negative results are never cached: remove the pending slot.
                    if let Some((_, Slot::Pending(notify))) = self.entries.remove(&fp) {
                        notify.notify_waiters();
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn touch(&self, key: &str) {
        let mut order = self.lru_order.lock().await;
        order.retain(|k| k != key);
        order.push_back(key.to_string());
    }

    async fn evict_if_needed(&self) {
        let mut order = self.lru_order.lock().await;
        while self.current_bytes.load(std::sync::atomic::Ordering::Relaxed) > self.max_bytes {
            let Some(oldest) = order.pop_front() else { break };
            if let Some((_, Slot::Ready(entry))) = self.entries.remove(&oldest) {
                self.current_bytes
                    .fetch_sub(entry.size, std::sync::atomic::Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_then_hit() {
        let cache = ContentCache::new(1024 * 1024);
        let calls = std::sync::atomic::AtomicU32::new(0);

        let a = cache
            .get_or_fetch(Namespace::SearchList, "q1", || async {
                calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Ok(b"hello".to_vec())
            })
            .await
            .unwrap();
        assert_eq!(*a, b"hello");

        let b = cache
            .get_or_fetch(Namespace::SearchList, "q1", || async {
                calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Ok(b"ignored".to_vec())
            })
            .await
            .unwrap();
        assert_eq!(*b, b"hello");
        assert_eq!(calls.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert!(cache.hit_rate() > 0.0);
    }

    #[tokio::test]
    async fn fetch_error_is_not_cached() {
        let cache = ContentCache::new(1024 * 1024);

        let first = cache
            .get_or_fetch(Namespace::SearchList, "q1", || async {
                Err(crate::error::DeepSearchError::fetch_failed("boom"))
            })
            .await;
        assert!(first.is_err());

        let second = cache
            .get_or_fetch(Namespace::SearchList, "q1", || async { Ok(b"ok".to_vec()) })
            .await
            .unwrap();
        assert_eq!(*second, b"ok");
    }

    #[test]
    fn fingerprints_differ_by_namespace() {
        let a = fingerprint(Namespace::SearchList, "same");
        let b = fingerprint(Namespace::DocumentArchive, "same");
        assert_ne!(a, b);
    }
}
