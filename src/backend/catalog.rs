//! Tool Catalog Cache
//!
//! Time-bounded, memory-resident copy of the backend tool catalog.
//!
//! A snapshot is either absent, fresh (`age < ttl`) or stale. Stale snapshots
//! are never evicted proactively: they are the fallback served when a fetch
//! fails. Only [`CatalogCache::invalidate`] (called on re-registration) drops
//! the snapshot.
//!
//! A TTL of zero and `disabled = true` both force a fetch on every call; the
//! difference is that a zero-TTL cache still stores what it fetched and can
//! fall back to it, while a disabled cache stores nothing.

use crate::backend::error::BackendResult;
use crate::backend::types::ToolDescriptor;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Where a catalog result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    /// Fresh cached snapshot, no network call
    Cache,

    /// Fetched from the backend on this call
    Network,

    /// Fetch failed; previous (stale) snapshot served instead
    Stale,
}

/// A catalog result handed to callers
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub tools: Arc<Vec<ToolDescriptor>>,
    pub source: CatalogSource,
}

/// Cached snapshot plus capture time
#[derive(Debug, Clone)]
struct CachedCatalog {
    tools: Arc<Vec<ToolDescriptor>>,
    captured_at: Instant,
}

impl CachedCatalog {
    fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

/// Tool catalog cache with stale-on-failure fallback
#[derive(Debug)]
pub struct CatalogCache {
    ttl: Duration,
    disabled: bool,
    entry: Mutex<Option<CachedCatalog>>,
}

impl CatalogCache {
    pub fn new(ttl: Duration, disabled: bool) -> Self {
        Self {
            ttl,
            disabled,
            entry: Mutex::new(None),
        }
    }

    /// Drop the cached snapshot regardless of its age.
    pub fn invalidate(&self) {
        if self.lock().take().is_some() {
            debug!("Tool catalog cache invalidated");
        }
    }

    /// Whether a snapshot (fresh or stale) is present
    pub fn has_snapshot(&self) -> bool {
        self.lock().is_some()
    }

    /// Serve the catalog from cache or via `fetch`.
    ///
    /// 1. Fresh snapshot and caching enabled: returned without calling `fetch`
    /// 2. Otherwise `fetch` runs; on success the snapshot is replaced (unless
    ///    caching is disabled) and returned
    /// 3. On fetch failure, any existing snapshot is returned as
    ///    [`CatalogSource::Stale`]; with no snapshot the error propagates
    ///
    /// The lock is never held across `fetch`.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> BackendResult<CatalogSnapshot>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BackendResult<Vec<ToolDescriptor>>>,
    {
        if let Some(tools) = self.fresh() {
            debug!(tools = tools.len(), "Serving tool catalog from cache");
            return Ok(CatalogSnapshot {
                tools,
                source: CatalogSource::Cache,
            });
        }

        match fetch().await {
            Ok(tools) => {
                let tools = Arc::new(tools);
                if !self.disabled {
                    *self.lock() = Some(CachedCatalog {
                        tools: Arc::clone(&tools),
                        captured_at: Instant::now(),
                    });
                }
                Ok(CatalogSnapshot {
                    tools,
                    source: CatalogSource::Network,
                })
            }
            Err(err) => {
                let fallback = self.lock().clone();
                match fallback {
                    Some(cached) => {
                        warn!(
                            error = %err,
                            age_secs = cached.age().as_secs(),
                            "Tool catalog fetch failed, serving stale snapshot"
                        );
                        Ok(CatalogSnapshot {
                            tools: cached.tools,
                            source: CatalogSource::Stale,
                        })
                    }
                    None => Err(err),
                }
            }
        }
    }

    fn fresh(&self) -> Option<Arc<Vec<ToolDescriptor>>> {
        if self.disabled {
            return None;
        }
        self.lock()
            .as_ref()
            .filter(|cached| cached.age() < self.ttl)
            .map(|cached| Arc::clone(&cached.tools))
    }

    fn lock(&self) -> MutexGuard<'_, Option<CachedCatalog>> {
        // The guarded value is a plain Option; a poisoned lock still holds a usable snapshot.
        self.entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::error::BackendError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: format!("{} tool", name),
            input_schema: serde_json::json!({"type": "object"}),
            metadata: None,
        }
    }

    fn failure() -> BackendError {
        BackendError::Status {
            status: 503,
            code: None,
            message: "unavailable".to_string(),
        }
    }

    // Counting fetcher returning a fixed catalog
    async fn fetch_ok(
        calls: &AtomicUsize,
        names: &[&str],
    ) -> BackendResult<Vec<ToolDescriptor>> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(names.iter().map(|n| tool(n)).collect())
    }

    async fn fetch_err(calls: &AtomicUsize) -> BackendResult<Vec<ToolDescriptor>> {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(failure())
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_within_ttl_hits_cache() {
        let cache = CatalogCache::new(Duration::from_secs(60), false);
        let calls = AtomicUsize::new(0);

        let first = cache.get_or_fetch(|| fetch_ok(&calls, &["a"])).await.unwrap();
        assert_eq!(first.source, CatalogSource::Network);

        tokio::time::advance(Duration::from_secs(30)).await;
        let second = cache.get_or_fetch(|| fetch_ok(&calls, &["b"])).await.unwrap();

        assert_eq!(second.source, CatalogSource::Cache);
        assert_eq!(second.tools[0].name, "a");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_snapshot_is_refetched() {
        let cache = CatalogCache::new(Duration::from_secs(60), false);
        let calls = AtomicUsize::new(0);

        cache.get_or_fetch(|| fetch_ok(&calls, &["a"])).await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;

        let refreshed = cache.get_or_fetch(|| fetch_ok(&calls, &["b"])).await.unwrap();
        assert_eq!(refreshed.source, CatalogSource::Network);
        assert_eq!(refreshed.tools[0].name, "b");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_serves_stale_snapshot() {
        let cache = CatalogCache::new(Duration::from_secs(10), false);
        let calls = AtomicUsize::new(0);

        cache.get_or_fetch(|| fetch_ok(&calls, &["a"])).await.unwrap();
        tokio::time::advance(Duration::from_secs(3600)).await;

        let degraded = cache.get_or_fetch(|| fetch_err(&calls)).await.unwrap();
        assert_eq!(degraded.source, CatalogSource::Stale);
        assert_eq!(degraded.tools[0].name, "a");
        // stale entry is retained for the next failure too
        assert!(cache.has_snapshot());
    }

    #[tokio::test]
    async fn test_fetch_failure_without_snapshot_propagates() {
        let cache = CatalogCache::new(Duration::from_secs(10), false);
        let calls = AtomicUsize::new(0);

        let result = cache.get_or_fetch(|| fetch_err(&calls)).await;
        assert!(matches!(result, Err(BackendError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_zero_ttl_always_fetches_but_keeps_fallback() {
        let cache = CatalogCache::new(Duration::ZERO, false);
        let calls = AtomicUsize::new(0);

        cache.get_or_fetch(|| fetch_ok(&calls, &["a"])).await.unwrap();
        cache.get_or_fetch(|| fetch_ok(&calls, &["a"])).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let degraded = cache.get_or_fetch(|| fetch_err(&calls)).await.unwrap();
        assert_eq!(degraded.source, CatalogSource::Stale);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_fetches_and_stores_nothing() {
        let cache = CatalogCache::new(Duration::from_secs(300), true);
        let calls = AtomicUsize::new(0);

        cache.get_or_fetch(|| fetch_ok(&calls, &["a"])).await.unwrap();
        cache.get_or_fetch(|| fetch_ok(&calls, &["a"])).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.has_snapshot());

        let result = cache.get_or_fetch(|| fetch_err(&calls)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalidate_forces_fetch() {
        let cache = CatalogCache::new(Duration::from_secs(300), false);
        let calls = AtomicUsize::new(0);

        cache.get_or_fetch(|| fetch_ok(&calls, &["a"])).await.unwrap();
        cache.invalidate();
        assert!(!cache.has_snapshot());

        let snapshot = cache.get_or_fetch(|| fetch_ok(&calls, &["b"])).await.unwrap();
        assert_eq!(snapshot.source, CatalogSource::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
