//! Memoization of resolved documents keyed by (application, profiles, label).
//!
//! Two jobs beyond a plain map:
//!
//! * **Label-indexed invalidation.** Entries are tracked per label so
//!   `invalidate(label)` walks only that label's keys, not the whole cache.
//! * **Request coalescing.** At most one resolution runs per key. Concurrent
//!   lookups for a key with a resolution in flight await the same shared
//!   result. The resolution itself runs on a spawned task, so a caller
//!   disconnecting does not abandon the work for the remaining waiters, and
//!   the result lands in the cache even if every caller went away.
//!
//! Invalidation bumps a per-label epoch. A resolution that started before the
//! bump may still complete for its waiters, but its result is not admitted to
//! the cache, so a lookup arriving after the invalidation always observes the
//! post-invalidation version.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::ConfigError;
use crate::model::{CacheKey, ConfigResponse};

type Resolution = Shared<BoxFuture<'static, Result<Arc<ConfigResponse>, ConfigError>>>;

struct CacheEntry {
    value: Arc<ConfigResponse>,
    fetched_at_version: String,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    by_label: HashMap<String, HashSet<CacheKey>>,
    in_flight: HashMap<CacheKey, Resolution>,
    epochs: HashMap<String, u64>,
}

impl Inner {
    fn insert(&mut self, key: CacheKey, value: Arc<ConfigResponse>, fetched_at_version: String) {
        self.evict_other_versions(&key.label, &fetched_at_version);
        self.by_label
            .entry(key.label.clone())
            .or_default()
            .insert(key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                value,
                fetched_at_version,
            },
        );
    }

    /// An entry is valid only while its version matches the label's current
    /// one. Admitting a document at a new version therefore drops the
    /// label's entries pinned to any other version, so no lookup can serve a
    /// mixed-version view of one label.
    fn evict_other_versions(&mut self, label: &str, version: &str) {
        let Some(keys) = self.by_label.get(label) else {
            return;
        };
        let stale: Vec<CacheKey> = keys
            .iter()
            .filter(|k| {
                self.entries
                    .get(*k)
                    .is_some_and(|e| e.fetched_at_version != version)
            })
            .cloned()
            .collect();
        if stale.is_empty() {
            return;
        }
        debug!(label, version, evicted = stale.len(), "evicting entries at an older version");
        for key in &stale {
            self.entries.remove(key);
        }
        if let Some(keys) = self.by_label.get_mut(label) {
            for key in &stale {
                keys.remove(key);
            }
        }
    }

    fn epoch(&self, label: &str) -> u64 {
        self.epochs.get(label).copied().unwrap_or(0)
    }
}

/// Clears a key's in-flight record when its resolution task finishes,
/// whether it completed or panicked. Skips the removal when the label was
/// invalidated meanwhile: the record was already detached, and a newer
/// resolution may occupy the slot.
struct InFlightGuard {
    cache: Arc<Mutex<Inner>>,
    key: CacheKey,
    epoch: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut inner = self.cache.lock();
        if inner.epoch(&self.key.label) == self.epoch {
            inner.in_flight.remove(&self.key);
        }
    }
}

#[derive(Default)]
pub struct ResponseCache {
    inner: Arc<Mutex<Inner>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<ConfigResponse>> {
        self.inner.lock().entries.get(key).map(|e| e.value.clone())
    }

    pub fn put(&self, key: CacheKey, value: Arc<ConfigResponse>, fetched_at_version: String) {
        self.inner.lock().insert(key, value, fetched_at_version);
    }

    /// Version a cached entry was resolved at, for staleness inspection.
    pub fn fetched_at_version(&self, key: &CacheKey) -> Option<String> {
        self.inner
            .lock()
            .entries
            .get(key)
            .map(|e| e.fetched_at_version.clone())
    }

    /// Drops every entry for `label` and detaches its in-flight resolutions
    /// from the cache (they still complete for their waiters, but their
    /// results are no longer admitted).
    pub fn invalidate(&self, label: &str) {
        let mut inner = self.inner.lock();
        *inner.epochs.entry(label.to_owned()).or_insert(0) += 1;
        if let Some(keys) = inner.by_label.remove(label) {
            debug!(label, entries = keys.len(), "invalidating cached documents");
            for key in keys {
                inner.entries.remove(&key);
            }
        }
        let stale: Vec<_> = inner
            .in_flight
            .keys()
            .filter(|k| k.label == label)
            .cloned()
            .collect();
        for key in stale {
            inner.in_flight.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Cache-or-resolve with coalescing. `resolve` is invoked at most once
    /// per key while its resolution is in flight; every concurrent caller
    /// receives a clone of the single outcome.
    pub async fn get_or_resolve<F, Fut>(
        &self,
        key: CacheKey,
        resolve: F,
    ) -> Result<Arc<ConfigResponse>, ConfigError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ConfigResponse, ConfigError>> + Send + 'static,
    {
        let resolution = {
            let mut inner = self.inner.lock();
            if let Some(entry) = inner.entries.get(&key) {
                return Ok(entry.value.clone());
            }
            if let Some(existing) = inner.in_flight.get(&key) {
                existing.clone()
            } else {
                let shared = self.spawn_resolution(&mut inner, key.clone(), resolve());
                inner.in_flight.insert(key, shared.clone());
                shared
            }
        };

        resolution.await
    }

    fn spawn_resolution<Fut>(&self, inner: &mut Inner, key: CacheKey, fut: Fut) -> Resolution
    where
        Fut: Future<Output = Result<ConfigResponse, ConfigError>> + Send + 'static,
    {
        let started_epoch = inner.epoch(&key.label);
        let (tx, rx) = oneshot::channel();
        let cache = Arc::clone(&self.inner);

        tokio::spawn(async move {
            // Dropping the guard clears the in-flight record on every exit
            // path, a panicking resolution included; a wedged record would
            // otherwise fail the key until the next invalidation.
            let guard = InFlightGuard {
                cache,
                key,
                epoch: started_epoch,
            };
            let result = fut.await.map(Arc::new);
            {
                let mut inner = guard.cache.lock();
                // Detached by an invalidation: complete for waiters only.
                if inner.epoch(&guard.key.label) == started_epoch {
                    if let Ok(value) = &result {
                        let version = value.version.clone();
                        inner.insert(guard.key.clone(), value.clone(), version);
                    }
                }
            }
            let _ = tx.send(result);
        });

        rx.map(|received| match received {
            Ok(result) => result,
            Err(_) => Err(ConfigError::internal("resolution task dropped")),
        })
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn response(label: &str, version: &str) -> ConfigResponse {
        ConfigResponse {
            name: "orders".into(),
            profiles: vec!["prod".into()],
            label: label.into(),
            version: version.into(),
            property_sources: Vec::new(),
        }
    }

    fn key(label: &str) -> CacheKey {
        CacheKey::new("orders", &["prod".to_owned()], label)
    }

    #[tokio::test]
    async fn second_lookup_shares_the_cached_value() {
        let cache = ResponseCache::new();
        let first = cache
            .get_or_resolve(key("main"), || async { Ok(response("main", "v1")) })
            .await
            .unwrap();
        let second = cache
            .get_or_resolve(key("main"), || async {
                panic!("must not resolve again")
            })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn invalidate_is_scoped_to_the_label() {
        let cache = ResponseCache::new();
        cache.put(key("main"), Arc::new(response("main", "v1")), "v1".into());
        cache.put(key("dev"), Arc::new(response("dev", "v7")), "v7".into());

        cache.invalidate("main");

        assert!(cache.get(&key("main")).is_none());
        assert!(cache.get(&key("dev")).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_lookups_resolve_once() {
        let cache = Arc::new(ResponseCache::new());
        let resolutions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let resolutions = Arc::clone(&resolutions);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_resolve(key("main"), move || async move {
                        resolutions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(response("main", "v1"))
                    })
                    .await
            }));
        }

        for handle in handles {
            let value = handle.await.unwrap().unwrap();
            assert_eq!(value.version, "v1");
        }
        assert_eq!(resolutions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn waiters_share_a_failure() {
        let cache = Arc::new(ResponseCache::new());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_resolve(key("main"), || async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err(ConfigError::source_unavailable("store down"))
                    })
                    .await
            }));
        }

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, ConfigError::SourceUnavailable { .. }));
        }
        // Failures are not cached; the next lookup resolves afresh.
        assert!(cache.get(&key("main")).is_none());
    }

    #[tokio::test]
    async fn abandoned_caller_still_populates_the_cache() {
        let cache = Arc::new(ResponseCache::new());

        let caller = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_resolve(key("main"), || async {
                        tokio::time::sleep(Duration::from_millis(40)).await;
                        Ok(response("main", "v1"))
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        caller.abort();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(cache.get(&key("main")).is_some());
    }

    #[tokio::test]
    async fn resolution_started_before_invalidation_is_not_admitted() {
        let cache = Arc::new(ResponseCache::new());

        let waiter = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_resolve(key("main"), || async {
                        tokio::time::sleep(Duration::from_millis(40)).await;
                        Ok(response("main", "stale"))
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate("main");

        // The pre-invalidation waiter still gets its result...
        assert_eq!(waiter.await.unwrap().unwrap().version, "stale");
        // ...but the cache stays empty for post-invalidation lookups.
        assert!(cache.get(&key("main")).is_none());
    }

    #[tokio::test]
    async fn admitting_a_newer_version_evicts_the_labels_older_entries() {
        let cache = ResponseCache::new();
        let billing = CacheKey::new("billing", &["prod".to_owned()], "main");
        cache.put(key("main"), Arc::new(response("main", "v1")), "v1".into());
        cache.put(billing.clone(), Arc::new(response("main", "v2")), "v2".into());

        assert!(cache.get(&key("main")).is_none());
        assert!(cache.get(&billing).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn same_version_admissions_coexist() {
        let cache = ResponseCache::new();
        let billing = CacheKey::new("billing", &["prod".to_owned()], "main");
        cache.put(key("main"), Arc::new(response("main", "v1")), "v1".into());
        cache.put(billing.clone(), Arc::new(response("main", "v1")), "v1".into());

        assert!(cache.get(&key("main")).is_some());
        assert!(cache.get(&billing).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn eviction_is_scoped_to_the_label() {
        let cache = ResponseCache::new();
        cache.put(key("dev"), Arc::new(response("dev", "v7")), "v7".into());
        cache.put(key("main"), Arc::new(response("main", "v2")), "v2".into());

        assert!(cache.get(&key("dev")).is_some());
    }

    #[tokio::test]
    async fn panicked_resolution_does_not_wedge_the_key() {
        let cache = ResponseCache::new();

        let err = cache
            .get_or_resolve(key("main"), || async { panic!("resolver blew up") })
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Internal { .. }));

        // The key is usable again: a fresh resolution runs and is cached.
        let value = cache
            .get_or_resolve(key("main"), || async { Ok(response("main", "v1")) })
            .await
            .unwrap();
        assert_eq!(value.version, "v1");
        assert!(cache.get(&key("main")).is_some());
    }
}
