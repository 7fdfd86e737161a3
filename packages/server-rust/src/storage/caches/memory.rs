//! In-memory [`CacheStore`] backed by [`DashMap`].
//!
//! Entries carry an absolute expiry on the tokio clock. Expired entries read
//! as absent and are dropped lazily on lookup or eagerly by
//! [`purge_expired`](CacheStore::purge_expired).
//!
//! Fill tokens are stamps of a monotonic clock. Every invalidation takes a
//! new stamp and records it against the namespace it touches, or against
//! the whole cache when a pattern spans namespaces. A guarded fill is stored
//! only if neither its key's namespace nor the whole cache was invalidated
//! after its token. Guarded fills share `fill_gate` for reading;
//! invalidations take it exclusively, so no invalidation can land between a
//! fill's check and its insert.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cartline_core::{CacheKey, Invalidation};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::time::Instant;

use crate::storage::cache_store::{CacheStore, FillToken};

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    clock: AtomicU64,
    /// Stamp of the last invalidation per namespace.
    invalidated: DashMap<String, u64>,
    /// Stamp of the last invalidation not confined to one namespace.
    invalidated_all: AtomicU64,
    fill_gate: RwLock<()>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn store(&self, key: &CacheKey, value: Bytes, ttl: Duration) {
        if ttl.is_zero() {
            self.entries.remove(key.as_str());
            return;
        }
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.as_str().to_owned(), entry);
    }

    fn mark_invalidated(&self, target: &Invalidation) {
        let stamp = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        let scope = match target {
            Invalidation::Key(key) => Some(key.namespace()),
            Invalidation::Pattern(pattern) => pattern.scope(),
        };
        match scope {
            Some(namespace) => {
                self.invalidated.insert(namespace.to_owned(), stamp);
            }
            None => self.invalidated_all.store(stamp, Ordering::SeqCst),
        }
    }

    fn invalidated_since(&self, key: &CacheKey, token: FillToken) -> bool {
        let namespace = self
            .invalidated
            .get(key.namespace())
            .is_some_and(|stamp| *stamp > token.0);
        namespace || self.invalidated_all.load(Ordering::SeqCst) > token.0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<Bytes>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key.as_str()) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries
            .remove_if(key.as_str(), |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> anyhow::Result<()> {
        self.store(key, value, ttl);
        Ok(())
    }

    async fn invalidate(&self, target: &Invalidation) -> anyhow::Result<usize> {
        let _gate = self.fill_gate.write();
        self.mark_invalidated(target);
        let removed = match target {
            Invalidation::Key(key) => usize::from(self.entries.remove(key.as_str()).is_some()),
            Invalidation::Pattern(pattern) => {
                let mut removed = 0;
                self.entries.retain(|key, _| {
                    let hit = pattern.matches(key);
                    if hit {
                        removed += 1;
                    }
                    !hit
                });
                removed
            }
        };
        Ok(removed)
    }

    async fn fill_token(&self, _key: &CacheKey) -> anyhow::Result<FillToken> {
        Ok(FillToken(self.clock.load(Ordering::SeqCst)))
    }

    async fn set_if_fresh(
        &self,
        key: &CacheKey,
        value: Bytes,
        ttl: Duration,
        token: FillToken,
    ) -> anyhow::Result<bool> {
        let _gate = self.fill_gate.read();
        if self.invalidated_since(key, token) {
            return Ok(false);
        }
        self.store(key, value, ttl);
        Ok(true)
    }

    async fn purge_expired(&self) -> anyhow::Result<usize> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        Ok(before.saturating_sub(self.entries.len()))
    }
}

#[cfg(test)]
mod tests {
    use cartline_core::CachePattern;

    use super::*;

    fn key(ns: &str, id: &str) -> CacheKey {
        CacheKey::builder(ns).segment(id).build()
    }

    #[tokio::test]
    async fn set_then_get() {
        let cache = MemoryCache::new();
        let k = key("cart", "alice");
        cache
            .set(&k, Bytes::from_static(b"one"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get(&k).await.unwrap().unwrap(), Bytes::from_static(b"one"));

        cache
            .set(&k, Bytes::from_static(b"two"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get(&k).await.unwrap().unwrap(), Bytes::from_static(b"two"));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new();
        let k = key("cart", "alice");
        cache
            .set(&k, Bytes::from_static(b"v"), Duration::from_secs(5))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.get(&k).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(&k).await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn zero_ttl_is_not_stored() {
        let cache = MemoryCache::new();
        let k = key("cart", "alice");
        cache.set(&k, Bytes::from_static(b"v"), Duration::ZERO).await.unwrap();
        assert!(cache.get(&k).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pattern_invalidation_removes_namespace_only() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        for (ns, id) in [("cart", "a"), ("cart", "b"), ("order", "a")] {
            cache.set(&key(ns, id), Bytes::from_static(b"v"), ttl).await.unwrap();
        }

        let pattern = CachePattern::new("cart:*").unwrap();
        let removed = cache.invalidate(&pattern.into()).await.unwrap();
        assert_eq!(removed, 2);
        assert!(cache.get(&key("order", "a")).await.unwrap().is_some());
        assert!(cache.get(&key("cart", "a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fill_overtaken_by_invalidation_is_dropped() {
        let cache = MemoryCache::new();
        let k = key("cart", "alice");
        let ttl = Duration::from_secs(60);

        let token = cache.fill_token(&k).await.unwrap();
        cache.invalidate(&k.clone().into()).await.unwrap();

        let stored = cache
            .set_if_fresh(&k, Bytes::from_static(b"stale"), ttl, token)
            .await
            .unwrap();
        assert!(!stored);
        assert!(cache.get(&k).await.unwrap().is_none());

        let fresh = cache.fill_token(&k).await.unwrap();
        assert!(cache
            .set_if_fresh(&k, Bytes::from_static(b"fresh"), ttl, fresh)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn invalidation_only_drops_fills_of_its_namespace() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        let listing = key("catalog", "all");
        let other_cart = key("cart", "bob");

        let listing_token = cache.fill_token(&listing).await.unwrap();
        let cart_token = cache.fill_token(&other_cart).await.unwrap();
        cache.invalidate(&key("cart", "alice").into()).await.unwrap();

        assert!(cache
            .set_if_fresh(&listing, Bytes::from_static(b"list"), ttl, listing_token)
            .await
            .unwrap());
        assert!(!cache
            .set_if_fresh(&other_cart, Bytes::from_static(b"cart"), ttl, cart_token)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn cross_namespace_pattern_drops_every_fill() {
        let cache = MemoryCache::new();
        let k = key("catalog", "all");
        let token = cache.fill_token(&k).await.unwrap();

        let pattern = CachePattern::new("*:all").unwrap();
        cache.invalidate(&pattern.into()).await.unwrap();

        assert!(!cache
            .set_if_fresh(&k, Bytes::from_static(b"v"), Duration::from_secs(60), token)
            .await
            .unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired() {
        let cache = MemoryCache::new();
        cache
            .set(&key("cart", "short"), Bytes::from_static(b"v"), Duration::from_secs(1))
            .await
            .unwrap();
        cache
            .set(&key("cart", "long"), Bytes::from_static(b"v"), Duration::from_secs(100))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert_eq!(cache.len(), 1);
    }
}
