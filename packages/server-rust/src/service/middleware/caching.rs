//! Caching stage: serves cacheable queries from the [`CacheStore`].
//!
//! The store is an optimisation, never a dependency. Read or write errors
//! and undecodable entries fall back to calling the handler directly.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use cartline_core::{Outcome, Request};
use tower::{Layer, Service};

use crate::service::operation::{DispatchError, Envelope, PipelineFuture};
use crate::storage::cache_store::CacheStore;
use crate::storage::codec;

// ---------------------------------------------------------------------------
// CachingLayer
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct CachingLayer {
    cache: Arc<dyn CacheStore>,
    default_ttl: Duration,
}

impl CachingLayer {
    #[must_use]
    pub fn new(cache: Arc<dyn CacheStore>, default_ttl: Duration) -> Self {
        Self { cache, default_ttl }
    }
}

impl<S> Layer<S> for CachingLayer {
    type Service = CachingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CachingService {
            inner,
            cache: Arc::clone(&self.cache),
            default_ttl: self.default_ttl,
        }
    }
}

// ---------------------------------------------------------------------------
// CachingService
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct CachingService<S> {
    inner: S,
    cache: Arc<dyn CacheStore>,
    default_ttl: Duration,
}

impl<S, R> Service<Envelope<R>> for CachingService<S>
where
    R: Request,
    S: Service<Envelope<R>, Response = Outcome<R::Output>, Error = DispatchError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = Outcome<R::Output>;
    type Error = DispatchError;
    type Future = PipelineFuture<R::Output>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, envelope: Envelope<R>) -> Self::Future {
        let Some(key) = envelope.request.cache_key() else {
            return Box::pin(self.inner.call(envelope));
        };

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let cache = Arc::clone(&self.cache);
        let ttl = envelope.request.cache_ttl().unwrap_or(self.default_ttl);

        Box::pin(async move {
            let operation = envelope.ctx.operation;

            match cache.get(&key).await {
                Ok(Some(bytes)) => match codec::decode::<R::Output>(&bytes) {
                    Ok(value) => {
                        tracing::debug!(operation, key = %key, "cache hit");
                        return Ok(Outcome::success(value));
                    }
                    Err(err) => {
                        tracing::warn!(operation, key = %key, error = %err, "undecodable cache entry");
                    }
                },
                Ok(None) => tracing::debug!(operation, key = %key, "cache miss"),
                Err(err) => {
                    tracing::warn!(operation, key = %key, error = %err, "cache read failed, bypassing");
                    return inner.call(envelope).await;
                }
            }

            let token = match cache.fill_token(&key).await {
                Ok(token) => Some(token),
                Err(err) => {
                    tracing::warn!(operation, key = %key, error = %err, "cache fill token unavailable");
                    None
                }
            };

            let result = inner.call(envelope).await;

            if let (Ok(Outcome::Success(value)), Some(token)) = (&result, token) {
                match codec::encode(value) {
                    Ok(bytes) => match cache.set_if_fresh(&key, bytes, ttl, token).await {
                        Ok(true) => {}
                        Ok(false) => {
                            tracing::debug!(operation, key = %key, "cache fill overtaken by invalidation");
                        }
                        Err(err) => {
                            tracing::warn!(operation, key = %key, error = %err, "cache write failed");
                        }
                    },
                    Err(err) => {
                        tracing::warn!(operation, key = %key, error = %err, "cache value not encodable");
                    }
                }
            }

            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use cartline_core::{CacheKey, Capabilities, Error, Invalidation};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;
    use crate::service::operation::RequestContext;
    use crate::storage::caches::MemoryCache;

    struct Stock {
        sku: &'static str,
    }

    impl Request for Stock {
        type Output = u64;
        const NAME: &'static str = "Stock";
        const CAPABILITIES: Capabilities = Capabilities::CACHEABLE_QUERY;

        fn cache_key(&self) -> Option<CacheKey> {
            if self.sku.is_empty() {
                return None;
            }
            Some(CacheKey::builder("stock").segment(self.sku).build())
        }
    }

    /// Terminal service returning the running call count, or a failure when
    /// `fail` is set.
    #[derive(Clone)]
    struct Counter {
        calls: Arc<AtomicU32>,
        fail: bool,
    }

    impl Counter {
        fn new(fail: bool) -> Self {
            Self {
                calls: Arc::new(AtomicU32::new(0)),
                fail,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Service<Envelope<Stock>> for Counter {
        type Response = Outcome<u64>;
        type Error = DispatchError;
        type Future = PipelineFuture<u64>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _envelope: Envelope<Stock>) -> Self::Future {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Ok(Outcome::failure(Error::not_found("Stock.Unknown", "unknown sku")))
                } else {
                    Ok(Outcome::success(u64::from(n)))
                }
            })
        }
    }

    struct DownCache;

    #[async_trait]
    impl CacheStore for DownCache {
        async fn get(&self, _key: &CacheKey) -> anyhow::Result<Option<Bytes>> {
            anyhow::bail!("cache offline")
        }
        async fn set(&self, _key: &CacheKey, _value: Bytes, _ttl: Duration) -> anyhow::Result<()> {
            anyhow::bail!("cache offline")
        }
        async fn invalidate(&self, _target: &Invalidation) -> anyhow::Result<usize> {
            anyhow::bail!("cache offline")
        }
    }

    fn stock(sku: &'static str) -> Envelope<Stock> {
        Envelope::new(
            Stock { sku },
            RequestContext::new(1, Stock::NAME, CancellationToken::new()),
        )
    }

    fn layer(cache: Arc<dyn CacheStore>) -> CachingLayer {
        CachingLayer::new(cache, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn hit_skips_handler_until_invalidated() {
        let cache = Arc::new(MemoryCache::new());
        let inner = Counter::new(false);
        let layer = layer(cache.clone());

        let first = layer.layer(inner.clone()).oneshot(stock("sku-1")).await.unwrap();
        let second = layer.layer(inner.clone()).oneshot(stock("sku-1")).await.unwrap();
        assert_eq!(first.value(), Some(&1));
        assert_eq!(second.value(), Some(&1));
        assert_eq!(inner.calls(), 1);

        let key = CacheKey::builder("stock").segment("sku-1").build();
        cache.invalidate(&Invalidation::Key(key)).await.unwrap();

        let third = layer.layer(inner.clone()).oneshot(stock("sku-1")).await.unwrap();
        assert_eq!(third.value(), Some(&2));
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = Arc::new(MemoryCache::new());
        let inner = Counter::new(true);
        let layer = layer(cache.clone());

        for _ in 0..2 {
            let outcome = layer.layer(inner.clone()).oneshot(stock("sku-1")).await.unwrap();
            assert!(outcome.is_failure());
        }
        assert_eq!(inner.calls(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn unavailable_store_degrades_to_handler() {
        let inner = Counter::new(false);
        let layer = layer(Arc::new(DownCache));

        let outcome = layer.layer(inner.clone()).oneshot(stock("sku-1")).await.unwrap();
        assert_eq!(outcome.value(), Some(&1));
        let outcome = layer.layer(inner.clone()).oneshot(stock("sku-1")).await.unwrap();
        assert_eq!(outcome.value(), Some(&2));
    }

    #[tokio::test]
    async fn undecodable_entry_is_treated_as_miss() {
        let cache = Arc::new(MemoryCache::new());
        let key = CacheKey::builder("stock").segment("sku-1").build();
        cache
            .set(&key, Bytes::from_static(b"\xc1garbage"), Duration::from_secs(60))
            .await
            .unwrap();

        let inner = Counter::new(false);
        let outcome = layer(cache.clone())
            .layer(inner.clone())
            .oneshot(stock("sku-1"))
            .await
            .unwrap();
        assert_eq!(outcome.value(), Some(&1));
        assert_eq!(inner.calls(), 1);

        // The bad entry was overwritten by the fresh fill.
        let stored = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(codec::decode::<u64>(&stored).unwrap(), 1);
    }

    #[tokio::test]
    async fn request_without_key_is_not_cached() {
        let cache = Arc::new(MemoryCache::new());
        let inner = Counter::new(false);
        let layer = layer(cache.clone());

        layer.layer(inner.clone()).oneshot(stock("")).await.unwrap();
        layer.layer(inner.clone()).oneshot(stock("")).await.unwrap();
        assert_eq!(inner.calls(), 2);
        assert!(cache.is_empty());
    }
}
