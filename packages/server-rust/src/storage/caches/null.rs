//! No-op [`CacheStore`] implementation.
//!
//! [`NullCache`] never holds anything: every lookup misses and writes are
//! discarded. Installing it turns response caching off without changing the
//! pipeline.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cartline_core::{CacheKey, Invalidation};

use crate::storage::cache_store::CacheStore;

pub struct NullCache;

#[async_trait]
impl CacheStore for NullCache {
    async fn get(&self, _key: &CacheKey) -> anyhow::Result<Option<Bytes>> {
        Ok(None)
    }

    async fn set(&self, _key: &CacheKey, _value: Bytes, _ttl: Duration) -> anyhow::Result<()> {
        Ok(())
    }

    async fn invalidate(&self, _target: &Invalidation) -> anyhow::Result<usize> {
        Ok(0)
    }
}
