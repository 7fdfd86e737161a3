//! Response cache contract.
//!
//! The caching stage reads and writes encoded query results through
//! [`CacheStore`]; mutating handlers invalidate through the same handle.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cartline_core::{CacheKey, Invalidation};

/// Marks the start of a cache fill.
///
/// Taken before the handler runs and handed back to
/// [`CacheStore::set_if_fresh`], which drops the fill if an invalidation
/// happened in between. Otherwise a slow query could write back a value read
/// before a committed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FillToken(pub u64);

impl FillToken {
    /// Token of stores that do not track invalidations.
    pub const UNVERSIONED: Self = Self(0);
}

/// Keyed byte store with per-entry TTL.
///
/// Used as `Arc<dyn CacheStore>`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the live value for `key`. Expired entries read as absent.
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<Bytes>>;

    /// Stores or overwrites `key`, expiring after `ttl`.
    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> anyhow::Result<()>;

    /// Removes the targeted entries. Returns how many were removed.
    async fn invalidate(&self, target: &Invalidation) -> anyhow::Result<usize>;

    /// Starts a fill for `key`.
    async fn fill_token(&self, _key: &CacheKey) -> anyhow::Result<FillToken> {
        Ok(FillToken::UNVERSIONED)
    }

    /// Stores `value` unless `key` was invalidated after `token` was taken.
    /// Returns whether the value was stored.
    async fn set_if_fresh(
        &self,
        key: &CacheKey,
        value: Bytes,
        ttl: Duration,
        _token: FillToken,
    ) -> anyhow::Result<bool> {
        self.set(key, value, ttl).await?;
        Ok(true)
    }

    /// Drops expired entries eagerly. Returns how many were dropped.
    async fn purge_expired(&self) -> anyhow::Result<usize> {
        Ok(0)
    }
}
