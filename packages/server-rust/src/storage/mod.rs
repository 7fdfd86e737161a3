//! Storage behind the pipeline's stateful stages.
//!
//! - [`Ledger`]: durable set of accepted idempotent request ids
//!   (memory, redb, `PostgreSQL` backends in [`ledgers`])
//! - [`CacheStore`]: keyed byte cache with TTL and invalidation
//!   (memory and no-op backends in [`caches`])
//! - [`codec`]: `MessagePack` encoding of cached values
//! - [`factory`]: selection of the ledger backend at startup

pub mod cache_store;
pub mod caches;
pub mod codec;
pub mod factory;
pub mod ledger;
pub mod ledgers;

pub use cache_store::{CacheStore, FillToken};
pub use factory::{open_ledger, LedgerBackend};
pub use ledger::{IdempotencyRecord, Ledger};
