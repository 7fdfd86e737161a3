//! [`CacheStore`](super::CacheStore) backends.

pub mod memory;
pub mod null;

pub use memory::MemoryCache;
pub use null::NullCache;
