//! Dispatcher configuration.

use std::time::Duration;

/// Process-wide configuration of the dispatcher and its stores.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// TTL of cached query results when the request does not set its own.
    pub default_cache_ttl: Duration,
    /// Interval between sweeps of expired cache entries.
    pub cache_sweep_interval: Duration,
    /// Capacity of the cache sweeper's task channel.
    pub sweeper_channel_capacity: usize,
    /// Deadline applied by `Dispatcher::dispatch` when the caller sets none.
    /// `None` lets requests run until they complete.
    pub request_deadline: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_cache_ttl: Duration::from_secs(300),
            cache_sweep_interval: Duration::from_secs(60),
            sweeper_channel_capacity: 256,
            request_deadline: None,
        }
    }
}
