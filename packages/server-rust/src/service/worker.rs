//! Background maintenance for the pipeline.
//!
//! A [`BackgroundWorker`] owns one [`BackgroundRunnable`] on a spawned task and
//! feeds it queued tasks and interval ticks. [`CacheSweeper`] is the runnable
//! the server starts: it purges expired response-cache entries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::config::PipelineConfig;
use crate::storage::cache_store::CacheStore;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Work driven by a [`BackgroundWorker`]. Tasks and ticks never overlap.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// The type of task this runnable processes.
    type Task: Send + 'static;

    /// Process a single task.
    async fn run(&mut self, task: Self::Task);

    /// Called periodically (on each tick interval). Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once when the worker is shutting down. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Handle to a runnable on its own task. The first tick fires one interval
/// after start, not immediately.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    pub fn start(mut runnable: R, tick_interval: Duration, channel_capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(channel_capacity.max(1));
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(tick_interval);
            ticks.tick().await;

            loop {
                tokio::select! {
                    task = rx.recv() => match task {
                        Some(task) => runnable.run(task).await,
                        None => break,
                    },
                    _ = ticks.tick() => runnable.on_tick().await,
                    _ = &mut shutdown_rx => break,
                }
            }

            runnable.shutdown().await;
        });

        Self {
            tx: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Queues `task`, waiting for channel capacity.
    ///
    /// # Errors
    ///
    /// Fails once the worker has stopped.
    pub async fn submit(&self, task: R::Task) -> anyhow::Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(task)
                .await
                .map_err(|_| anyhow::anyhow!("worker channel closed")),
            None => Err(anyhow::anyhow!("worker not running")),
        }
    }

    /// Stops the worker and waits for [`BackgroundRunnable::shutdown`].
    /// Tasks still queued are dropped.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// CacheSweeper
// ---------------------------------------------------------------------------

/// Tasks accepted by the cache sweeper.
#[derive(Debug)]
pub enum SweepTask {
    /// Purge expired entries now instead of waiting for the next tick.
    Now,
}

/// Purges expired entries from a [`CacheStore`] on every tick and on demand.
pub struct CacheSweeper {
    cache: Arc<dyn CacheStore>,
    purged: Arc<AtomicU64>,
}

impl CacheSweeper {
    #[must_use]
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self {
            cache,
            purged: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Running total of purged entries, shared with the worker task.
    #[must_use]
    pub fn purged(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.purged)
    }

    async fn sweep(&self) {
        match self.cache.purge_expired().await {
            Ok(0) => {}
            Ok(n) => {
                let n = u64::try_from(n).unwrap_or(u64::MAX);
                self.purged.fetch_add(n, Ordering::Relaxed);
                metrics::counter!("cartline_cache_purged_total").increment(n);
                tracing::debug!(purged = n, "expired cache entries purged");
            }
            Err(err) => tracing::warn!(error = %err, "cache sweep failed"),
        }
    }
}

#[async_trait]
impl BackgroundRunnable for CacheSweeper {
    type Task = SweepTask;

    async fn run(&mut self, task: SweepTask) {
        match task {
            SweepTask::Now => self.sweep().await,
        }
    }

    async fn on_tick(&mut self) {
        self.sweep().await;
    }

    async fn shutdown(&mut self) {
        tracing::debug!(
            purged = self.purged.load(Ordering::Relaxed),
            "cache sweeper stopped"
        );
    }
}

/// Starts a [`CacheSweeper`] over `cache` using the configured interval and
/// channel capacity.
#[must_use]
pub fn spawn_cache_sweeper(
    cache: Arc<dyn CacheStore>,
    config: &PipelineConfig,
) -> BackgroundWorker<CacheSweeper> {
    BackgroundWorker::start(
        CacheSweeper::new(cache),
        config.cache_sweep_interval,
        config.sweeper_channel_capacity,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
