//! The single entry point for commands and queries.
//!
//! [`Dispatcher::dispatch`] resolves the handler registered for the request
//! type, wraps it in the pipeline stages that apply to the type's
//! capabilities and runs the envelope through the resulting chain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cartline_core::{Outcome, Request, Validator};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use super::config::PipelineConfig;
use super::handler::{Handler, HandlerService};
use super::middleware::pipeline::{build_chain, ChainParts, Pipeline};
use super::operation::{BoxedStage, DispatchError, Envelope, RequestContext};
use super::registry::{RegisteredOperation, RequestRegistry};
use crate::observability::{ObservabilitySink, TracingSink};
use crate::storage::cache_store::CacheStore;
use crate::storage::caches::MemoryCache;
use crate::storage::ledger::Ledger;
use crate::storage::ledgers::MemoryLedger;

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    pipeline: Arc<Pipeline>,
    registry: Arc<RequestRegistry>,
    ledger: Arc<dyn Ledger>,
    cache: Arc<dyn CacheStore>,
    sink: Arc<dyn ObservabilitySink>,
    config: PipelineConfig,
    next_call_id: AtomicU64,
}

impl Dispatcher {
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Dispatches `request` with a fresh cancellation token, bounded by
    /// [`PipelineConfig::request_deadline`] when one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] for infrastructure faults only. Expected
    /// conditions arrive as a failing [`Outcome`].
    pub async fn dispatch<R: Request>(&self, request: R) -> Result<Outcome<R::Output>, DispatchError> {
        match self.config.request_deadline {
            Some(deadline) => {
                self.dispatch_with_deadline(request, &CancellationToken::new(), deadline)
                    .await
            }
            None => self.dispatch_with(request, CancellationToken::new()).await,
        }
    }

    /// Dispatches `request`, observing the caller's `cancel` token.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub async fn dispatch_with<R: Request>(
        &self,
        request: R,
        cancel: CancellationToken,
    ) -> Result<Outcome<R::Output>, DispatchError> {
        let chain = self.chain::<R>()?;
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let envelope = Envelope::new(request, RequestContext::new(call_id, R::NAME, cancel));
        chain.oneshot(envelope).await
    }

    /// Dispatches `request` under a child of `cancel` that fires after
    /// `deadline`. The deadline only cancels the token: a request still
    /// running at the deadline finishes when its handler observes it, usually
    /// with a `Request.Cancelled` failure. No task outlives the returned
    /// future.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub async fn dispatch_with_deadline<R: Request>(
        &self,
        request: R,
        cancel: &CancellationToken,
        deadline: Duration,
    ) -> Result<Outcome<R::Output>, DispatchError> {
        let child = cancel.child_token();
        let dispatch = self.dispatch_with(request, child.clone());
        tokio::pin!(dispatch);
        tokio::select! {
            result = &mut dispatch => return result,
            () = tokio::time::sleep(deadline) => child.cancel(),
        }
        dispatch.await
    }

    /// Builds the chain for `R`: the registered handler wrapped in every
    /// stage of [`Pipeline::plan`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoHandler`] if no handler is registered for `R`.
    pub fn chain<R: Request>(&self) -> Result<BoxedStage<R>, DispatchError> {
        let Some(handler) = self.registry.handler::<R>() else {
            tracing::error!(operation = R::NAME, "no handler registered");
            return Err(DispatchError::NoHandler { operation: R::NAME });
        };

        let parts = ChainParts {
            handler: HandlerService::new(handler),
            validator: self.registry.validator::<R>(),
            ledger: Arc::clone(&self.ledger),
            cache: Arc::clone(&self.cache),
            sink: Arc::clone(&self.sink),
            default_cache_ttl: self.config.default_cache_ttl,
        };
        Ok(build_chain(&self.pipeline.plan::<R>(), parts))
    }

    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Registered operations in registration order.
    #[must_use]
    pub fn operations(&self) -> Vec<RegisteredOperation> {
        self.registry.operations()
    }

    #[must_use]
    pub fn handles<R: Request>(&self) -> bool {
        self.registry.contains::<R>()
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

// ---------------------------------------------------------------------------
// DispatcherBuilder
// ---------------------------------------------------------------------------

/// Assembles a [`Dispatcher`]. Unset collaborators default to the standard
/// pipeline, [`MemoryLedger`], [`MemoryCache`] and [`TracingSink`].
#[derive(Default)]
pub struct DispatcherBuilder {
    pipeline: Option<Pipeline>,
    registry: RequestRegistry,
    ledger: Option<Arc<dyn Ledger>>,
    cache: Option<Arc<dyn CacheStore>>,
    sink: Option<Arc<dyn ObservabilitySink>>,
    config: PipelineConfig,
}

impl DispatcherBuilder {
    #[must_use]
    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    #[must_use]
    pub fn ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn handler<R, H>(self, handler: H) -> Self
    where
        R: Request,
        H: Handler<R>,
    {
        self.registry.register_handler::<R, H>(handler);
        self
    }

    #[must_use]
    pub fn shared_handler<R: Request>(self, handler: Arc<dyn Handler<R>>) -> Self {
        self.registry.register_handler_arc::<R>(handler);
        self
    }

    #[must_use]
    pub fn validator<R, V>(self, validator: V) -> Self
    where
        R: Request,
        V: Validator<R>,
    {
        self.registry.register_validator::<R, V>(validator);
        self
    }

    #[must_use]
    pub fn build(self) -> Dispatcher {
        let dispatcher = Dispatcher {
            pipeline: Arc::new(self.pipeline.unwrap_or_default()),
            registry: Arc::new(self.registry),
            ledger: self.ledger.unwrap_or_else(|| Arc::new(MemoryLedger::new())),
            cache: self.cache.unwrap_or_else(|| Arc::new(MemoryCache::new())),
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
            config: self.config,
            next_call_id: AtomicU64::new(1),
        };
        tracing::debug!(
            stages = ?dispatcher.pipeline.stages(),
            operations = dispatcher.registry.operations().len(),
            "dispatcher ready"
        );
        dispatcher
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
