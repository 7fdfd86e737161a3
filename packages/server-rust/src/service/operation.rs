//! Request envelope and the fault type of the pipeline.

use std::future::Future;
use std::pin::Pin;

use cartline_core::{Outcome, Request};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-dispatch metadata carried with the request through every stage.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Process-unique id of this dispatch, for correlating log lines.
    pub call_id: u64,
    /// Operation name (`Request::NAME`).
    pub operation: &'static str,
    /// Fires when the caller gives up. Stages and the handler observe it.
    pub cancel: CancellationToken,
    pub received_at: Instant,
}

impl RequestContext {
    #[must_use]
    pub fn new(call_id: u64, operation: &'static str, cancel: CancellationToken) -> Self {
        Self {
            call_id,
            operation,
            cancel,
            received_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A request travelling through the pipeline.
#[derive(Debug)]
pub struct Envelope<R> {
    pub request: R,
    pub ctx: RequestContext,
}

impl<R: Request> Envelope<R> {
    #[must_use]
    pub fn new(request: R, ctx: RequestContext) -> Self {
        Self { request, ctx }
    }
}

/// Infrastructure or programmer faults. Expected domain conditions are never
/// reported here; they travel as failing [`Outcome`]s.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no handler registered for {operation}")]
    NoHandler { operation: &'static str },
    #[error("handler for {operation} failed: {source}")]
    Handler {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("value codec failed: {0}")]
    Codec(#[from] crate::storage::codec::CodecError),
}

/// Boxed future returned by every pipeline stage.
pub type PipelineFuture<T> =
    Pin<Box<dyn Future<Output = Result<Outcome<T>, DispatchError>> + Send>>;

/// Type-erased stage of the chain built for request type `R`.
pub type BoxedStage<R> =
    tower::util::BoxCloneService<Envelope<R>, Outcome<<R as Request>::Output>, DispatchError>;
