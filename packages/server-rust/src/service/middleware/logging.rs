//! Logging stage: times every dispatch and reports it to the observability sink.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use cartline_core::{Outcome, Request};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::observability::{ObservabilitySink, OperationRecord, OutcomeClass};
use crate::service::operation::{DispatchError, Envelope, PipelineFuture};
use crate::storage::ledger::now_millis;

// ---------------------------------------------------------------------------
// LoggingLayer
// ---------------------------------------------------------------------------

/// Tower layer recording operation name, call id, duration and outcome.
#[derive(Clone)]
pub struct LoggingLayer {
    sink: Arc<dyn ObservabilitySink>,
}

impl LoggingLayer {
    #[must_use]
    pub fn new(sink: Arc<dyn ObservabilitySink>) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService {
            inner,
            sink: Arc::clone(&self.sink),
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingService
// ---------------------------------------------------------------------------

/// Passes the outcome through untouched after reporting it.
#[derive(Clone)]
pub struct LoggingService<S> {
    inner: S,
    sink: Arc<dyn ObservabilitySink>,
}

impl<S, R> Service<Envelope<R>> for LoggingService<S>
where
    R: Request,
    S: Service<Envelope<R>, Response = Outcome<R::Output>, Error = DispatchError> + Send,
    S::Future: Send + 'static,
{
    type Response = Outcome<R::Output>;
    type Error = DispatchError;
    type Future = PipelineFuture<R::Output>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, envelope: Envelope<R>) -> Self::Future {
        let operation = envelope.ctx.operation;
        let call_id = envelope.ctx.call_id;
        let sink = Arc::clone(&self.sink);

        let span = info_span!(
            "dispatch",
            operation = operation,
            call_id = call_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let started_at_ms = now_millis();
        let start = Instant::now();
        let fut = self.inner.call(envelope);

        Box::pin(
            async move {
                let result = fut.await;
                let duration = start.elapsed();
                let outcome = OutcomeClass::of(&result);

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = duration.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome.as_str());
                if let Err(err) = &result {
                    tracing::error!(error = %err, "dispatch fault");
                }

                sink.record(&OperationRecord {
                    operation,
                    call_id,
                    started_at_ms,
                    duration,
                    outcome,
                });

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use cartline_core::{Capabilities, Error, ErrorKind};
    use parking_lot::Mutex;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;
    use crate::service::operation::RequestContext;

    struct Lookup;

    impl Request for Lookup {
        type Output = u64;
        const NAME: &'static str = "Lookup";
        const CAPABILITIES: Capabilities = Capabilities::QUERY;
    }

    #[derive(Default)]
    struct CapturingSink(Mutex<Vec<OperationRecord>>);

    impl ObservabilitySink for CapturingSink {
        fn record(&self, record: &OperationRecord) {
            self.0.lock().push(record.clone());
        }
    }

    /// Terminal service returning a fixed result.
    #[derive(Clone)]
    struct Fixed(fn() -> Result<Outcome<u64>, DispatchError>);

    impl Service<Envelope<Lookup>> for Fixed {
        type Response = Outcome<u64>;
        type Error = DispatchError;
        type Future = PipelineFuture<u64>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _envelope: Envelope<Lookup>) -> Self::Future {
            let result = (self.0)();
            Box::pin(async move { result })
        }
    }

    fn envelope(call_id: u64) -> Envelope<Lookup> {
        Envelope::new(
            Lookup,
            RequestContext::new(call_id, Lookup::NAME, CancellationToken::new()),
        )
    }

    #[tokio::test]
    async fn passes_success_through_and_records_it() {
        let sink = Arc::new(CapturingSink::default());
        let svc = LoggingLayer::new(sink.clone()).layer(Fixed(|| Ok(Outcome::success(7))));

        let outcome = svc.oneshot(envelope(42)).await.unwrap();
        assert_eq!(outcome.value(), Some(&7));

        let records = sink.0.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, "Lookup");
        assert_eq!(records[0].call_id, 42);
        assert_eq!(records[0].outcome, OutcomeClass::Success);
    }

    #[tokio::test]
    async fn classifies_failure_by_first_error_kind() {
        let sink = Arc::new(CapturingSink::default());
        let svc = LoggingLayer::new(sink.clone()).layer(Fixed(|| {
            Ok(Outcome::failure(Error::not_found("Order.NotFound", "no such order")))
        }));

        let outcome = svc.oneshot(envelope(1)).await.unwrap();
        assert_eq!(outcome.first_error().unwrap().code, "Order.NotFound");
        assert_eq!(
            sink.0.lock()[0].outcome,
            OutcomeClass::Failed(ErrorKind::NotFound)
        );
    }

    #[tokio::test]
    async fn faults_are_recorded_and_propagated() {
        let sink = Arc::new(CapturingSink::default());
        let svc = LoggingLayer::new(sink.clone()).layer(Fixed(|| {
            Err(DispatchError::NoHandler { operation: "Lookup" })
        }));

        assert!(svc.oneshot(envelope(1)).await.is_err());
        assert_eq!(sink.0.lock()[0].outcome, OutcomeClass::Fault);
    }
}
