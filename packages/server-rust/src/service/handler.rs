//! Request handlers and the terminal service of every chain.

use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use cartline_core::{Error, Outcome, Request};
use tokio_util::sync::CancellationToken;
use tower::Service;

use crate::service::operation::{DispatchError, Envelope, PipelineFuture};

/// Executes one request type.
///
/// Expected domain conditions are returned as failing [`Outcome`]s. An `Err`
/// is an infrastructure fault and surfaces as [`DispatchError::Handler`].
///
/// Once started, a handler is never interrupted by the pipeline. It owns its
/// commit boundary: long-running handlers observe `cancel` at points where
/// nothing has been committed yet and return [`Error::cancelled`] there.
#[async_trait]
pub trait Handler<R: Request>: Send + Sync + 'static {
    async fn handle(
        &self,
        request: &R,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Outcome<R::Output>>;
}

// ---------------------------------------------------------------------------
// HandlerService
// ---------------------------------------------------------------------------

/// Innermost service: invokes the registered handler unless the request was
/// cancelled before it got here.
pub struct HandlerService<R: Request> {
    handler: Arc<dyn Handler<R>>,
}

impl<R: Request> HandlerService<R> {
    #[must_use]
    pub fn new(handler: Arc<dyn Handler<R>>) -> Self {
        Self { handler }
    }
}

impl<R: Request> Clone for HandlerService<R> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<R: Request> Service<Envelope<R>> for HandlerService<R> {
    type Response = Outcome<R::Output>;
    type Error = DispatchError;
    type Future = PipelineFuture<R::Output>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, envelope: Envelope<R>) -> Self::Future {
        let handler = Arc::clone(&self.handler);
        Box::pin(async move {
            let Envelope { request, ctx } = envelope;
            if ctx.is_cancelled() {
                return Ok(Outcome::failure(Error::cancelled()));
            }

            handler
                .handle(&request, &ctx.cancel)
                .await
                .map_err(|source| DispatchError::Handler {
                    operation: ctx.operation,
                    source,
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use cartline_core::{Capabilities, Success};
    use tower::ServiceExt;

    use super::*;
    use crate::service::operation::RequestContext;

    struct Ping;

    impl Request for Ping {
        type Output = Success;
        const NAME: &'static str = "Ping";
        const CAPABILITIES: Capabilities = Capabilities::COMMAND;
    }

    struct CountingHandler {
        calls: AtomicU32,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl Handler<Ping> for CountingHandler {
        async fn handle(
            &self,
            _request: &Ping,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<Outcome<Success>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                anyhow::bail!("disk on fire");
            }
            Ok(Outcome::success(Success))
        }
    }

    fn handler(delay: Duration, fail: bool) -> Arc<CountingHandler> {
        Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
            delay,
            fail,
        })
    }

    fn envelope(cancel: CancellationToken) -> Envelope<Ping> {
        Envelope::new(Ping, RequestContext::new(1, Ping::NAME, cancel))
    }

    #[tokio::test]
    async fn invokes_handler() {
        let h = handler(Duration::ZERO, false);
        let svc = HandlerService::new(h.clone() as Arc<dyn Handler<Ping>>);
        let outcome = svc.oneshot(envelope(CancellationToken::new())).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_error_becomes_fault() {
        let svc = HandlerService::new(handler(Duration::ZERO, true) as Arc<dyn Handler<Ping>>);
        let err = svc
            .oneshot(envelope(CancellationToken::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Handler { operation: "Ping", .. }));
    }

    #[tokio::test]
    async fn cancelled_before_call_skips_handler() {
        let h = handler(Duration::ZERO, false);
        let svc = HandlerService::new(h.clone() as Arc<dyn Handler<Ping>>);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = svc.oneshot(envelope(cancel)).await.unwrap();
        assert!(outcome.first_error().unwrap().is_cancelled());
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    fn cancel_after(cancel: &CancellationToken, delay: Duration) {
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trigger.cancel();
        });
    }

    #[tokio::test(start_paused = true)]
    async fn started_handler_runs_to_completion() {
        let h = handler(Duration::from_secs(60), false);
        let svc = HandlerService::new(h.clone() as Arc<dyn Handler<Ping>>);
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(10));

        let outcome = svc.oneshot(envelope(cancel.clone())).await.unwrap();
        assert!(outcome.is_success());
        assert!(cancel.is_cancelled());
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    /// Waits for cancellation before committing anything.
    struct PatientHandler;

    #[async_trait]
    impl Handler<Ping> for PatientHandler {
        async fn handle(
            &self,
            _request: &Ping,
            cancel: &CancellationToken,
        ) -> anyhow::Result<Outcome<Success>> {
            tokio::select! {
                () = cancel.cancelled() => Ok(Outcome::failure(Error::cancelled())),
                () = tokio::time::sleep(Duration::from_secs(60)) => Ok(Outcome::success(Success)),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn handler_observes_cancellation() {
        let svc = HandlerService::new(Arc::new(PatientHandler) as Arc<dyn Handler<Ping>>);
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(10));

        let outcome = svc.oneshot(envelope(cancel)).await.unwrap();
        assert!(outcome.first_error().unwrap().is_cancelled());
    }
}
