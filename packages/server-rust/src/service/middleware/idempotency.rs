//! Idempotency stage: at most one successful execution per request id.
//!
//! The id is reserved in the [`Ledger`] with a single atomic
//! `insert_if_absent` before the inner service runs. A request whose id is
//! already reserved is answered without running anything downstream. If the
//! downstream call does not succeed (failing outcome, fault, cancellation or
//! the future being dropped) the reservation is released so the command can
//! be retried under the same id.

use std::sync::Arc;
use std::task::{Context, Poll};

use cartline_core::{Error, Outcome, Request, RequestId, Response};
use tower::{Layer, Service};

use crate::service::operation::{DispatchError, Envelope, PipelineFuture};
use crate::storage::ledger::{now_millis, IdempotencyRecord, Ledger};

/// Code of the failure returned when an idempotent command has no request id.
pub const MISSING_REQUEST_ID: &str = "Request.MissingRequestId";
/// Code of the failure returned when the ledger cannot be reached.
pub const LEDGER_UNAVAILABLE: &str = "Idempotency.LedgerUnavailable";
/// Code of the failure returned for a duplicate whose output has no
/// acknowledgement form.
pub const ALREADY_PROCESSED: &str = "Idempotency.AlreadyProcessed";

// ---------------------------------------------------------------------------
// IdempotencyLayer
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct IdempotencyLayer {
    ledger: Arc<dyn Ledger>,
}

impl IdempotencyLayer {
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }
}

impl<S> Layer<S> for IdempotencyLayer {
    type Service = IdempotencyService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IdempotencyService {
            inner,
            ledger: Arc::clone(&self.ledger),
        }
    }
}

// ---------------------------------------------------------------------------
// IdempotencyService
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct IdempotencyService<S> {
    inner: S,
    ledger: Arc<dyn Ledger>,
}

impl<S, R> Service<Envelope<R>> for IdempotencyService<S>
where
    R: Request,
    S: Service<Envelope<R>, Response = Outcome<R::Output>, Error = DispatchError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = Outcome<R::Output>;
    type Error = DispatchError;
    type Future = PipelineFuture<R::Output>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, envelope: Envelope<R>) -> Self::Future {
        // The ready inner service is the one that must handle this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let ledger = Arc::clone(&self.ledger);

        Box::pin(async move {
            let operation = envelope.ctx.operation;
            let request_id = match envelope.request.request_id() {
                Some(id) if !id.is_blank() => id.clone(),
                _ => {
                    return Ok(Outcome::failure(Error::validation(
                        MISSING_REQUEST_ID,
                        format!("{operation} requires a request id"),
                    )));
                }
            };

            if envelope.ctx.is_cancelled() {
                return Ok(Outcome::failure(Error::cancelled()));
            }

            let record = IdempotencyRecord::new(request_id.clone(), operation, now_millis());
            match ledger.insert_if_absent(&record).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!(
                        operation,
                        request_id = %request_id,
                        "duplicate idempotent request, skipping handler"
                    );
                    return Ok(already_completed::<R::Output>(operation, &request_id));
                }
                Err(err) => {
                    tracing::error!(
                        operation,
                        request_id = %request_id,
                        error = %err,
                        "idempotency ledger unavailable"
                    );
                    return Ok(Outcome::failure(Error::unexpected(
                        LEDGER_UNAVAILABLE,
                        "the idempotency ledger could not be reached",
                    )));
                }
            }

            let mut reservation = Reservation::new(Arc::clone(&ledger), request_id);
            let result = inner.call(envelope).await;
            match &result {
                Ok(Outcome::Success(_)) => reservation.keep(),
                Ok(Outcome::Failure(_)) | Err(_) => reservation.release().await,
            }
            result
        })
    }
}

/// The answer to a duplicate: the output's acknowledgement, or a conflict
/// when the output type has none.
fn already_completed<T: Response>(operation: &str, request_id: &RequestId) -> Outcome<T> {
    match T::acknowledged() {
        Some(ack) => Outcome::success(ack),
        None => Outcome::failure(Error::conflict(
            ALREADY_PROCESSED,
            format!("{operation} with request id {request_id} was already processed"),
        )),
    }
}

// ---------------------------------------------------------------------------
// Reservation
// ---------------------------------------------------------------------------

/// A reserved request id that is released unless explicitly kept.
///
/// Dropping an unsettled reservation (the dispatch future was dropped
/// mid-flight) releases it on a spawned task.
struct Reservation {
    ledger: Arc<dyn Ledger>,
    request_id: Option<RequestId>,
}

impl Reservation {
    fn new(ledger: Arc<dyn Ledger>, request_id: RequestId) -> Self {
        Self {
            ledger,
            request_id: Some(request_id),
        }
    }

    fn keep(&mut self) {
        self.request_id = None;
    }

    async fn release(&mut self) {
        if let Some(request_id) = self.request_id.take() {
            remove_reservation(self.ledger.as_ref(), &request_id).await;
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let Some(request_id) = self.request_id.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(request_id = %request_id, "no runtime to release reservation");
            return;
        };
        let ledger = Arc::clone(&self.ledger);
        handle.spawn(async move {
            remove_reservation(ledger.as_ref(), &request_id).await;
        });
    }
}

async fn remove_reservation(ledger: &dyn Ledger, request_id: &RequestId) {
    if let Err(err) = ledger.remove(request_id).await {
        tracing::error!(
            request_id = %request_id,
            error = %err,
            "failed to release idempotency reservation"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
