//! Validation stage: runs the request's validator before anything else acts.

use std::sync::Arc;
use std::task::{Context, Poll};

use cartline_core::validation::violations_to_errors;
use cartline_core::{Error, FromErrors, Outcome, Request, Validator};
use tower::{Layer, Service};

use crate::service::operation::{DispatchError, Envelope, PipelineFuture};

/// Tower layer applying the validator registered for `R`, if any.
pub struct ValidationLayer<R> {
    validator: Option<Arc<dyn Validator<R>>>,
}

impl<R> ValidationLayer<R> {
    #[must_use]
    pub fn new(validator: Option<Arc<dyn Validator<R>>>) -> Self {
        Self { validator }
    }
}

impl<R> Clone for ValidationLayer<R> {
    fn clone(&self) -> Self {
        Self {
            validator: self.validator.clone(),
        }
    }
}

impl<S, R> Layer<S> for ValidationLayer<R> {
    type Service = ValidationService<S, R>;

    fn layer(&self, inner: S) -> Self::Service {
        ValidationService {
            inner,
            validator: self.validator.clone(),
        }
    }
}

/// Short-circuits with every violation as a `Validation` error; the inner
/// service is not called in that case.
pub struct ValidationService<S, R> {
    inner: S,
    validator: Option<Arc<dyn Validator<R>>>,
}

impl<S: Clone, R> Clone for ValidationService<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            validator: self.validator.clone(),
        }
    }
}

impl<S, R> Service<Envelope<R>> for ValidationService<S, R>
where
    R: Request,
    S: Service<Envelope<R>, Response = Outcome<R::Output>, Error = DispatchError>,
    S::Future: Send + 'static,
{
    type Response = Outcome<R::Output>;
    type Error = DispatchError;
    type Future = PipelineFuture<R::Output>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, envelope: Envelope<R>) -> Self::Future {
        if envelope.ctx.is_cancelled() {
            return Box::pin(async { Ok(Outcome::failure(Error::cancelled())) });
        }

        if let Some(validator) = &self.validator {
            if let Some(errors) = violations_to_errors(validator.validate(&envelope.request)) {
                tracing::debug!(
                    operation = envelope.ctx.operation,
                    violations = errors.len(),
                    "request rejected by validator"
                );
                let failure = <Outcome<R::Output> as FromErrors>::from_errors(errors);
                return Box::pin(async move { Ok(failure) });
            }
        }

        Box::pin(self.inner.call(envelope))
    }
}
