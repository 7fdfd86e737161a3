//! Pipeline composition: the ordered behavior list and the per-request chain.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cartline_core::{Capabilities, Request, Validator};
use tower::util::BoxCloneService;
use tower::Layer;

use super::caching::CachingLayer;
use super::idempotency::IdempotencyLayer;
use super::logging::LoggingLayer;
use super::validation::ValidationLayer;
use crate::observability::ObservabilitySink;
use crate::service::handler::HandlerService;
use crate::service::operation::BoxedStage;
use crate::storage::cache_store::CacheStore;
use crate::storage::ledger::Ledger;

// ---------------------------------------------------------------------------
// Behavior
// ---------------------------------------------------------------------------

/// A cross-cutting stage that can wrap a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Behavior {
    Logging,
    Validation,
    Idempotency,
    Caching,
}

impl Behavior {
    /// Whether this behavior wraps requests with the given capabilities.
    #[must_use]
    pub const fn applies_to(self, capabilities: Capabilities) -> bool {
        match self {
            Self::Logging | Self::Validation => true,
            Self::Idempotency => capabilities.is_idempotent_command(),
            Self::Caching => capabilities.is_cacheable_query(),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Logging => "logging",
            Self::Validation => "validation",
            Self::Idempotency => "idempotency",
            Self::Caching => "caching",
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected behavior orderings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("behavior {0} appears more than once")]
    Duplicate(Behavior),
    #[error("logging must be the outermost behavior")]
    LoggingNotOutermost,
    #[error("validation must run before {0}")]
    ValidationAfter(Behavior),
    #[error("caching must be the innermost behavior")]
    CachingNotInnermost,
    #[error("behavior {0} is required")]
    Missing(Behavior),
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Ordered behavior list, outermost first. Built once at startup and shared
/// by every dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Behavior>,
}

impl Pipeline {
    /// Logging, validation, idempotency, caching.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            stages: vec![
                Behavior::Logging,
                Behavior::Validation,
                Behavior::Idempotency,
                Behavior::Caching,
            ],
        }
    }

    /// Builds a pipeline from an explicit order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if logging, validation or idempotency is
    /// absent, a behavior repeats, logging is not first, validation follows
    /// idempotency or caching, or caching is not last. Caching alone is
    /// optional.
    pub fn new(stages: Vec<Behavior>) -> Result<Self, PipelineError> {
        for (i, behavior) in stages.iter().enumerate() {
            if stages[..i].contains(behavior) {
                return Err(PipelineError::Duplicate(*behavior));
            }
        }
        for required in [Behavior::Logging, Behavior::Validation, Behavior::Idempotency] {
            if !stages.contains(&required) {
                return Err(PipelineError::Missing(required));
            }
        }

        let position = |b: Behavior| stages.iter().position(|s| *s == b);

        if position(Behavior::Logging).is_some_and(|i| i != 0) {
            return Err(PipelineError::LoggingNotOutermost);
        }
        if let Some(validation) = position(Behavior::Validation) {
            for later in [Behavior::Idempotency, Behavior::Caching] {
                if position(later).is_some_and(|i| i < validation) {
                    return Err(PipelineError::ValidationAfter(later));
                }
            }
        }
        if position(Behavior::Caching).is_some_and(|i| i + 1 != stages.len()) {
            return Err(PipelineError::CachingNotInnermost);
        }

        Ok(Self { stages })
    }

    #[must_use]
    pub fn stages(&self) -> &[Behavior] {
        &self.stages
    }

    /// The stages that wrap requests of type `R`, outermost first.
    #[must_use]
    pub fn plan<R: Request>(&self) -> Vec<Behavior> {
        self.plan_for(R::CAPABILITIES)
    }

    #[must_use]
    pub fn plan_for(&self, capabilities: Capabilities) -> Vec<Behavior> {
        self.stages
            .iter()
            .copied()
            .filter(|b| b.applies_to(capabilities))
            .collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

// ---------------------------------------------------------------------------
// Chain assembly
// ---------------------------------------------------------------------------

/// Collaborators needed to build the chain for one request type.
pub struct ChainParts<R: Request> {
    pub handler: HandlerService<R>,
    pub validator: Option<Arc<dyn Validator<R>>>,
    pub ledger: Arc<dyn Ledger>,
    pub cache: Arc<dyn CacheStore>,
    pub sink: Arc<dyn ObservabilitySink>,
    pub default_cache_ttl: Duration,
}

/// Wraps the handler in the stages of `plan`, innermost first, so the first
/// behavior in `plan` sees the request first.
#[must_use]
pub fn build_chain<R: Request>(plan: &[Behavior], parts: ChainParts<R>) -> BoxedStage<R> {
    let ChainParts {
        handler,
        validator,
        ledger,
        cache,
        sink,
        default_cache_ttl,
    } = parts;

    let mut svc: BoxedStage<R> = BoxCloneService::new(handler);
    for behavior in plan.iter().rev() {
        svc = match behavior {
            Behavior::Logging => BoxCloneService::new(LoggingLayer::new(Arc::clone(&sink)).layer(svc)),
            Behavior::Validation => {
                BoxCloneService::new(ValidationLayer::new(validator.clone()).layer(svc))
            }
            Behavior::Idempotency => {
                BoxCloneService::new(IdempotencyLayer::new(Arc::clone(&ledger)).layer(svc))
            }
            Behavior::Caching => BoxCloneService::new(
                CachingLayer::new(Arc::clone(&cache), default_cache_ttl).layer(svc),
            ),
        };
    }
    svc
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
