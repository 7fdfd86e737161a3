//! Tower middleware stages of the dispatch pipeline.
//!
//! - [`logging`]: Timing and outcome reporting to the observability sink
//! - [`validation`]: Runs the registered validator, short-circuits on violations
//! - [`idempotency`]: Ledger-backed deduplication of idempotent commands
//! - [`caching`]: Read-through response cache for cacheable queries
//! - [`pipeline`]: Behavior ordering and per-request chain assembly

pub mod caching;
pub mod idempotency;
pub mod logging;
pub mod pipeline;
pub mod validation;

pub use caching::CachingLayer;
pub use idempotency::IdempotencyLayer;
pub use logging::LoggingLayer;
pub use pipeline::{build_chain, Behavior, ChainParts, Pipeline, PipelineError};
pub use validation::ValidationLayer;
