//! Request dispatch and the behavior pipeline.
//!
//! A request flows through:
//!
//! 1. **Dispatcher** (`dispatcher`): resolves the handler for the request type
//! 2. **Middleware** (`middleware`): Tower stages selected by the request's
//!    capabilities (logging, validation, idempotency, caching)
//! 3. **Handler** (`handler`): the terminal service, raced against cancellation
//! 4. **Domain** (`domain`): the demo commerce handlers
//! 5. **Background workers** (`worker`): periodic cache sweeping

pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod handler;
pub mod middleware;
pub mod operation;
pub mod registry;
pub mod worker;

// Re-export key types for convenient access.
pub use config::PipelineConfig;
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use handler::{Handler, HandlerService};
pub use middleware::{Behavior, Pipeline, PipelineError};
pub use operation::{DispatchError, Envelope, RequestContext};
pub use registry::{RegisteredOperation, RequestRegistry};
pub use worker::{
    spawn_cache_sweeper, BackgroundRunnable, BackgroundWorker, CacheSweeper, SweepTask,
};
