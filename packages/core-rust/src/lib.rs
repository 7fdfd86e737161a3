//! Cartline core: outcome model, request envelope traits, cache keys and the
//! validator contract shared by every command and query.

pub mod cache_key;
pub mod error;
pub mod outcome;
pub mod request;
pub mod types;
pub mod validation;

pub use cache_key::{CacheKey, CacheKeyBuilder, CachePattern, Invalidation};
pub use error::{Error, ErrorKind, Errors, CANCELLED_CODE};
pub use outcome::{FromErrors, Outcome};
pub use request::{Capabilities, Request};
pub use types::{Created, Deleted, RequestId, Response, Success, Updated};
pub use validation::{Validator, Violation, Violations};
