//! Request envelope contract: what a command or query declares about itself.

use std::fmt;
use std::ops::BitOr;
use std::time::Duration;

use crate::cache_key::CacheKey;
use crate::types::{RequestId, Response};

/// Capability tags of a request type, fixed at compile time through
/// [`Request::CAPABILITIES`].
///
/// The dispatcher reads them to decide which pipeline stages wrap the
/// handler: idempotency only for idempotent commands, caching only for
/// cacheable queries.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Self = Self(0);
    /// Read-only operation.
    pub const QUERY: Self = Self(1);
    /// Mutating operation.
    pub const COMMAND: Self = Self(1 << 1);
    /// Safe to retry under the same [`RequestId`]. Only meaningful with `COMMAND`.
    pub const IDEMPOTENT: Self = Self(1 << 2);
    /// Result may be served from the cache. Only meaningful with `QUERY`.
    pub const CACHEABLE: Self = Self(1 << 3);

    /// Shorthand for `COMMAND | IDEMPOTENT`.
    pub const IDEMPOTENT_COMMAND: Self = Self::COMMAND.with(Self::IDEMPOTENT);
    /// Shorthand for `QUERY | CACHEABLE`.
    pub const CACHEABLE_QUERY: Self = Self::QUERY.with(Self::CACHEABLE);

    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn is_query(self) -> bool {
        self.contains(Self::QUERY)
    }

    #[must_use]
    pub const fn is_command(self) -> bool {
        self.contains(Self::COMMAND)
    }

    #[must_use]
    pub const fn is_idempotent_command(self) -> bool {
        self.contains(Self::IDEMPOTENT_COMMAND)
    }

    #[must_use]
    pub const fn is_cacheable_query(self) -> bool {
        self.contains(Self::CACHEABLE_QUERY)
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::QUERY, "QUERY"),
            (Self::COMMAND, "COMMAND"),
            (Self::IDEMPOTENT, "IDEMPOTENT"),
            (Self::CACHEABLE, "CACHEABLE"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Capabilities({})", set.join(" | "))
    }
}

/// A command or query dispatched through the pipeline.
///
/// ```
/// use cartline_core::{CacheKey, Capabilities, Request};
///
/// struct GetCart {
///     customer_id: String,
/// }
///
/// impl Request for GetCart {
///     type Output = Vec<String>;
///     const NAME: &'static str = "GetCart";
///     const CAPABILITIES: Capabilities = Capabilities::CACHEABLE_QUERY;
///
///     fn cache_key(&self) -> Option<CacheKey> {
///         Some(CacheKey::builder("cart").segment(&self.customer_id).build())
///     }
/// }
///
/// assert!(GetCart::CAPABILITIES.is_cacheable_query());
/// ```
pub trait Request: Send + Sync + 'static {
    type Output: Response;

    /// Operation name used in logs, metrics and ledger records.
    const NAME: &'static str;

    const CAPABILITIES: Capabilities;

    /// Caller-supplied id. Required for idempotent commands.
    fn request_id(&self) -> Option<&RequestId> {
        None
    }

    /// Derived key of a cacheable query. `None` disables caching for this
    /// particular request.
    fn cache_key(&self) -> Option<CacheKey> {
        None
    }

    /// Per-request TTL overriding the configured default.
    fn cache_ttl(&self) -> Option<Duration> {
        None
    }
}
