use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Client-generated identifier of one logical idempotent operation.
///
/// Stable across retries: a client that repeats a command after a timeout
/// sends the same id, and the idempotency ledger uses it to deduplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random (UUID v4) id, for callers that do not bring their own.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Bound on every request output.
///
/// Outputs must be serializable (cached query results and transport mapping
/// both need it). [`Response::acknowledged`] supplies the value reported to a
/// retried idempotent command whose request id the ledger has already seen;
/// only the acknowledgement markers below provide one.
pub trait Response: Serialize + DeserializeOwned + Send + Sync + 'static {
    #[must_use]
    fn acknowledged() -> Option<Self> {
        None
    }
}

macro_rules! acknowledgement {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        pub struct $name;

        impl Response for $name {
            fn acknowledged() -> Option<Self> {
                Some(Self)
            }
        }
    };
}

acknowledgement!(
    /// The command completed; nothing further to report.
    Success
);

acknowledgement!(
    /// The command created a resource.
    Created
);

acknowledgement!(
    /// The command updated a resource.
    Updated
);

acknowledgement!(
    /// The command deleted a resource.
    Deleted
);

impl<T> Response for Vec<T> where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Response for Option<T> where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl Response for String {}

impl Response for u64 {}
