//! Idempotency ledger contract.
//!
//! The ledger is the durable set of request ids whose idempotent command has
//! been accepted. The pipeline only talks to it through [`Ledger`]; the
//! storage behind it (memory, redb, `PostgreSQL`) is owned elsewhere.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use cartline_core::RequestId;
use serde::{Deserialize, Serialize};

/// One accepted idempotent request. Append-only: never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub request_id: RequestId,
    /// Name of the request type that reserved the id.
    pub operation: String,
    /// Wall-clock time (millis since epoch) the id was reserved.
    pub created_at_ms: i64,
}

impl IdempotencyRecord {
    #[must_use]
    pub fn new(request_id: RequestId, operation: impl Into<String>, created_at_ms: i64) -> Self {
        Self {
            request_id,
            operation: operation.into(),
            created_at_ms,
        }
    }
}

/// Durable store of idempotent request ids.
///
/// Used as `Arc<dyn Ledger>`.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Atomically reserves `record.request_id`.
    ///
    /// Returns `true` if the id was absent and is now recorded, `false` if it
    /// was already present (the existing record is left untouched). Two
    /// concurrent calls with the same id must never both return `true`.
    async fn insert_if_absent(&self, record: &IdempotencyRecord) -> anyhow::Result<bool>;

    /// Whether the id has been recorded.
    async fn exists(&self, request_id: &RequestId) -> anyhow::Result<bool>;

    /// The record for an id, if any.
    async fn get(&self, request_id: &RequestId) -> anyhow::Result<Option<IdempotencyRecord>>;

    /// Releases a reservation whose command did not complete, so the command
    /// stays retryable. Returns whether a record was removed.
    async fn remove(&self, request_id: &RequestId) -> anyhow::Result<bool>;

    /// Number of recorded ids.
    async fn count(&self) -> anyhow::Result<u64>;
}

/// Wall-clock millis since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}
