//! In-memory [`Ledger`] backed by [`DashMap`].
//!
//! Reservation goes through the map's entry API, which holds the shard lock
//! for the check and the insert, so two tasks racing on one id cannot both
//! win. Only valid for a single process: once several service instances share
//! a ledger, use a backend with a real uniqueness constraint.

use async_trait::async_trait;
use cartline_core::RequestId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::storage::ledger::{IdempotencyRecord, Ledger};

#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: DashMap<RequestId, IdempotencyRecord>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn insert_if_absent(&self, record: &IdempotencyRecord) -> anyhow::Result<bool> {
        match self.records.entry(record.request_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    async fn exists(&self, request_id: &RequestId) -> anyhow::Result<bool> {
        Ok(self.records.contains_key(request_id))
    }

    async fn get(&self, request_id: &RequestId) -> anyhow::Result<Option<IdempotencyRecord>> {
        Ok(self.records.get(request_id).map(|r| r.value().clone()))
    }

    async fn remove(&self, request_id: &RequestId) -> anyhow::Result<bool> {
        Ok(self.records.remove(request_id).is_some())
    }

    async fn count(&self) -> anyhow::Result<u64> {
        Ok(self.records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn record(id: &str, at: i64) -> IdempotencyRecord {
        IdempotencyRecord::new(RequestId::new(id), "Checkout", at)
    }

    #[tokio::test]
    async fn second_insert_is_rejected_and_keeps_original() {
        let ledger = MemoryLedger::new();
        assert!(ledger.insert_if_absent(&record("r-1", 10)).await.unwrap());
        assert!(!ledger.insert_if_absent(&record("r-1", 20)).await.unwrap());

        let stored = ledger.get(&RequestId::new("r-1")).await.unwrap().unwrap();
        assert_eq!(stored.created_at_ms, 10);
        assert_eq!(ledger.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn remove_makes_id_reservable_again() {
        let ledger = MemoryLedger::new();
        let id = RequestId::new("r-2");
        ledger.insert_if_absent(&record("r-2", 1)).await.unwrap();
        assert!(ledger.exists(&id).await.unwrap());

        assert!(ledger.remove(&id).await.unwrap());
        assert!(!ledger.exists(&id).await.unwrap());
        assert!(!ledger.remove(&id).await.unwrap());
        assert!(ledger.insert_if_absent(&record("r-2", 2)).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reservations_have_one_winner() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.insert_if_absent(&record("shared", i)).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(ledger.count().await.unwrap(), 1);
    }
}
