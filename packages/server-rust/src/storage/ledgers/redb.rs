//! Durable single-file [`Ledger`] on redb.
//!
//! redb admits one write transaction at a time, so the lookup and the insert
//! of [`insert_if_absent`](Ledger::insert_if_absent) run inside a single
//! write transaction and are atomic. All redb calls block and are moved onto
//! the blocking pool.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cartline_core::RequestId;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::storage::codec;
use crate::storage::ledger::{IdempotencyRecord, Ledger};

/// `request_id` -> MessagePack-encoded [`IdempotencyRecord`].
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("idempotency_records");

pub struct RedbLedger {
    db: Arc<Database>,
}

impl RedbLedger {
    /// Opens (or creates) the ledger file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the table cannot be
    /// created.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db = Database::create(path)?;
        let txn = db.begin_write()?;
        {
            txn.open_table(RECORDS)?;
        }
        txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(db.as_ref())).await?
    }
}

#[async_trait]
impl Ledger for RedbLedger {
    async fn insert_if_absent(&self, record: &IdempotencyRecord) -> anyhow::Result<bool> {
        let key = record.request_id.as_str().to_owned();
        let bytes = codec::encode(record)?;
        self.blocking(move |db| {
            let txn = db.begin_write()?;
            let created = {
                let mut table = txn.open_table(RECORDS)?;
                if table.get(key.as_str())?.is_some() {
                    false
                } else {
                    table.insert(key.as_str(), &bytes[..])?;
                    true
                }
            };
            if created {
                txn.commit()?;
            } else {
                txn.abort()?;
            }
            Ok(created)
        })
        .await
    }

    async fn exists(&self, request_id: &RequestId) -> anyhow::Result<bool> {
        Ok(self.get(request_id).await?.is_some())
    }

    async fn get(&self, request_id: &RequestId) -> anyhow::Result<Option<IdempotencyRecord>> {
        let key = request_id.as_str().to_owned();
        self.blocking(move |db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(RECORDS)?;
            let Some(guard) = table.get(key.as_str())? else {
                return Ok(None);
            };
            Ok(Some(codec::decode(guard.value())?))
        })
        .await
    }

    async fn remove(&self, request_id: &RequestId) -> anyhow::Result<bool> {
        let key = request_id.as_str().to_owned();
        self.blocking(move |db| {
            let txn = db.begin_write()?;
            let removed = {
                let mut table = txn.open_table(RECORDS)?;
                let previous = table.remove(key.as_str())?;
                previous.is_some()
            };
            txn.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn count(&self) -> anyhow::Result<u64> {
        self.blocking(|db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(RECORDS)?;
            Ok(table.len()?)
        })
        .await
    }
}
