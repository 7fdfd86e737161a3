//! Construction of the ledger backend selected at startup.
//!
//! [`LedgerBackend`] names a backend and where its data lives;
//! [`open_ledger`] turns it into the shared `Arc<dyn Ledger>` handed to the
//! dispatcher. Backends behind a disabled cargo feature are reported as an
//! error rather than silently replaced.

use std::path::PathBuf;
use std::sync::Arc;

use crate::storage::ledger::Ledger;
use crate::storage::ledgers::MemoryLedger;

/// Which idempotency ledger to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerBackend {
    /// Process-local map. Lost on restart.
    Memory,
    /// Single-file redb database.
    Redb { path: PathBuf },
    /// `PostgreSQL` table, created on first use.
    Postgres { url: String },
}

impl LedgerBackend {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redb { .. } => "redb",
            Self::Postgres { .. } => "postgres",
        }
    }
}

/// Opens the ledger described by `backend`.
///
/// # Errors
///
/// Returns an error if the backend cannot be opened or was compiled out.
pub async fn open_ledger(backend: &LedgerBackend) -> anyhow::Result<Arc<dyn Ledger>> {
    let ledger: Arc<dyn Ledger> = match backend {
        LedgerBackend::Memory => Arc::new(MemoryLedger::new()),
        LedgerBackend::Redb { path } => open_redb(path)?,
        LedgerBackend::Postgres { url } => open_postgres(url).await?,
    };
    tracing::info!(backend = backend.name(), "idempotency ledger ready");
    Ok(ledger)
}

#[cfg(feature = "redb")]
fn open_redb(path: &std::path::Path) -> anyhow::Result<Arc<dyn Ledger>> {
    Ok(Arc::new(crate::storage::ledgers::RedbLedger::open(path)?))
}

#[cfg(not(feature = "redb"))]
fn open_redb(_path: &std::path::Path) -> anyhow::Result<Arc<dyn Ledger>> {
    anyhow::bail!("redb ledger requested but the `redb` feature is disabled")
}

#[cfg(feature = "postgres")]
async fn open_postgres(url: &str) -> anyhow::Result<Arc<dyn Ledger>> {
    let pool = sqlx::PgPool::connect(url).await?;
    let ledger = crate::storage::ledgers::PostgresLedger::new(pool);
    ledger.migrate().await?;
    Ok(Arc::new(ledger))
}

#[cfg(not(feature = "postgres"))]
#[allow(clippy::unused_async)]
async fn open_postgres(_url: &str) -> anyhow::Result<Arc<dyn Ledger>> {
    anyhow::bail!("postgres ledger requested but the `postgres` feature is disabled")
}
