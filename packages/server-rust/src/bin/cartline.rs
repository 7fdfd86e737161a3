//! Cartline demo runner.
//!
//! Wires a dispatcher over the commerce domain with the selected ledger
//! backend, runs a scripted shopping session through it and prints each
//! step's outcome as JSON.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use cartline_core::{Outcome, Request, RequestId};
use cartline_server::observability::{init_tracing, LogFormat};
use cartline_server::service::domain::{
    register_commerce, AddCartItem, AddProduct, Checkout, ClearCart, CommerceStore, GetCart,
    GetOrder, ListProducts, RegisterCustomer,
};
use cartline_server::service::{spawn_cache_sweeper, Dispatcher, PipelineConfig, SweepTask};
use cartline_server::storage::caches::MemoryCache;
use cartline_server::storage::{open_ledger, CacheStore, LedgerBackend};
use clap::Parser;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "cartline")]
#[command(about = "Run a scripted shopping session through the Cartline pipeline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, env = "CARTLINE_LOG_FORMAT")]
    log_format: LogFormat,

    /// Default TTL of cached query results, in seconds
    #[arg(long, default_value_t = 300, env = "CARTLINE_CACHE_TTL_SECS")]
    cache_ttl_secs: u64,

    /// Interval between sweeps of expired cache entries, in milliseconds
    #[arg(long, default_value_t = 60_000, env = "CARTLINE_SWEEP_INTERVAL_MS")]
    sweep_interval_ms: u64,

    /// Deadline applied to every dispatch, in milliseconds
    #[arg(long, env = "CARTLINE_DEADLINE_MS")]
    deadline_ms: Option<u64>,

    /// Store the idempotency ledger in this redb file instead of memory
    #[arg(long, env = "CARTLINE_LEDGER_PATH", conflicts_with = "database_url")]
    ledger_path: Option<PathBuf>,

    /// Store the idempotency ledger in `PostgreSQL`
    #[arg(long, env = "CARTLINE_DATABASE_URL")]
    database_url: Option<String>,

    /// Number of concurrent retries of the same checkout
    #[arg(long, default_value_t = 4)]
    checkout_retries: usize,

    /// Keep running (and sweeping the cache) until Ctrl-C after the session
    #[arg(long)]
    wait: bool,
}

impl Args {
    fn config(&self) -> PipelineConfig {
        PipelineConfig {
            default_cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            cache_sweep_interval: Duration::from_millis(self.sweep_interval_ms.max(1)),
            request_deadline: self.deadline_ms.map(Duration::from_millis),
            ..PipelineConfig::default()
        }
    }

    fn ledger_backend(&self) -> LedgerBackend {
        match (&self.ledger_path, &self.database_url) {
            (Some(path), _) => LedgerBackend::Redb { path: path.clone() },
            (None, Some(url)) => LedgerBackend::Postgres { url: url.clone() },
            (None, None) => LedgerBackend::Memory,
        }
    }
}

/// One step of the session, as printed.
#[derive(Serialize)]
struct Step {
    step: &'static str,
    operation: &'static str,
    outcome: serde_json::Value,
}

struct Session {
    dispatcher: Dispatcher,
    steps: Vec<Step>,
}

impl Session {
    async fn run<R: Request>(
        &mut self,
        step: &'static str,
        request: R,
    ) -> anyhow::Result<Outcome<R::Output>> {
        let outcome = self
            .dispatcher
            .dispatch(request)
            .await
            .with_context(|| format!("{step}: {} failed", R::NAME))?;
        self.record(step, R::NAME, &outcome)?;
        Ok(outcome)
    }

    fn record<T: Serialize>(
        &mut self,
        step: &'static str,
        operation: &'static str,
        outcome: &Outcome<T>,
    ) -> anyhow::Result<()> {
        self.steps.push(Step {
            step,
            operation,
            outcome: serde_json::to_value(outcome)?,
        });
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format, "info")?;

    let config = args.config();
    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
    let ledger = open_ledger(&args.ledger_backend()).await?;
    let store = Arc::new(CommerceStore::new(Arc::clone(&cache)));

    let dispatcher = register_commerce(Dispatcher::builder(), &store)
        .config(config.clone())
        .ledger(ledger)
        .cache(Arc::clone(&cache))
        .build();
    let mut sweeper = spawn_cache_sweeper(Arc::clone(&cache), &config);

    let mut session = Session {
        dispatcher,
        steps: Vec::new(),
    };
    shop(&mut session, args.checkout_retries).await?;

    println!("{}", serde_json::to_string_pretty(&session.steps)?);

    if args.wait {
        tracing::info!("session complete, waiting for Ctrl-C");
        tokio::signal::ctrl_c().await?;
    }
    sweeper.submit(SweepTask::Now).await?;
    sweeper.stop().await;
    Ok(())
}

async fn shop(session: &mut Session, checkout_retries: usize) -> anyhow::Result<()> {
    let customer_id = "c-ada".to_string();

    session
        .run(
            "register",
            RegisterCustomer {
                customer_id: customer_id.clone(),
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
            },
        )
        .await?;
    for (id, name, price_cents) in [
        ("p-mug", "Coffee Mug", 1_200),
        ("p-tea", "Loose Leaf Tea", 850),
        ("p-kettle", "Kettle", 4_500),
    ] {
        session
            .run(
                "add product",
                AddProduct {
                    product_id: id.to_string(),
                    name: name.to_string(),
                    price_cents,
                },
            )
            .await?;
    }
    session.run("list catalog", ListProducts::default()).await?;
    session.run("list catalog (cached)", ListProducts::default()).await?;

    for (product_id, quantity) in [("p-mug", 2), ("p-tea", 3), ("p-kettle", 0)] {
        session
            .run(
                "add to cart",
                AddCartItem {
                    customer_id: customer_id.clone(),
                    product_id: product_id.to_string(),
                    quantity,
                },
            )
            .await?;
    }
    let get_cart = || GetCart {
        customer_id: customer_id.clone(),
    };
    session.run("view cart", get_cart()).await?;
    session.run("view cart (cached)", get_cart()).await?;

    // The same checkout retried concurrently: one order, every attempt succeeds.
    let request_id = RequestId::generate();
    let attempts = (0..checkout_retries.max(1)).map(|_| {
        session.dispatcher.dispatch(Checkout {
            request_id: request_id.clone(),
            customer_id: customer_id.clone(),
        })
    });
    let outcomes = futures_util::future::join_all(attempts).await;
    for outcome in outcomes {
        let outcome = outcome.context("checkout failed")?;
        session.record("checkout", Checkout::NAME, &outcome)?;
    }

    session.run("view cart after checkout", get_cart()).await?;
    session
        .run(
            "view order",
            GetOrder {
                order_id: request_id.to_string(),
            },
        )
        .await?;
    session
        .run(
            "clear unknown cart",
            ClearCart {
                customer_id: "c-nobody".to_string(),
            },
        )
        .await?;
    Ok(())
}
