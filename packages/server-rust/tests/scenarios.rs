//! End-to-end behavior of the dispatcher over the commerce domain.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cartline_core::{
    CacheKey, Capabilities, Created, ErrorKind, Invalidation, Outcome, Request, RequestId, Updated,
};
use cartline_server::service::domain::cart::CART_INVALID_QUANTITY;
use cartline_server::service::domain::customers::{
    CUSTOMER_INVALID_EMAIL, CUSTOMER_NAME_REQUIRED, CUSTOMER_NOT_FOUND,
};
use cartline_server::service::domain::orders::CART_EMPTY;
use cartline_server::service::domain::{
    register_commerce, AddCartItem, AddProduct, Checkout, ClearCart, CommerceStore, GetCart,
    GetOrder, RegisterCustomer,
};
use cartline_server::service::{Dispatcher, Handler};
use cartline_server::storage::caches::MemoryCache;
use cartline_server::storage::ledgers::MemoryLedger;
use cartline_server::storage::{CacheStore, Ledger};
use tokio_util::sync::CancellationToken;

struct Shop {
    dispatcher: Arc<Dispatcher>,
    store: Arc<CommerceStore>,
    ledger: Arc<MemoryLedger>,
    cache: Arc<MemoryCache>,
}

impl Shop {
    fn new() -> Self {
        let cache = Arc::new(MemoryCache::new());
        let ledger = Arc::new(MemoryLedger::new());
        let store = Arc::new(CommerceStore::new(cache.clone()));
        let dispatcher = register_commerce(Dispatcher::builder(), &store)
            .ledger(ledger.clone())
            .cache(cache.clone())
            .build();
        Self {
            dispatcher: Arc::new(dispatcher),
            store,
            ledger,
            cache,
        }
    }

    async fn seeded() -> Self {
        let shop = Self::new();
        let registered = shop
            .send(RegisterCustomer {
                customer_id: "c-1".to_string(),
                name: "Grace".to_string(),
                email: "grace@example.com".to_string(),
            })
            .await;
        assert!(registered.is_success());
        for (id, price_cents) in [("p-1", 500), ("p-2", 1_250), ("p-3", 99)] {
            let added = shop
                .send(AddProduct {
                    product_id: id.to_string(),
                    name: format!("Product {id}"),
                    price_cents,
                })
                .await;
            assert!(added.is_success());
        }
        shop
    }

    async fn send<R: Request>(&self, request: R) -> Outcome<R::Output> {
        self.dispatcher.dispatch(request).await.unwrap()
    }

    async fn add_item(&self, product_id: &str, quantity: u32) -> Outcome<Updated> {
        self.send(AddCartItem {
            customer_id: "c-1".to_string(),
            product_id: product_id.to_string(),
            quantity,
        })
        .await
    }

    fn checkout(&self, request_id: &RequestId) -> Checkout {
        Checkout {
            request_id: request_id.clone(),
            customer_id: "c-1".to_string(),
        }
    }
}

fn codes<T>(outcome: &Outcome<T>) -> Vec<&str> {
    outcome.errors().map(|e| e.codes()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validation_failure_reports_every_violation() {
    let shop = Shop::new();

    let outcome = shop
        .send(RegisterCustomer {
            customer_id: "c-9".to_string(),
            name: "  ".to_string(),
            email: "not-an-email".to_string(),
        })
        .await;

    assert_eq!(codes(&outcome), vec![CUSTOMER_NAME_REQUIRED, CUSTOMER_INVALID_EMAIL]);
    assert!(outcome
        .errors()
        .unwrap()
        .iter()
        .all(|e| e.kind == ErrorKind::Validation));
    assert!(!shop.store.customer_exists("c-9"));
}

#[tokio::test]
async fn invalid_quantity_never_reaches_the_cart() {
    let shop = Shop::seeded().await;

    let outcome = shop.add_item("p-1", 0).await;

    assert_eq!(codes(&outcome), vec![CART_INVALID_QUANTITY]);
    assert_eq!(shop.store.cart("c-1").item_count(), 0);
}

// ---------------------------------------------------------------------------
// Idempotency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_checkouts_with_one_id_place_one_order() {
    let shop = Shop::seeded().await;
    assert!(shop.add_item("p-1", 2).await.is_success());

    let id = RequestId::new("order-1");
    let first = {
        let dispatcher = Arc::clone(&shop.dispatcher);
        let request = shop.checkout(&id);
        tokio::spawn(async move { dispatcher.dispatch(request).await })
    };
    let second = {
        let dispatcher = Arc::clone(&shop.dispatcher);
        let request = shop.checkout(&id);
        tokio::spawn(async move { dispatcher.dispatch(request).await })
    };

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(first, Outcome::success(Created));
    assert_eq!(second, Outcome::success(Created));
    assert_eq!(shop.store.order_count(), 1);
    assert_eq!(shop.ledger.count().await.unwrap(), 1);
    assert_eq!(shop.store.order("order-1").unwrap().total_cents, 1_000);
}

#[tokio::test]
async fn failed_checkout_can_be_retried_with_the_same_id() {
    let shop = Shop::seeded().await;
    let id = RequestId::new("order-2");

    let empty = shop.send(shop.checkout(&id)).await;
    assert_eq!(codes(&empty), vec![CART_EMPTY]);
    assert!(!shop.ledger.exists(&id).await.unwrap());

    assert!(shop.add_item("p-2", 1).await.is_success());
    let retried = shop.send(shop.checkout(&id)).await;

    assert_eq!(retried, Outcome::success(Created));
    assert!(shop.ledger.exists(&id).await.unwrap());
    assert_eq!(shop.store.order_count(), 1);
}

#[tokio::test]
async fn completed_checkout_is_acknowledged_without_a_second_order() {
    let shop = Shop::seeded().await;
    let id = RequestId::new("order-3");
    assert!(shop.add_item("p-3", 4).await.is_success());
    assert!(shop.send(shop.checkout(&id)).await.is_success());

    // The cart is empty now; a real second run would fail with Cart.Empty.
    assert_eq!(shop.send(shop.checkout(&id)).await, Outcome::success(Created));
    assert_eq!(shop.store.order_count(), 1);
}

#[tokio::test]
async fn checkout_without_request_id_is_rejected() {
    let shop = Shop::seeded().await;
    assert!(shop.add_item("p-1", 1).await.is_success());

    let outcome = shop.send(shop.checkout(&RequestId::new(""))).await;

    let error = outcome.first_error().unwrap();
    assert_eq!(error.kind, ErrorKind::Validation);
    assert_eq!(shop.store.order_count(), 0);
    assert_eq!(shop.store.cart("c-1").item_count(), 1);
}

// ---------------------------------------------------------------------------
// Caching
// ---------------------------------------------------------------------------

/// Stock level query whose handler counts its invocations.
struct StockLevel {
    sku: String,
}

impl Request for StockLevel {
    type Output = u64;
    const NAME: &'static str = "StockLevel";
    const CAPABILITIES: Capabilities = Capabilities::CACHEABLE_QUERY;

    fn cache_key(&self) -> Option<CacheKey> {
        Some(CacheKey::builder("stock").segment(&self.sku).build())
    }
}

#[derive(Default)]
struct Warehouse {
    on_hand: AtomicU64,
    reads: AtomicUsize,
}

#[async_trait]
impl Handler<StockLevel> for Warehouse {
    async fn handle(
        &self,
        _request: &StockLevel,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Outcome<u64>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(Outcome::success(self.on_hand.load(Ordering::SeqCst)))
    }
}

fn stock_dispatcher(warehouse: &Arc<Warehouse>, cache: Arc<dyn CacheStore>) -> Dispatcher {
    Dispatcher::builder()
        .shared_handler::<StockLevel>(warehouse.clone())
        .cache(cache)
        .build()
}

fn stock() -> StockLevel {
    StockLevel {
        sku: "mug".to_string(),
    }
}

#[tokio::test]
async fn cached_query_is_served_until_invalidated() {
    let warehouse = Arc::new(Warehouse::default());
    warehouse.on_hand.store(7, Ordering::SeqCst);
    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
    let dispatcher = stock_dispatcher(&warehouse, cache.clone());

    assert_eq!(dispatcher.dispatch(stock()).await.unwrap(), Outcome::success(7));
    warehouse.on_hand.store(3, Ordering::SeqCst);
    assert_eq!(dispatcher.dispatch(stock()).await.unwrap(), Outcome::success(7));
    assert_eq!(warehouse.reads.load(Ordering::SeqCst), 1);

    let key = stock().cache_key().unwrap();
    cache.invalidate(&Invalidation::Key(key)).await.unwrap();

    assert_eq!(dispatcher.dispatch(stock()).await.unwrap(), Outcome::success(3));
    assert_eq!(warehouse.reads.load(Ordering::SeqCst), 2);
}

/// Cache backend that is always down.
struct UnreachableCache;

#[async_trait]
impl CacheStore for UnreachableCache {
    async fn get(&self, _key: &CacheKey) -> anyhow::Result<Option<Bytes>> {
        anyhow::bail!("connection refused")
    }

    async fn set(&self, _key: &CacheKey, _value: Bytes, _ttl: Duration) -> anyhow::Result<()> {
        anyhow::bail!("connection refused")
    }

    async fn invalidate(&self, _target: &Invalidation) -> anyhow::Result<usize> {
        anyhow::bail!("connection refused")
    }
}

#[tokio::test]
async fn unreachable_cache_degrades_to_the_handler() {
    let warehouse = Arc::new(Warehouse::default());
    warehouse.on_hand.store(11, Ordering::SeqCst);
    let dispatcher = stock_dispatcher(&warehouse, Arc::new(UnreachableCache));

    for _ in 0..2 {
        assert_eq!(dispatcher.dispatch(stock()).await.unwrap(), Outcome::success(11));
    }
    assert_eq!(warehouse.reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cart_view_reflects_mutations_through_the_cache() {
    let shop = Shop::seeded().await;
    let get_cart = || GetCart {
        customer_id: "c-1".to_string(),
    };

    assert!(shop.add_item("p-1", 1).await.is_success());
    let before = shop.send(get_cart()).await.into_value().unwrap();
    assert_eq!(before.item_count(), 1);
    assert!(!shop.cache.is_empty());

    assert!(shop.add_item("p-2", 2).await.is_success());
    let after = shop.send(get_cart()).await.into_value().unwrap();
    assert_eq!(after.item_count(), 3);
    assert_eq!(after.total_cents, 500 + 2 * 1_250);
}

// ---------------------------------------------------------------------------
// Commerce flows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clearing_a_cart_empties_it() {
    let shop = Shop::seeded().await;
    for (product_id, quantity) in [("p-1", 1), ("p-2", 1), ("p-3", 1)] {
        assert!(shop.add_item(product_id, quantity).await.is_success());
    }
    assert_eq!(
        shop.send(GetCart {
            customer_id: "c-1".to_string()
        })
        .await
        .into_value()
        .unwrap()
        .item_count(),
        3
    );

    let cleared = shop
        .send(ClearCart {
            customer_id: "c-1".to_string(),
        })
        .await;
    assert_eq!(cleared, Outcome::success(Updated));

    let cart = shop
        .send(GetCart {
            customer_id: "c-1".to_string(),
        })
        .await
        .into_value()
        .unwrap();
    assert_eq!(cart.item_count(), 0);
    assert_eq!(cart.total_cents, 0);
}

#[tokio::test]
async fn clearing_an_unknown_cart_is_not_found() {
    let shop = Shop::seeded().await;

    let outcome = shop
        .send(ClearCart {
            customer_id: "c-unknown".to_string(),
        })
        .await;

    let error = outcome.first_error().unwrap();
    assert_eq!(error.code, CUSTOMER_NOT_FOUND);
    assert_eq!(error.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn placed_order_is_readable_and_cart_is_emptied() {
    let shop = Shop::seeded().await;
    assert!(shop.add_item("p-1", 3).await.is_success());
    let id = RequestId::new("order-4");

    assert!(shop.send(shop.checkout(&id)).await.is_success());

    let order = shop
        .send(GetOrder {
            order_id: "order-4".to_string(),
        })
        .await
        .into_value()
        .unwrap();
    assert_eq!(order.customer_id, "c-1");
    assert_eq!(order.total_cents, 1_500);
    assert_eq!(shop.store.cart("c-1").item_count(), 0);
}
