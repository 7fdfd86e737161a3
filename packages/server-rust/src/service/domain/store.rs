//! In-memory commerce state shared by every demo handler.

use std::sync::Arc;

use cartline_core::{CacheKey, CachePattern, Invalidation, Response};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::storage::cache_store::CacheStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price_cents: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: u32,
    /// Price at the time the line was added.
    pub unit_price_cents: u64,
}

impl CartLine {
    #[must_use]
    pub fn subtotal_cents(&self) -> u64 {
        self.unit_price_cents.saturating_mul(u64::from(self.quantity))
    }
}

/// Read model returned by `GetCart`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub customer_id: String,
    pub lines: Vec<CartLine>,
    pub total_cents: u64,
}

impl Cart {
    #[must_use]
    pub fn new(customer_id: impl Into<String>, lines: Vec<CartLine>) -> Self {
        let total_cents = total_cents(&lines);
        Self {
            customer_id: customer_id.into(),
            lines,
            total_cents,
        }
    }

    /// Total quantity across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// The request id of the checkout that placed it.
    pub id: String,
    pub customer_id: String,
    pub lines: Vec<CartLine>,
    pub total_cents: u64,
    pub placed_at_ms: i64,
}

impl Response for Cart {}

impl Response for Order {}

pub(crate) fn total_cents(lines: &[CartLine]) -> u64 {
    lines
        .iter()
        .fold(0u64, |acc, line| acc.saturating_add(line.subtotal_cents()))
}

// ---------------------------------------------------------------------------
// Cache keys
// ---------------------------------------------------------------------------

pub const CART_NAMESPACE: &str = "cart";
pub const ORDER_NAMESPACE: &str = "order";
pub const CATALOG_NAMESPACE: &str = "catalog";

#[must_use]
pub fn cart_key(customer_id: &str) -> CacheKey {
    CacheKey::builder(CART_NAMESPACE).segment(customer_id).build()
}

#[must_use]
pub fn order_key(order_id: &str) -> CacheKey {
    CacheKey::builder(ORDER_NAMESPACE).segment(order_id).build()
}

// ---------------------------------------------------------------------------
// CommerceStore
// ---------------------------------------------------------------------------

/// Customers, catalog, carts and orders, plus the cache handle mutations
/// invalidate through.
///
/// Each map is independently concurrent. A cart is one map entry, so
/// checkout takes it atomically with a single `remove`.
pub struct CommerceStore {
    pub(crate) customers: DashMap<String, Customer>,
    pub(crate) products: DashMap<String, Product>,
    pub(crate) carts: DashMap<String, Vec<CartLine>>,
    pub(crate) orders: DashMap<String, Order>,
    cache: Arc<dyn CacheStore>,
}

impl CommerceStore {
    #[must_use]
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self {
            customers: DashMap::new(),
            products: DashMap::new(),
            carts: DashMap::new(),
            orders: DashMap::new(),
            cache,
        }
    }

    #[must_use]
    pub fn customer_exists(&self, customer_id: &str) -> bool {
        self.customers.contains_key(customer_id)
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    #[must_use]
    pub fn order(&self, order_id: &str) -> Option<Order> {
        self.orders.get(order_id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn cart(&self, customer_id: &str) -> Cart {
        let lines = self
            .carts
            .get(customer_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        Cart::new(customer_id, lines)
    }

    pub(crate) async fn invalidate_cart(&self, customer_id: &str) {
        self.invalidate(Invalidation::Key(cart_key(customer_id))).await;
    }

    pub(crate) async fn invalidate_order(&self, order_id: &str) {
        self.invalidate(Invalidation::Key(order_key(order_id))).await;
    }

    /// Every catalog listing. Build it before the catalog write.
    pub(crate) fn catalog_invalidation() -> anyhow::Result<Invalidation> {
        Ok(Invalidation::Pattern(CachePattern::namespace(CATALOG_NAMESPACE)?))
    }

    /// Failures are logged only; the mutation has already committed.
    pub(crate) async fn invalidate(&self, target: Invalidation) {
        match self.cache.invalidate(&target).await {
            Ok(removed) => {
                tracing::debug!(invalidation = %target, removed, "cache invalidated");
            }
            Err(err) => {
                tracing::warn!(invalidation = %target, error = %err, "cache invalidation failed");
            }
        }
    }
}
