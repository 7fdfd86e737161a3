use async_trait::async_trait;
use cartline_core::{
    CacheKey, Capabilities, Created, Error, Outcome, Request, RequestId, Violation, Violations,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::customers::{customer_not_found, CUSTOMER_ID_REQUIRED};
use super::store::{order_key, total_cents, CommerceStore, Order};
use crate::service::handler::Handler;
use crate::storage::ledger::now_millis;

pub const CART_EMPTY: &str = "Cart.Empty";
pub const ORDER_ID_REQUIRED: &str = "Order.IdRequired";
pub const ORDER_NOT_FOUND: &str = "Order.NotFound";

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

/// Turns the customer's cart into an order whose id is the request id.
///
/// Idempotent: a retry under the same request id is acknowledged without
/// placing a second order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkout {
    pub request_id: RequestId,
    pub customer_id: String,
}

impl Request for Checkout {
    type Output = Created;
    const NAME: &'static str = "Checkout";
    const CAPABILITIES: Capabilities = Capabilities::IDEMPOTENT_COMMAND;

    fn request_id(&self) -> Option<&RequestId> {
        Some(&self.request_id)
    }
}

#[must_use]
pub fn validate_checkout(request: &Checkout) -> Vec<Violation> {
    let mut v = Violations::new();
    v.require(&request.customer_id, CUSTOMER_ID_REQUIRED, "customer id is required");
    v.into_vec()
}

#[async_trait]
impl Handler<Checkout> for CommerceStore {
    async fn handle(
        &self,
        request: &Checkout,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Outcome<Created>> {
        if !self.customer_exists(&request.customer_id) {
            return Ok(Outcome::failure(customer_not_found(&request.customer_id)));
        }
        if cancel.is_cancelled() {
            return Ok(Outcome::failure(Error::cancelled()));
        }

        // Taking the cart out of the map is the commit point: no two
        // checkouts can both receive its lines.
        let lines = match self.carts.remove(&request.customer_id) {
            Some((_, lines)) if !lines.is_empty() => lines,
            _ => {
                return Ok(Outcome::failure(Error::failure(
                    CART_EMPTY,
                    format!("the cart of customer {} is empty", request.customer_id),
                )));
            }
        };

        let order = Order {
            id: request.request_id.as_str().to_owned(),
            customer_id: request.customer_id.clone(),
            total_cents: total_cents(&lines),
            lines,
            placed_at_ms: now_millis(),
        };
        tracing::info!(
            order_id = %order.id,
            customer_id = %order.customer_id,
            total_cents = order.total_cents,
            "order placed"
        );
        self.orders.insert(order.id.clone(), order);

        self.invalidate_cart(&request.customer_id).await;
        self.invalidate_order(request.request_id.as_str()).await;
        Ok(Outcome::success(Created))
    }
}

// ---------------------------------------------------------------------------
// GetOrder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetOrder {
    pub order_id: String,
}

impl Request for GetOrder {
    type Output = Order;
    const NAME: &'static str = "GetOrder";
    const CAPABILITIES: Capabilities = Capabilities::CACHEABLE_QUERY;

    fn cache_key(&self) -> Option<CacheKey> {
        Some(order_key(&self.order_id))
    }
}

#[must_use]
pub fn validate_get_order(request: &GetOrder) -> Vec<Violation> {
    let mut v = Violations::new();
    v.require(&request.order_id, ORDER_ID_REQUIRED, "order id is required");
    v.into_vec()
}

#[async_trait]
impl Handler<GetOrder> for CommerceStore {
    async fn handle(
        &self,
        request: &GetOrder,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Outcome<Order>> {
        Ok(match self.order(&request.order_id) {
            Some(order) => Outcome::success(order),
            None => Outcome::failure(Error::not_found(
                ORDER_NOT_FOUND,
                format!("order {} does not exist", request.order_id),
            )),
        })
    }
}
