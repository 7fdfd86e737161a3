use async_trait::async_trait;
use cartline_core::{CacheKey, Capabilities, Error, Outcome, Request, Updated, Violation, Violations};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::catalog::{PRODUCT_ID_REQUIRED, PRODUCT_NOT_FOUND};
use super::customers::{customer_not_found, CUSTOMER_ID_REQUIRED};
use super::store::{cart_key, Cart, CartLine, CommerceStore};
use crate::service::handler::Handler;

pub const CART_INVALID_QUANTITY: &str = "Cart.InvalidQuantity";
pub const CART_QUANTITY_LIMIT: &str = "Cart.QuantityLimit";
pub const CART_ITEM_NOT_FOUND: &str = "Cart.ItemNotFound";

/// Largest quantity of one product a cart may hold.
pub const MAX_LINE_QUANTITY: u32 = 99;

fn require_customer(v: &mut Violations, customer_id: &str) {
    v.require(customer_id, CUSTOMER_ID_REQUIRED, "customer id is required");
}

// ---------------------------------------------------------------------------
// AddCartItem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCartItem {
    pub customer_id: String,
    pub product_id: String,
    pub quantity: u32,
}

impl Request for AddCartItem {
    type Output = Updated;
    const NAME: &'static str = "AddCartItem";
    const CAPABILITIES: Capabilities = Capabilities::COMMAND;
}

#[must_use]
pub fn validate_add_cart_item(request: &AddCartItem) -> Vec<Violation> {
    let mut v = Violations::new();
    require_customer(&mut v, &request.customer_id);
    v.require(&request.product_id, PRODUCT_ID_REQUIRED, "product id is required")
        .ensure(
            (1..=MAX_LINE_QUANTITY).contains(&request.quantity),
            CART_INVALID_QUANTITY,
            format!("quantity must be between 1 and {MAX_LINE_QUANTITY}"),
        );
    v.into_vec()
}

#[async_trait]
impl Handler<AddCartItem> for CommerceStore {
    async fn handle(
        &self,
        request: &AddCartItem,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Outcome<Updated>> {
        if !self.customer_exists(&request.customer_id) {
            return Ok(Outcome::failure(customer_not_found(&request.customer_id)));
        }
        let Some(unit_price_cents) = self
            .products
            .get(&request.product_id)
            .map(|entry| entry.price_cents)
        else {
            return Ok(Outcome::failure(Error::not_found(
                PRODUCT_NOT_FOUND,
                format!("product {} does not exist", request.product_id),
            )));
        };

        let merged = {
            let mut lines = self.carts.entry(request.customer_id.clone()).or_default();
            match lines
                .iter_mut()
                .find(|line| line.product_id == request.product_id)
            {
                Some(line) if line.quantity + request.quantity > MAX_LINE_QUANTITY => None,
                Some(line) => {
                    line.quantity += request.quantity;
                    Some(line.quantity)
                }
                None => {
                    lines.push(CartLine {
                        product_id: request.product_id.clone(),
                        quantity: request.quantity,
                        unit_price_cents,
                    });
                    Some(request.quantity)
                }
            }
        };

        let Some(quantity) = merged else {
            return Ok(Outcome::failure(Error::failure(
                CART_QUANTITY_LIMIT,
                format!("a cart holds at most {MAX_LINE_QUANTITY} of one product"),
            )));
        };

        tracing::debug!(
            customer_id = %request.customer_id,
            product_id = %request.product_id,
            quantity,
            "cart line updated"
        );
        self.invalidate_cart(&request.customer_id).await;
        Ok(Outcome::success(Updated))
    }
}

// ---------------------------------------------------------------------------
// RemoveCartItem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveCartItem {
    pub customer_id: String,
    pub product_id: String,
}

impl Request for RemoveCartItem {
    type Output = Updated;
    const NAME: &'static str = "RemoveCartItem";
    const CAPABILITIES: Capabilities = Capabilities::COMMAND;
}

#[must_use]
pub fn validate_remove_cart_item(request: &RemoveCartItem) -> Vec<Violation> {
    let mut v = Violations::new();
    require_customer(&mut v, &request.customer_id);
    v.require(&request.product_id, PRODUCT_ID_REQUIRED, "product id is required");
    v.into_vec()
}

#[async_trait]
impl Handler<RemoveCartItem> for CommerceStore {
    async fn handle(
        &self,
        request: &RemoveCartItem,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Outcome<Updated>> {
        if !self.customer_exists(&request.customer_id) {
            return Ok(Outcome::failure(customer_not_found(&request.customer_id)));
        }

        let removed = self
            .carts
            .get_mut(&request.customer_id)
            .is_some_and(|mut lines| {
                let before = lines.len();
                lines.retain(|line| line.product_id != request.product_id);
                lines.len() < before
            });
        if !removed {
            return Ok(Outcome::failure(Error::not_found(
                CART_ITEM_NOT_FOUND,
                format!("product {} is not in the cart", request.product_id),
            )));
        }

        self.invalidate_cart(&request.customer_id).await;
        Ok(Outcome::success(Updated))
    }
}

// ---------------------------------------------------------------------------
// ClearCart
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearCart {
    pub customer_id: String,
}

impl Request for ClearCart {
    type Output = Updated;
    const NAME: &'static str = "ClearCart";
    const CAPABILITIES: Capabilities = Capabilities::COMMAND;
}

#[must_use]
pub fn validate_clear_cart(request: &ClearCart) -> Vec<Violation> {
    let mut v = Violations::new();
    require_customer(&mut v, &request.customer_id);
    v.into_vec()
}

/// Empties the cart. Clearing an already empty cart succeeds.
#[async_trait]
impl Handler<ClearCart> for CommerceStore {
    async fn handle(
        &self,
        request: &ClearCart,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Outcome<Updated>> {
        if !self.customer_exists(&request.customer_id) {
            return Ok(Outcome::failure(customer_not_found(&request.customer_id)));
        }

        let cleared = self
            .carts
            .remove(&request.customer_id)
            .map_or(0, |(_, lines)| lines.len());
        tracing::info!(customer_id = %request.customer_id, lines = cleared, "cart cleared");

        self.invalidate_cart(&request.customer_id).await;
        Ok(Outcome::success(Updated))
    }
}

// ---------------------------------------------------------------------------
// GetCart
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetCart {
    pub customer_id: String,
}

impl Request for GetCart {
    type Output = Cart;
    const NAME: &'static str = "GetCart";
    const CAPABILITIES: Capabilities = Capabilities::CACHEABLE_QUERY;

    fn cache_key(&self) -> Option<CacheKey> {
        Some(cart_key(&self.customer_id))
    }
}

#[must_use]
pub fn validate_get_cart(request: &GetCart) -> Vec<Violation> {
    let mut v = Violations::new();
    require_customer(&mut v, &request.customer_id);
    v.into_vec()
}

#[async_trait]
impl Handler<GetCart> for CommerceStore {
    async fn handle(
        &self,
        request: &GetCart,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Outcome<Cart>> {
        if !self.customer_exists(&request.customer_id) {
            return Ok(Outcome::failure(customer_not_found(&request.customer_id)));
        }
        Ok(Outcome::success(self.cart(&request.customer_id)))
    }
}
