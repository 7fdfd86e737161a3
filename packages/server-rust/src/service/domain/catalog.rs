use std::time::Duration;

use async_trait::async_trait;
use cartline_core::{CacheKey, Capabilities, Created, Error, Outcome, Request, Violation, Violations};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::store::{CommerceStore, Product, CATALOG_NAMESPACE};
use crate::service::handler::Handler;

pub const PRODUCT_ID_REQUIRED: &str = "Product.IdRequired";
pub const PRODUCT_NAME_REQUIRED: &str = "Product.NameRequired";
pub const PRODUCT_INVALID_PRICE: &str = "Product.InvalidPrice";
pub const PRODUCT_ALREADY_EXISTS: &str = "Product.AlreadyExists";
pub const PRODUCT_NOT_FOUND: &str = "Product.NotFound";

/// Catalog listings change rarely; they stay cached longer than carts.
const CATALOG_TTL: Duration = Duration::from_secs(600);

// ---------------------------------------------------------------------------
// AddProduct
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddProduct {
    pub product_id: String,
    pub name: String,
    pub price_cents: u64,
}

impl Request for AddProduct {
    type Output = Created;
    const NAME: &'static str = "AddProduct";
    const CAPABILITIES: Capabilities = Capabilities::COMMAND;
}

#[must_use]
pub fn validate_add_product(request: &AddProduct) -> Vec<Violation> {
    let mut v = Violations::new();
    v.require(&request.product_id, PRODUCT_ID_REQUIRED, "product id is required")
        .require(&request.name, PRODUCT_NAME_REQUIRED, "product name is required")
        .ensure(
            request.price_cents > 0,
            PRODUCT_INVALID_PRICE,
            "price must be positive",
        );
    v.into_vec()
}

#[async_trait]
impl Handler<AddProduct> for CommerceStore {
    async fn handle(
        &self,
        request: &AddProduct,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Outcome<Created>> {
        use dashmap::mapref::entry::Entry;

        let listings = CommerceStore::catalog_invalidation()?;
        match self.products.entry(request.product_id.clone()) {
            Entry::Occupied(_) => {
                return Ok(Outcome::failure(Error::conflict(
                    PRODUCT_ALREADY_EXISTS,
                    format!("product {} already exists", request.product_id),
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(Product {
                    id: request.product_id.clone(),
                    name: request.name.clone(),
                    price_cents: request.price_cents,
                });
            }
        }

        self.invalidate(listings).await;
        Ok(Outcome::success(Created))
    }
}

// ---------------------------------------------------------------------------
// ListProducts
// ---------------------------------------------------------------------------

/// Catalog listing, sorted by product id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListProducts {
    /// Case-insensitive substring of the product name.
    pub name_contains: Option<String>,
    pub max_price_cents: Option<u64>,
}

impl Request for ListProducts {
    type Output = Vec<Product>;
    const NAME: &'static str = "ListProducts";
    const CAPABILITIES: Capabilities = Capabilities::CACHEABLE_QUERY;

    fn cache_key(&self) -> Option<CacheKey> {
        Some(
            CacheKey::builder(CATALOG_NAMESPACE)
                .filter_opt("name", self.name_contains.as_deref().map(str::to_lowercase))
                .filter_opt("max_price", self.max_price_cents)
                .build(),
        )
    }

    fn cache_ttl(&self) -> Option<Duration> {
        Some(CATALOG_TTL)
    }
}

#[async_trait]
impl Handler<ListProducts> for CommerceStore {
    async fn handle(
        &self,
        request: &ListProducts,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Outcome<Vec<Product>>> {
        let needle = request.name_contains.as_deref().map(str::to_lowercase);
        let mut products: Vec<Product> = self
            .products
            .iter()
            .filter(|entry| {
                let product = entry.value();
                needle
                    .as_deref()
                    .is_none_or(|n| product.name.to_lowercase().contains(n))
                    && request
                        .max_price_cents
                        .is_none_or(|max| product.price_cents <= max)
            })
            .map(|entry| entry.value().clone())
            .collect();
        products.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(Outcome::success(products))
    }
}
