//! Demo commerce domain: customers, a product catalog, carts and orders.
//!
//! Every handler is implemented on [`CommerceStore`], so one shared store
//! serves all request types. Mutations invalidate the cache keys they affect
//! (`cart:<customer>`, `order:<id>`, every `catalog` listing) before they
//! return.

pub mod cart;
pub mod catalog;
pub mod customers;
pub mod orders;
pub mod store;

use std::sync::Arc;

pub use cart::{AddCartItem, ClearCart, GetCart, RemoveCartItem};
pub use catalog::{AddProduct, ListProducts};
pub use customers::RegisterCustomer;
pub use orders::{Checkout, GetOrder};
pub use store::{Cart, CartLine, CommerceStore, Customer, Order, Product};

use super::dispatcher::DispatcherBuilder;

/// Registers every commerce handler and validator on `builder`.
#[must_use]
pub fn register_commerce(builder: DispatcherBuilder, store: &Arc<CommerceStore>) -> DispatcherBuilder {
    builder
        .shared_handler::<RegisterCustomer>(store.clone())
        .validator::<RegisterCustomer, _>(customers::validate_register_customer)
        .shared_handler::<AddProduct>(store.clone())
        .validator::<AddProduct, _>(catalog::validate_add_product)
        .shared_handler::<ListProducts>(store.clone())
        .shared_handler::<AddCartItem>(store.clone())
        .validator::<AddCartItem, _>(cart::validate_add_cart_item)
        .shared_handler::<RemoveCartItem>(store.clone())
        .validator::<RemoveCartItem, _>(cart::validate_remove_cart_item)
        .shared_handler::<ClearCart>(store.clone())
        .validator::<ClearCart, _>(cart::validate_clear_cart)
        .shared_handler::<GetCart>(store.clone())
        .validator::<GetCart, _>(cart::validate_get_cart)
        .shared_handler::<Checkout>(store.clone())
        .validator::<Checkout, _>(orders::validate_checkout)
        .shared_handler::<GetOrder>(store.clone())
        .validator::<GetOrder, _>(orders::validate_get_order)
}
