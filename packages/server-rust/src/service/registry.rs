use std::any::{Any, TypeId};
use std::sync::Arc;

use cartline_core::{Capabilities, Request, Validator};
use dashmap::DashMap;
use parking_lot::RwLock;

use super::handler::Handler;

// ---------------------------------------------------------------------------
// RegisteredOperation
// ---------------------------------------------------------------------------

/// Description of a registered request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisteredOperation {
    pub name: &'static str,
    pub capabilities: Capabilities,
    pub has_validator: bool,
}

// ---------------------------------------------------------------------------
// RequestRegistry
// ---------------------------------------------------------------------------

/// Handlers and validators keyed by request type.
///
/// Lookups go through `TypeId`, so resolving the handler for `R` is a single
/// map lookup plus a downcast of the stored `Arc`. Registration order is kept
/// for [`RequestRegistry::operations`]. Registration is crate-internal and
/// goes through [`DispatcherBuilder`](super::DispatcherBuilder), so a built
/// dispatcher's table is fixed.
pub struct RequestRegistry {
    /// `TypeId` of `R` -> `Arc<Arc<dyn Handler<R>>>`.
    handlers: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    /// `TypeId` of `R` -> `Arc<Arc<dyn Validator<R>>>`.
    validators: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    /// Registration order, by request type.
    order: RwLock<Vec<(TypeId, &'static str, Capabilities)>>,
}

impl RequestRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            validators: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Registers the handler for `R`, replacing any earlier one.
    pub(crate) fn register_handler<R, H>(&self, handler: H)
    where
        R: Request,
        H: Handler<R>,
    {
        self.register_handler_arc::<R>(Arc::new(handler));
    }

    pub(crate) fn register_handler_arc<R: Request>(&self, handler: Arc<dyn Handler<R>>) {
        let type_id = TypeId::of::<R>();
        let previous = self.handlers.insert(type_id, Arc::new(handler));
        if previous.is_some() {
            tracing::warn!(operation = R::NAME, "handler replaced");
        } else {
            self.order.write().push((type_id, R::NAME, R::CAPABILITIES));
        }
    }

    /// Registers the validator for `R`, replacing any earlier one.
    pub(crate) fn register_validator<R, V>(&self, validator: V)
    where
        R: Request,
        V: Validator<R>,
    {
        let validator: Arc<dyn Validator<R>> = Arc::new(validator);
        self.validators.insert(TypeId::of::<R>(), Arc::new(validator));
    }

    #[must_use]
    pub fn handler<R: Request>(&self) -> Option<Arc<dyn Handler<R>>> {
        self.handlers
            .get(&TypeId::of::<R>())
            .and_then(|entry| entry.value().clone().downcast::<Arc<dyn Handler<R>>>().ok())
            .map(|handler| Arc::clone(&*handler))
    }

    #[must_use]
    pub fn validator<R: Request>(&self) -> Option<Arc<dyn Validator<R>>> {
        self.validators
            .get(&TypeId::of::<R>())
            .and_then(|entry| entry.value().clone().downcast::<Arc<dyn Validator<R>>>().ok())
            .map(|validator| Arc::clone(&*validator))
    }

    #[must_use]
    pub fn contains<R: Request>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<R>())
    }

    /// Registered operations in registration order.
    #[must_use]
    pub fn operations(&self) -> Vec<RegisteredOperation> {
        self.order
            .read()
            .iter()
            .map(|(type_id, name, capabilities)| RegisteredOperation {
                name: *name,
                capabilities: *capabilities,
                has_validator: self.validators.contains_key(type_id),
            })
            .collect()
    }
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
