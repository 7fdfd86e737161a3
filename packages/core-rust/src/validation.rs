//! Validator contract for request types.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Errors};

/// One broken rule: a dotted code and a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub code: String,
    pub message: String,
}

impl Violation {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<Violation> for Error {
    fn from(violation: Violation) -> Self {
        Error::validation(violation.code, violation.message)
    }
}

/// Maps violations to validation errors, keeping their order.
///
/// Returns `None` when there are no violations.
#[must_use]
pub fn violations_to_errors(violations: Vec<Violation>) -> Option<Errors> {
    let errors: Vec<Error> = violations.into_iter().map(Error::from).collect();
    Errors::try_from(errors).ok()
}

/// Checks a request of type `R`. Implementations evaluate every rule and
/// report all violations, not just the first.
pub trait Validator<R>: Send + Sync + 'static {
    fn validate(&self, request: &R) -> Vec<Violation>;
}

impl<R, F> Validator<R> for F
where
    F: Fn(&R) -> Vec<Violation> + Send + Sync + 'static,
{
    fn validate(&self, request: &R) -> Vec<Violation> {
        self(request)
    }
}

/// Accumulates violations while a validator walks its rules.
///
/// ```
/// use cartline_core::validation::Violations;
///
/// let quantity = 0;
/// let mut v = Violations::new();
/// v.ensure(quantity > 0, "Cart.InvalidQuantity", "quantity must be positive");
/// v.ensure(!"sku-1".is_empty(), "Product.IdRequired", "product id is required");
/// assert_eq!(v.into_vec().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Violations(Vec<Violation>);

impl Violations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a violation unless `condition` holds.
    pub fn ensure(&mut self, condition: bool, code: &str, message: impl Into<String>) -> &mut Self {
        if !condition {
            self.0.push(Violation::new(code, message));
        }
        self
    }

    /// Records a violation when `value` is empty or whitespace.
    pub fn require(&mut self, value: &str, code: &str, message: impl Into<String>) -> &mut Self {
        self.ensure(!value.trim().is_empty(), code, message)
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Violation> {
        self.0
    }
}
