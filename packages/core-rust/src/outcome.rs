//! The success/failure result type returned by every operation.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Errors};

/// Result of a command or query: a value, or a non-empty list of errors.
///
/// Expected domain conditions (not found, conflict, invalid input) are
/// reported as `Failure`; faults in infrastructure or programming travel on a
/// separate error channel and never become an `Outcome`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub enum Outcome<T> {
    Success(T),
    Failure(Errors),
}

impl<T> Outcome<T> {
    pub const fn success(value: T) -> Self {
        Self::Success(value)
    }

    pub fn failure(errors: impl Into<Errors>) -> Self {
        Self::Failure(errors.into())
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    #[must_use]
    pub const fn errors(&self) -> Option<&Errors> {
        match self {
            Self::Success(_) => None,
            Self::Failure(errors) => Some(errors),
        }
    }

    /// The first error of a failing outcome.
    #[must_use]
    pub fn first_error(&self) -> Option<&Error> {
        self.errors().map(Errors::first)
    }

    /// Applies `f` to a successful value. Failures pass through untouched and
    /// `f` is never called for them.
    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::Failure(errors) => Outcome::Failure(errors),
        }
    }

    /// Chains an operation that can itself fail. Failures short-circuit.
    pub fn bind<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> Outcome<U>,
    {
        match self {
            Self::Success(value) => f(value),
            Self::Failure(errors) => Outcome::Failure(errors),
        }
    }

    /// Folds both branches into a single value.
    pub fn match_with<U>(
        self,
        on_success: impl FnOnce(T) -> U,
        on_failure: impl FnOnce(Errors) -> U,
    ) -> U {
        match self {
            Self::Success(value) => on_success(value),
            Self::Failure(errors) => on_failure(errors),
        }
    }

    /// # Errors
    ///
    /// Returns the carried [`Errors`] when the outcome is a failure.
    pub fn into_result(self) -> Result<T, Errors> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(errors) => Err(errors),
        }
    }

    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }
}

impl<T> From<Result<T, Errors>> for Outcome<T> {
    fn from(result: Result<T, Errors>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(errors) => Self::Failure(errors),
        }
    }
}

impl<T> From<Outcome<T>> for Result<T, Errors> {
    fn from(outcome: Outcome<T>) -> Self {
        outcome.into_result()
    }
}

impl<T> From<Error> for Outcome<T> {
    fn from(error: Error) -> Self {
        Self::Failure(Errors::one(error))
    }
}

// ---------------------------------------------------------------------------
// FromErrors
// ---------------------------------------------------------------------------

/// Typed factory for building a failing value of a result type.
///
/// Pipeline stages that short-circuit use this to produce the caller's result
/// type; the implementation is picked by the type parameter at compile time.
pub trait FromErrors {
    fn from_errors(errors: Errors) -> Self;
}

impl<T> FromErrors for Outcome<T> {
    fn from_errors(errors: Errors) -> Self {
        Self::Failure(errors)
    }
}

impl<T> FromErrors for Result<T, Errors> {
    fn from_errors(errors: Errors) -> Self {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::ErrorKind;

    fn not_found() -> Outcome<u32> {
        Outcome::failure(Error::not_found("Customer.NotFound", "missing"))
    }

    #[test]
    fn map_transforms_success() {
        let outcome = Outcome::success(20).map(|v| v + 1);
        assert_eq!(outcome, Outcome::Success(21));
    }

    #[test]
    fn map_never_runs_on_failure() {
        let called = Cell::new(false);
        let outcome = not_found().map(|v| {
            called.set(true);
            v + 1
        });
        assert!(!called.get());
        assert_eq!(outcome.first_error().unwrap().code, "Customer.NotFound");
    }

    #[test]
    fn bind_short_circuits() {
        let called = Cell::new(false);
        let outcome: Outcome<String> = not_found().bind(|v| {
            called.set(true);
            Outcome::success(v.to_string())
        });
        assert!(!called.get());
        assert!(outcome.is_failure());

        let chained = Outcome::success(3).bind(|v| {
            if v > 2 {
                Outcome::<u32>::failure(Error::failure("Number.TooLarge", "too large"))
            } else {
                Outcome::success(v)
            }
        });
        assert_eq!(chained.first_error().unwrap().kind, ErrorKind::Failure);
    }

    #[test]
    fn match_with_selects_branch() {
        let ok = Outcome::success(2).match_with(|v| v * 10, |_| 0);
        assert_eq!(ok, 20);
        let failed = not_found().match_with(|v| v * 10, |errors| u32::try_from(errors.len()).unwrap());
        assert_eq!(failed, 1);
    }

    #[test]
    fn result_conversions() {
        let outcome: Outcome<u32> = Ok(5).into();
        assert_eq!(outcome.into_result(), Ok(5));

        let result: Result<u32, Errors> = not_found().into();
        assert_eq!(result.unwrap_err().first().kind, ErrorKind::NotFound);
    }

    #[test]
    fn from_errors_is_selected_by_type() {
        let errors = Errors::one(Error::validation("Cart.InvalidQuantity", "bad"));
        let outcome = <Outcome<u32> as FromErrors>::from_errors(errors.clone());
        assert!(outcome.is_failure());
        let result = <Result<u32, Errors> as FromErrors>::from_errors(errors);
        assert!(result.is_err());
    }

    #[test]
    fn serde_shape() {
        let json = serde_json::to_value(Outcome::success(7_u32)).unwrap();
        assert_eq!(json, serde_json::json!({ "Success": 7 }));
        let back: Outcome<u32> = serde_json::from_value(json).unwrap();
        assert_eq!(back, Outcome::Success(7));
    }
}
