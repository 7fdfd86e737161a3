//! Error taxonomy carried by failing [`Outcome`](crate::Outcome)s.
//!
//! An [`Error`] is a plain value, not a Rust error type: it describes an
//! expected condition (bad input, missing resource, violated precondition)
//! that the caller is meant to act on. Infrastructure faults travel on a
//! separate channel and never appear here.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Code used for failures produced when a request's cancellation signal fires.
pub const CANCELLED_CODE: &str = "Request.Cancelled";

/// Classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad input. Retryable after the caller corrects the request.
    Validation,
    /// A state precondition was violated (e.g. duplicate resource).
    Conflict,
    /// The addressed resource does not exist.
    NotFound,
    /// Infrastructure or programmer fault surfaced as a value.
    Unexpected,
    /// Generic domain-rule violation.
    Failure,
}

impl ErrorKind {
    /// Stable lowercase label, used for log fields and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Unexpected => "unexpected",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single expected failure: a dotted code (`"Customer.NotFound"`), a
/// human-readable message and a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Error {
    pub code: String,
    pub message: String,
    pub kind: ErrorKind,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            kind,
        }
    }

    #[must_use]
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, code, message)
    }

    #[must_use]
    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, code, message)
    }

    #[must_use]
    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, code, message)
    }

    #[must_use]
    pub fn unexpected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, code, message)
    }

    #[must_use]
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Failure, code, message)
    }

    /// The failure reported when a request's cancellation signal fires.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::failure(CANCELLED_CODE, "the request was cancelled before it completed")
    }

    /// Whether this error reports cancellation rather than a domain condition.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Failure && self.code == CANCELLED_CODE
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.kind, self.message)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Returned when building [`Errors`] from an empty list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("a failing outcome must carry at least one error")]
pub struct EmptyErrors;

/// Non-empty, ordered list of [`Error`]s.
///
/// The only constructors are [`Errors::one`], `From<Error>` and the fallible
/// `TryFrom<Vec<Error>>`, so an `Errors` value can never be empty. The same
/// guarantee holds across deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Error>", into = "Vec<Error>")]
pub struct Errors(Vec<Error>);

#[allow(clippy::len_without_is_empty)]
impl Errors {
    #[must_use]
    pub fn one(error: Error) -> Self {
        Self(vec![error])
    }

    /// The first error. Always present.
    #[must_use]
    pub fn first(&self) -> &Error {
        &self.0[0]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Error> {
        self.0.iter()
    }

    /// Error codes in order, e.g. for comparing against expected violations.
    #[must_use]
    pub fn codes(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.code.as_str()).collect()
    }

    pub fn push(&mut self, error: Error) {
        self.0.push(error);
    }

    /// Appends all errors from `other`, preserving order.
    pub fn extend(&mut self, other: Errors) {
        self.0.extend(other.0);
    }

    /// Whether any error is of the given kind.
    #[must_use]
    pub fn contains_kind(&self, kind: ErrorKind) -> bool {
        self.0.iter().any(|e| e.kind == kind)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Error] {
        &self.0
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Error> {
        self.0
    }
}

impl From<Error> for Errors {
    fn from(error: Error) -> Self {
        Self::one(error)
    }
}

impl TryFrom<Vec<Error>> for Errors {
    type Error = EmptyErrors;

    fn try_from(errors: Vec<Error>) -> Result<Self, EmptyErrors> {
        if errors.is_empty() {
            Err(EmptyErrors)
        } else {
            Ok(Self(errors))
        }
    }
}

impl From<Errors> for Vec<Error> {
    fn from(errors: Errors) -> Self {
        errors.0
    }
}

impl IntoIterator for Errors {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Errors {
    type Item = &'a Error;
    type IntoIter = std::slice::Iter<'a, Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}
