//! Error types for the credit-basket workspace.
//!
//! A single `thiserror`-derived enum is shared by every crate.  The
//! `ensure!`, `ensure_post!` and `fail!` macros cover the common
//! precondition / postcondition / runtime failure paths; `config_error!` and
//! `domain_error!` cover the two error classes raised while validating inputs.

use std::fmt;

use thiserror::Error;

/// The top-level error type used throughout the workspace.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// General runtime error.
    #[error("{0}")]
    Runtime(String),

    /// Precondition violated.
    #[error("precondition not satisfied: {0}")]
    Precondition(String),

    /// Postcondition violated.
    #[error("postcondition not satisfied: {0}")]
    Postcondition(String),

    /// Index out of range.
    #[error("index ({index}) out of range [0, {size})")]
    IndexOutOfRange {
        /// The index that was out of range.
        index: usize,
        /// The size of the container.
        size: usize,
    },

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid model or engine configuration (unsupported copula family,
    /// non-positive degrees of freedom, mismatched input lengths, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Market input outside its admissible domain (recovery outside `[0, 1]`,
    /// negative hazard rate, ...).
    #[error("domain violation: {0}")]
    Domain(String),

    /// One or more problems collected by a `validate` pass.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// A cached computation was queried after one of its inputs changed.
    #[error("stale cache: {0}")]
    Stale(String),

    /// A cached computation was queried before it was ever computed.
    #[error("not computed: {0}")]
    Uninitialized(String),
}

/// Shorthand `Result` type used throughout the workspace.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An ordered list of validation messages.
///
/// Components push every problem they find instead of stopping at the first
/// one; [`ValidationErrors::into_result`] turns a non-empty list into
/// [`Error::Validation`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    messages: Vec<String>,
}

impl ValidationErrors {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a problem.
    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Record a problem unless `ok` holds.
    pub fn check(&mut self, ok: bool, message: impl FnOnce() -> String) {
        if !ok {
            self.messages.push(message());
        }
    }

    /// `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of recorded problems.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// The recorded messages, in insertion order.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// `Ok(())` if empty, `Err(Error::Validation(self))` otherwise.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages.join("; "))
    }
}

/// Returns `Err(Error::Precondition(...))` if `$cond` is false.
///
/// # Example
/// ```
/// use ql_core::{ensure, errors::Error};
/// fn positive(x: f64) -> ql_core::errors::Result<f64> {
///     ensure!(x > 0.0, "x must be positive, got {x}");
///     Ok(x)
/// }
/// assert!(positive(1.0).is_ok());
/// assert!(positive(-1.0).is_err());
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($msg:tt)*) => {
        if !$cond {
            return Err($crate::errors::Error::Precondition(
                format!($($msg)*)
            ));
        }
    };
}

/// Returns `Err(Error::Postcondition(...))` if `$cond` is false.
///
/// # Example
/// ```
/// use ql_core::{ensure_post, errors::Error};
/// fn compute(x: f64) -> ql_core::errors::Result<f64> {
///     let result = x * 2.0;
///     ensure_post!(result > 0.0, "result must be positive, got {result}");
///     Ok(result)
/// }
/// assert!(compute(1.0).is_ok());
/// assert!(compute(-1.0).is_err());
/// ```
#[macro_export]
macro_rules! ensure_post {
    ($cond:expr, $($msg:tt)*) => {
        if !$cond {
            return Err($crate::errors::Error::Postcondition(
                format!($($msg)*)
            ));
        }
    };
}

/// Returns `Err(Error::Runtime(...))` immediately.
///
/// # Example
/// ```
/// use ql_core::{fail, errors::Error};
/// fn always_err() -> ql_core::errors::Result<()> {
///     fail!("something went wrong");
/// }
/// assert!(always_err().is_err());
/// ```
#[macro_export]
macro_rules! fail {
    ($($msg:tt)*) => {
        return Err($crate::errors::Error::Runtime(format!($($msg)*)))
    };
}

/// Returns `Err(Error::Configuration(...))` if `$cond` is false.
///
/// # Example
/// ```
/// use ql_core::{config_error, errors::Error};
/// fn dof(nu: f64) -> ql_core::errors::Result<f64> {
///     config_error!(nu > 0.0, "degrees of freedom must be positive, got {nu}");
///     Ok(nu)
/// }
/// assert!(matches!(dof(-1.0), Err(Error::Configuration(_))));
/// ```
#[macro_export]
macro_rules! config_error {
    ($cond:expr, $($msg:tt)*) => {
        if !$cond {
            return Err($crate::errors::Error::Configuration(
                format!($($msg)*)
            ));
        }
    };
}

/// Returns `Err(Error::Domain(...))` if `$cond` is false.
#[macro_export]
macro_rules! domain_error {
    ($cond:expr, $($msg:tt)*) => {
        if !$cond {
            return Err($crate::errors::Error::Domain(
                format!($($msg)*)
            ));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_validation_is_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn validation_collects_every_message() {
        let mut errors = ValidationErrors::new();
        errors.push("first");
        errors.check(false, || "second".to_string());
        errors.check(true, || "never".to_string());
        assert_eq!(errors.len(), 2);
        match errors.into_result() {
            Err(Error::Validation(e)) => {
                assert_eq!(e.messages(), &["first".to_string(), "second".to_string()]);
                assert_eq!(e.to_string(), "first; second");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn domain_macro_returns_domain_variant() {
        fn recovery(r: f64) -> Result<f64> {
            domain_error!((0.0..=1.0).contains(&r), "recovery {r} outside [0, 1]");
            Ok(r)
        }
        assert!(recovery(0.4).is_ok());
        assert!(matches!(recovery(1.4), Err(Error::Domain(_))));
    }
}
