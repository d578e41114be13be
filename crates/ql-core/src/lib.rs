//! # ql-core
//!
//! Core types, traits, and error definitions shared by the credit-basket
//! workspace.
//!
//! This crate provides the foundational building blocks used by every other
//! crate: type aliases, the error hierarchy with its validation list, and the
//! version-stamp pattern that lets cached computations detect when their
//! market inputs have been mutated.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// ── Public modules ───────────────────────────────────────────────────────────

/// Error types, `ValidationErrors`, and the `ensure!` / `fail!` family of macros.
pub mod errors;

/// Design patterns: version stamps.
pub mod patterns;

// ── Primitive type aliases ────────────────────────────────────────────────────

/// Floating-point type used throughout the library.
pub type Real = f64;

/// A rate expressed as a decimal (e.g. 0.05 = 5 %).
pub type Rate = Real;

/// A discount factor in (0, 1].
pub type DiscountFactor = Real;

/// A probability in [0, 1].
pub type Probability = Real;

/// A time measurement in years.
pub type Time = Real;

// ── Re-exports for convenience ────────────────────────────────────────────────

pub use errors::{Error, Result, ValidationErrors};
pub use patterns::versioned::{Version, VersionCounter, VersionSnapshot, Versioned};
