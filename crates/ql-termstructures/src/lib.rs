//! # ql-termstructures
//!
//! Survival-probability curves, recovery curves and discount curves, all
//! parameterised by year fractions from the valuation date.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// ── Modules ───────────────────────────────────────────────────────────────────

/// `TermStructure`: base trait for all term structures.
pub mod term_structure;

/// `DefaultProbabilityTermStructure`: survival curves, bumpable in place.
pub mod default_probability_term_structure;

/// `RecoveryCurve`: recovery rate by default time.
pub mod recovery;

/// `YieldTermStructure`: discount curves.
pub mod yield_term_structure;

/// `FlatForward`: constant forward-rate yield curve.
pub mod flat_forward;

// ── Convenience re-exports ────────────────────────────────────────────────────

pub use default_probability_term_structure::{
    DefaultProbabilityTermStructure, FlatHazardRate, HazardQuote, HazardRate,
    PiecewiseHazardRateCurve, QuoteBump,
};
pub use flat_forward::FlatForward;
pub use recovery::{FixedRecovery, InterpolatedRecoveryCurve, RecoveryCurve};
pub use term_structure::TermStructure;
pub use yield_term_structure::YieldTermStructure;
