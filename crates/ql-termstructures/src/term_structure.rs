//! `TermStructure`: base trait for all term structures.
//!
//! Curves in this crate are parameterised directly by year fractions
//! measured from the valuation date; `t = 0` is "now".

use ql_core::Time;

/// Base trait for all term structures.
pub trait TermStructure: std::fmt::Debug + Send + Sync {
    /// The latest time for which the curve is calibrated.  Evaluation beyond
    /// it extrapolates.
    fn max_time(&self) -> Time {
        Time::INFINITY
    }

    /// Check whether a time is in the calibrated range of the term structure.
    fn check_range(&self, t: Time) -> bool {
        t >= 0.0 && t <= self.max_time()
    }
}
