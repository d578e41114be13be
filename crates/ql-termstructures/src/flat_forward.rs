//! `FlatForward`: a yield term structure with a constant forward rate.

use crate::term_structure::TermStructure;
use crate::yield_term_structure::YieldTermStructure;
use ql_core::{DiscountFactor, Rate, Time};

/// A flat (constant) forward-rate yield term structure.
///
/// Discount factors are computed as `P(t) = exp(-r * t)` where `r` is the
/// continuously-compounded rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatForward {
    rate: Rate,
}

impl FlatForward {
    /// Create a flat-forward curve from a continuously-compounded rate.
    pub fn continuous(rate: Rate) -> Self {
        Self { rate }
    }

    /// Create a flat-forward curve from an annually-compounded rate.
    pub fn annual(rate: Rate) -> Self {
        Self::continuous(rate.ln_1p())
    }

    /// The continuously-compounded rate.
    pub fn rate(&self) -> Rate {
        self.rate
    }
}

impl TermStructure for FlatForward {}

impl YieldTermStructure for FlatForward {
    fn discount(&self, t: Time) -> DiscountFactor {
        (-self.rate * t).exp()
    }

    fn zero_rate(&self, _t: Time) -> Rate {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flat_forward_discount() {
        let curve = FlatForward::continuous(0.05);
        assert_relative_eq!(curve.discount(2.0), (-0.1f64).exp(), epsilon = 1e-15);
        assert_relative_eq!(curve.forward_rate(1.0, 3.0), 0.05, epsilon = 1e-12);
        assert_relative_eq!(curve.discount_between(1.0, 2.0), (-0.05f64).exp(), epsilon = 1e-15);
    }

    #[test]
    fn annual_compounding_converts() {
        let curve = FlatForward::annual(0.05);
        assert_relative_eq!(curve.discount(1.0), 1.0 / 1.05, epsilon = 1e-15);
    }
}
