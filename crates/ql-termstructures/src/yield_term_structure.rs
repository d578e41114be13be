//! `YieldTermStructure`: discount curves used to present-value tranche legs.

use crate::term_structure::TermStructure;
use ql_core::{DiscountFactor, Rate, Time};

/// A yield (interest-rate) term structure.
///
/// Implementors provide the discount factor; zero and forward rates derive
/// from it.
pub trait YieldTermStructure: TermStructure {
    /// Discount factor `P(0, t)`.
    fn discount(&self, t: Time) -> DiscountFactor;

    /// Discount factor from `to` back to `from`: `P(0, to) / P(0, from)`.
    fn discount_between(&self, from: Time, to: Time) -> DiscountFactor {
        self.discount(to) / self.discount(from)
    }

    /// Continuously-compounded zero rate for maturity `t`.
    fn zero_rate(&self, t: Time) -> Rate {
        if t <= 0.0 {
            return self.forward_rate(0.0, 1.0e-4);
        }
        -self.discount(t).ln() / t
    }

    /// Continuously-compounded forward rate between `t1` and `t2`.
    fn forward_rate(&self, t1: Time, t2: Time) -> Rate {
        (self.discount(t1) / self.discount(t2)).ln() / (t2 - t1)
    }
}
