//! Recovery-rate curves.
//!
//! A recovery curve gives the fraction of notional recovered if the name
//! defaults at time `t`.  Values outside `[0, 1]` are not rejected here; the
//! loss engine validates them when it reads them.

use ql_core::{errors::Result, Real, Time, Version, Versioned};
use ql_math::{Extrapolation, Interpolation1D, LinearInterpolation};

/// Recovery rate as a function of default time.
pub trait RecoveryCurve: std::fmt::Debug + Send + Sync + Versioned {
    /// Expected recovery rate for a default at time `t`.
    fn recovery_rate(&self, t: Time) -> Real;
}

/// A recovery rate that does not depend on the default time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedRecovery {
    rate: Real,
}

impl FixedRecovery {
    /// Create a constant recovery curve.
    pub fn new(rate: Real) -> Self {
        Self { rate }
    }
}

impl Versioned for FixedRecovery {
    fn version(&self) -> Version {
        Version::INITIAL
    }
}

impl RecoveryCurve for FixedRecovery {
    fn recovery_rate(&self, _t: Time) -> Real {
        self.rate
    }
}

/// Recovery rates given at a set of times, interpolated linearly and held
/// flat outside the first and last time.
#[derive(Debug, Clone)]
pub struct InterpolatedRecoveryCurve {
    interp: LinearInterpolation,
}

impl InterpolatedRecoveryCurve {
    /// Build from strictly increasing times and their recovery rates.
    pub fn new(times: &[Time], rates: &[Real]) -> Result<Self> {
        Ok(Self {
            interp: LinearInterpolation::new(times, rates, Extrapolation::Flat)?,
        })
    }
}

impl Versioned for InterpolatedRecoveryCurve {
    fn version(&self) -> Version {
        Version::INITIAL
    }
}

impl RecoveryCurve for InterpolatedRecoveryCurve {
    fn recovery_rate(&self, t: Time) -> Real {
        self.interp.operator(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn fixed_recovery_is_constant() {
        let r = FixedRecovery::new(0.4);
        assert_eq!(r.recovery_rate(0.0), 0.4);
        assert_eq!(r.recovery_rate(30.0), 0.4);
    }

    #[test]
    fn interpolated_recovery_is_flat_outside_nodes() {
        let r = InterpolatedRecoveryCurve::new(&[1.0, 5.0], &[0.40, 0.30]).unwrap();
        assert_abs_diff_eq!(r.recovery_rate(0.5), 0.40);
        assert_abs_diff_eq!(r.recovery_rate(3.0), 0.35, epsilon = 1e-15);
        assert_abs_diff_eq!(r.recovery_rate(9.0), 0.30);
    }
}
