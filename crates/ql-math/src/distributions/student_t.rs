//! Student's t-distribution.
//!
//! Wraps the `statrs` crate's Student-t implementation, optionally rescaled to
//! unit variance (the form used for the factors of a double-t copula).

use ql_core::{errors::Result, Real};
use statrs::distribution::{Continuous, ContinuousCDF, StudentsT};

/// Student's t-distribution with `df` degrees of freedom.
#[derive(Debug, Clone)]
pub struct StudentTDistribution {
    dist: StudentsT,
    df: Real,
    scale: Real,
}

impl StudentTDistribution {
    /// Standard t-distribution (location 0, scale 1).
    ///
    /// # Errors
    /// Configuration error if `df <= 0`.
    pub fn new(df: Real) -> Result<Self> {
        ql_core::config_error!(
            df > 0.0 && df.is_finite(),
            "Student-t degrees of freedom must be positive, got {df}"
        );
        Self::build(df, 1.0)
    }

    /// t-distribution rescaled by `√((ν − 2)/ν)` so that its variance is one.
    ///
    /// # Errors
    /// Configuration error if `df <= 2` (the variance would not exist).
    pub fn unit_variance(df: Real) -> Result<Self> {
        ql_core::config_error!(
            df > 2.0 && df.is_finite(),
            "unit-variance Student-t needs more than 2 degrees of freedom, got {df}"
        );
        Self::build(df, ((df - 2.0) / df).sqrt())
    }

    fn build(df: Real, scale: Real) -> Result<Self> {
        let dist = StudentsT::new(0.0, scale, df).map_err(|e| {
            ql_core::Error::Configuration(format!("invalid Student-t parameters: {e}"))
        })?;
        Ok(Self { dist, df, scale })
    }

    /// Degrees of freedom.
    pub fn df(&self) -> Real {
        self.df
    }

    /// Scale applied to the standard t variate.
    pub fn scale(&self) -> Real {
        self.scale
    }

    /// Probability density function.
    pub fn pdf(&self, x: Real) -> Real {
        self.dist.pdf(x)
    }

    /// Cumulative distribution function P(T ≤ x).
    pub fn cdf(&self, x: Real) -> Real {
        if x == Real::NEG_INFINITY {
            return 0.0;
        }
        if x == Real::INFINITY {
            return 1.0;
        }
        self.dist.cdf(x)
    }

    /// Inverse CDF (quantile function), saturating to `±∞` at the bounds.
    pub fn inverse_cdf(&self, p: Real) -> Real {
        if p <= 0.0 {
            return Real::NEG_INFINITY;
        }
        if p >= 1.0 {
            return Real::INFINITY;
        }
        self.dist.inverse_cdf(p)
    }
}
