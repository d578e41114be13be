//! Binomial distribution.
//!
//! Probabilities are evaluated in log space (`statrs` log-binomial
//! coefficients) so that whole rows stay accurate for baskets of a few
//! hundred names with small default probabilities.

use ql_core::{errors::Result, Real};
use statrs::function::factorial::ln_binomial;

/// Binomial distribution with `n` trials and success probability `p`.
#[derive(Debug, Clone)]
pub struct BinomialDistribution {
    n: u64,
    p: Real,
}

impl BinomialDistribution {
    /// Create a binomial distribution with `n` trials and probability `p`.
    ///
    /// `n = 0` is allowed and describes a point mass at zero.
    pub fn new(p: Real, n: u64) -> Result<Self> {
        ql_core::ensure!((0.0..=1.0).contains(&p), "p must be in [0, 1], got {p}");
        Ok(Self { n, p })
    }

    /// Number of trials.
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Success probability.
    pub fn p(&self) -> Real {
        self.p
    }

    /// Probability mass function P(X = k).
    pub fn pmf(&self, k: u64) -> Real {
        if k > self.n {
            return 0.0;
        }
        if self.p == 0.0 {
            return if k == 0 { 1.0 } else { 0.0 };
        }
        if self.p == 1.0 {
            return if k == self.n { 1.0 } else { 0.0 };
        }
        let ln = ln_binomial(self.n, k)
            + k as Real * self.p.ln()
            + (self.n - k) as Real * (-self.p).ln_1p();
        ln.exp()
    }

    /// All probabilities `P(X = 0), …, P(X = n)`.
    pub fn pmf_row(&self) -> Vec<Real> {
        (0..=self.n).map(|k| self.pmf(k)).collect()
    }

    /// Cumulative distribution function P(X ≤ k).
    pub fn cdf(&self, k: u64) -> Real {
        (0..=k.min(self.n)).map(|j| self.pmf(j)).sum::<Real>().min(1.0)
    }

    /// Mean of the distribution (= np).
    pub fn mean(&self) -> Real {
        self.n as Real * self.p
    }

    /// Variance of the distribution (= np(1-p)).
    pub fn variance(&self) -> Real {
        self.n as Real * self.p * (1.0 - self.p)
    }
}
