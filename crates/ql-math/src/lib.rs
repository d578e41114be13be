//! # ql-math
//!
//! Numerical building blocks for the credit-basket engine: distributions
//! (via statrs), Gaussian quadratures, root finding, linear interpolation,
//! a seeded Mersenne Twister and sample statistics.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// ── Modules ───────────────────────────────────────────────────────────────────

/// Probability distributions.
pub mod distributions;

/// Gaussian quadrature rules.
pub mod integrals;

/// 1D interpolation.
pub mod interpolations;

/// Random number generators.
pub mod random_numbers;

/// 1D root-finding solvers.
pub mod solvers1d;

/// Statistics accumulators and order statistics.
pub mod statistics;

// ── Convenience re-exports ────────────────────────────────────────────────────

pub use distributions::{
    normal_cdf, normal_cdf_inverse, normal_pdf, BinomialDistribution, StudentTDistribution,
};
pub use integrals::{
    GaussHermiteIntegration, GaussLaguerreIntegration, GaussLegendreIntegration,
    GaussianQuadrature,
};
pub use interpolations::{Extrapolation, Interpolation1D, LinearInterpolation};
pub use random_numbers::MersenneTwisterUniformRng;
pub use statistics::{OrderStatistics, Statistics};
