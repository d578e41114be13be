//! Numerical integration.
//!
//! Gaussian quadratures (Legendre, Hermite, Laguerre) used to integrate over
//! the systemic factor of a factor-copula model.

pub mod gaussianquadratures;

pub use gaussianquadratures::{
    GaussHermiteIntegration, GaussLaguerreIntegration, GaussLegendreIntegration,
    GaussianQuadrature,
};
