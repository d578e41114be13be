//! # ql-credit
//!
//! Portfolio loss distributions of credit baskets under one-factor copulas,
//! cached per basket and consumed by tranche and n-th-to-default pricers.
//!
//! The pieces, bottom up:
//!
//! * [`name`]: reference names and the basket's name collection;
//! * [`correlation`] and [`copula`]: the dependence model;
//! * [`strategy`]: three ways to get a [`LossDistribution`] (binomial
//!   mixture, recursive convolution, Monte Carlo);
//! * [`basket`]: [`BasketPricer`], the cache with its version-based staleness
//!   check and selective refit;
//! * [`base_correlation`]: baskets priced off a base correlation curve;
//! * [`tranche`]: [`TranchePricer`].
//!
//! ```no_run
//! use ql_credit::{BasketPricer, CopulaType, CorrelationModel, LossModelConfig, Name, NameCollection};
//! use ql_termstructures::{FixedRecovery, FlatHazardRate};
//! use std::sync::Arc;
//!
//! let names: NameCollection = (0..5)
//!     .map(|i| {
//!         Name::new(
//!             format!("N{i}"),
//!             Arc::new(FlatHazardRate::from_survival_probability(0.95, 1.0).unwrap()),
//!             Arc::new(FixedRecovery::new(0.4)),
//!             0.2,
//!         )
//!     })
//!     .collect();
//! let mut basket = BasketPricer::new(
//!     names,
//!     CorrelationModel::Flat(0.3),
//!     CopulaType::Gaussian,
//!     &LossModelConfig::default(),
//! )
//! .unwrap();
//! basket.compute(&[1.0]).unwrap();
//! let equity = basket.tranche_expected_loss(0.0, 0.2, 1.0).unwrap();
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// ── Modules ───────────────────────────────────────────────────────────────────

/// Engine configuration.
pub mod config;

/// Reference names and name collections.
pub mod name;

/// Correlation models.
pub mod correlation;

/// One-factor copulas: quadrature nodes, latent CDFs, samplers.
pub mod copula;

/// Loss distributions on a grid, per evaluation date.
pub mod loss_distribution;

/// Loss-distribution strategies.
pub mod strategy;

/// The cached basket pricer.
pub mod basket;

/// Base correlation curves and baskets.
pub mod base_correlation;

/// Tranche and n-th-to-default pricing.
pub mod tranche;

// ── Convenience re-exports ────────────────────────────────────────────────────

pub use base_correlation::{BaseCorrelationBasket, BaseCorrelationCurve, StrikeMethod};
pub use basket::{
    BasketPricer, BasketStatus, CachedLossModel, LossDistributionProvider, SharedBasket,
};
pub use config::{LossModelConfig, StrategyKind};
pub use copula::{CopulaType, FactorCopula, FactorNode};
pub use correlation::CorrelationModel;
pub use loss_distribution::{GridDistribution, LossDistribution, LossSlice};
pub use name::{Name, NameCollection};
pub use strategy::{
    HeterogeneousStrategy, HomogeneousStrategy, LossDistributionStrategy, MonteCarloStrategy,
};
pub use tranche::{PaymentPeriod, PaymentSchedule, TrancheKind, TranchePricer, TrancheResults};
