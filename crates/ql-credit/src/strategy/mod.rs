//! Loss-distribution strategies.
//!
//! All strategies answer the same question: given names, a correlation
//! model, a copula and evaluation dates, what is the distribution of pool
//! loss at each date?  They differ in how:
//!
//! * [`HomogeneousStrategy`]: binomial mixture over the factor nodes when
//!   every live name is identical; otherwise it hands over to the recursion.
//! * [`HeterogeneousStrategy`]: recursive convolution of single-name losses
//!   on a loss grid, conditional on each factor node.
//! * [`MonteCarloStrategy`]: simulated default times.

pub mod heterogeneous;
pub mod homogeneous;
pub mod monte_carlo;

pub use heterogeneous::HeterogeneousStrategy;
pub use homogeneous::HomogeneousStrategy;
pub use monte_carlo::MonteCarloStrategy;

use crate::config::{LossModelConfig, StrategyKind};
use crate::copula::FactorCopula;
use crate::correlation::CorrelationModel;
use crate::loss_distribution::LossDistribution;
use crate::name::NameCollection;
use ql_core::{errors::Result, Error, Real, Time};
use std::fmt;

/// A way of computing a [`LossDistribution`].
///
/// Strategies may keep intermediate state from the last `compute` so that
/// `refit` can redo only the part affected by names at or after `min_index`.
/// A `refit` must return exactly what a fresh `compute` would.
pub trait LossDistributionStrategy: Send + Sync + fmt::Debug {
    /// Short identifier of the method behind the last computation, used in
    /// logs.
    fn name(&self) -> &'static str;

    /// Compute the loss distribution at each of `dates` from scratch.
    fn compute(
        &mut self,
        names: &NameCollection,
        correlation: &CorrelationModel,
        copula: &FactorCopula,
        dates: &[Time],
    ) -> Result<LossDistribution>;

    /// Recompute after the curves of names at or after `min_index` changed.
    ///
    /// Default: full recomputation.
    fn refit(
        &mut self,
        names: &NameCollection,
        correlation: &CorrelationModel,
        copula: &FactorCopula,
        dates: &[Time],
        min_index: usize,
    ) -> Result<LossDistribution> {
        let _ = min_index;
        self.compute(names, correlation, copula, dates)
    }

    /// Drop any intermediate state.
    fn reset(&mut self) {}
}

/// Build the strategy named by `config` for the given correlation model.
///
/// # Errors
/// Configuration error when an analytic strategy is asked to handle a full
/// correlation matrix.
pub fn from_config(
    config: &LossModelConfig,
    correlation: &CorrelationModel,
) -> Result<Box<dyn LossDistributionStrategy>> {
    let kind = match config.strategy {
        StrategyKind::Auto if correlation.is_factor_model() => StrategyKind::Homogeneous,
        StrategyKind::Auto => StrategyKind::MonteCarlo,
        kind => kind,
    };
    if kind != StrategyKind::MonteCarlo && !correlation.is_factor_model() {
        return Err(Error::Configuration(format!(
            "the {kind:?} strategy needs a factor correlation model; use Monte Carlo for a full matrix"
        )));
    }
    tracing::debug!(requested = ?config.strategy, selected = ?kind, "loss strategy selected");
    Ok(match kind {
        StrategyKind::Homogeneous => Box::new(HomogeneousStrategy::from_config(config)),
        StrategyKind::Heterogeneous => Box::new(HeterogeneousStrategy::from_config(config)),
        _ => Box::new(MonteCarloStrategy::from_config(config)),
    })
}

/// Losses and recoveries that already happened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Realized {
    pub loss: Real,
    pub recovered: Real,
    pub defaults: usize,
}

impl Realized {
    pub fn of(names: &NameCollection) -> Result<Self> {
        let (loss, recovered) = names.realized_loss_and_recovery()?;
        Ok(Self {
            loss,
            recovered,
            defaults: names.realized_defaults(),
        })
    }
}

/// Number of grid steps nearest to `amount`, halves rounded up.
pub(crate) fn snap(amount: Real, step: Real) -> usize {
    (amount / step + 0.5).floor().max(0.0) as usize
}

/// Dates must be finite, non-negative and strictly increasing.
pub(crate) fn check_dates(dates: &[Time]) -> Result<()> {
    ql_core::ensure!(
        dates.iter().all(|t| t.is_finite() && *t >= 0.0),
        "evaluation dates must be finite and non-negative"
    );
    ql_core::ensure!(
        dates.windows(2).all(|w| w[1] > w[0]),
        "evaluation dates must be strictly increasing"
    );
    Ok(())
}

/// Unconditional default probability of a name, checked to be a probability.
pub(crate) fn checked_default_probability(
    names: &NameCollection,
    i: usize,
    t: Time,
) -> Result<Real> {
    let name = names.get(i)?;
    let p = name.default_probability(t);
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::Domain(format!(
            "default probability {p} of name '{}' at t = {t} is not a probability",
            name.id()
        )));
    }
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn snapping_rounds_half_up() {
        assert_eq!(snap(0.12, 0.01), 12);
        assert_eq!(snap(0.0149, 0.01), 1);
        assert_eq!(snap(0.025, 0.01), 3);
        assert_eq!(snap(0.004, 0.01), 0);
    }

    #[test]
    fn auto_selection_follows_the_correlation_model() {
        let config = LossModelConfig::default();
        let factor = from_config(&config, &CorrelationModel::Flat(0.3)).unwrap();
        assert_eq!(factor.name(), "homogeneous");
        let matrix = CorrelationModel::Matrix(DMatrix::identity(2, 2));
        assert_eq!(from_config(&config, &matrix).unwrap().name(), "monte-carlo");
        let analytic = LossModelConfig::with_strategy(StrategyKind::Heterogeneous);
        assert!(matches!(
            from_config(&analytic, &matrix),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn dates_must_increase() {
        assert!(check_dates(&[0.5, 1.0, 2.0]).is_ok());
        assert!(check_dates(&[1.0, 1.0]).is_err());
        assert!(check_dates(&[-1.0]).is_err());
        assert!(check_dates(&[]).is_ok());
    }
}
