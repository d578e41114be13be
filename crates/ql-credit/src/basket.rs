//! The basket pricer: a cached loss distribution over a fixed set of names.
//!
//! [`BasketPricer`] owns the names, the dependence model and one
//! [`LossDistributionStrategy`], chosen at construction.  `compute(dates)`
//! fills the cache; queries read it.  The cache records the version of every
//! curve it was computed against, so a curve bumped in place after the fact
//! is noticed:
//!
//! ```text
//!  Uninitialized ──compute──▶ Current ──curve bumped──▶ Stale
//!        ▲                      ▲                         │
//!        └──────reset───────────┴────ensure_current───────┘
//! ```
//!
//! Queries on a stale or uninitialized basket fail with [`Error::Stale`] or
//! [`Error::Uninitialized`] rather than returning numbers for inputs that no
//! longer hold.  `ensure_current` refits from the lowest name whose curves
//! changed.
//!
//! Several tranche pricers can share one basket through
//! [`SharedBasket`]; the [`LossDistributionProvider`] implementation for
//! `RwLock<P>` takes the write lock only to bring the cache up to date.

use crate::config::LossModelConfig;
use crate::copula::{CopulaType, FactorCopula};
use crate::correlation::CorrelationModel;
use crate::loss_distribution::LossDistribution;
use crate::name::{Name, NameCollection};
use crate::strategy::{self, LossDistributionStrategy};
use ql_core::{
    errors::Result, Error, Probability, Real, Time, ValidationErrors, VersionSnapshot,
};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, trace};

/// Largest tolerated deviation of a slice's total mass from one.
pub const MASS_TOLERANCE: Real = 1.0e-8;

/// Where a basket's cache stands relative to its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasketStatus {
    /// Never computed, or reset.
    Uninitialized,
    /// Computed against the current inputs.
    Current,
    /// Inputs changed since the last computation.
    Stale {
        /// Lowest name index whose inputs changed.
        first_changed: usize,
    },
}

#[derive(Debug, Clone)]
enum CacheState {
    Uninitialized,
    Cached {
        distribution: LossDistribution,
        versions: VersionSnapshot,
    },
}

/// Cached loss distributions of a basket of names.
#[derive(Debug)]
pub struct BasketPricer {
    names: NameCollection,
    correlation: CorrelationModel,
    copula: FactorCopula,
    config: LossModelConfig,
    strategy: Box<dyn LossDistributionStrategy>,
    dates: Vec<Time>,
    state: CacheState,
    dirty_from: Option<usize>,
}

/// A basket shared between several pricers.
pub type SharedBasket = Arc<RwLock<BasketPricer>>;

impl BasketPricer {
    /// Validate the inputs and build the basket with the strategy `config`
    /// selects.
    ///
    /// # Errors
    /// [`Error::Validation`] listing every problem with the names, the
    /// correlation model, the copula parameters and the configuration.
    pub fn new(
        names: NameCollection,
        correlation: CorrelationModel,
        copula: CopulaType,
        config: &LossModelConfig,
    ) -> Result<Self> {
        let mut errors = ValidationErrors::new();
        config.validate(&mut errors);
        names.validate(&mut errors);
        correlation.validate(names.len(), &mut errors);
        if let Err(e) = copula.validate() {
            errors.push(e.to_string());
        }
        errors.check(
            correlation.is_factor_model() || !matches!(copula, CopulaType::DoubleT { .. }),
            || "a full correlation matrix needs a Gaussian or Student-t copula".to_string(),
        );
        errors.into_result()?;

        let copula = FactorCopula::new(copula, config.quadrature_order, config.mixing_order)?;
        let strategy = strategy::from_config(config, &correlation)?;
        debug!(
            names = names.len(),
            copula = %copula.kind(),
            strategy = strategy.name(),
            "basket created"
        );
        Ok(Self {
            names,
            correlation,
            copula,
            config: config.clone(),
            strategy,
            dates: Vec::new(),
            state: CacheState::Uninitialized,
            dirty_from: None,
        })
    }

    /// Replace the strategy, dropping any cached result.
    ///
    /// # Errors
    /// Configuration error when an analytic strategy is given a full
    /// correlation matrix.
    pub fn with_strategy(mut self, strategy: Box<dyn LossDistributionStrategy>) -> Result<Self> {
        ql_core::config_error!(
            self.correlation.is_factor_model() || strategy.name() == "monte-carlo",
            "the {} strategy needs a factor correlation model",
            strategy.name()
        );
        self.strategy = strategy;
        self.state = CacheState::Uninitialized;
        Ok(self)
    }

    /// The names, in recursion order.
    pub fn names(&self) -> &NameCollection {
        &self.names
    }

    /// The dependence model.
    pub fn correlation(&self) -> &CorrelationModel {
        &self.correlation
    }

    /// The copula with its quadrature nodes.
    pub fn copula(&self) -> &FactorCopula {
        &self.copula
    }

    /// Engine configuration the basket was built with.
    pub fn config(&self) -> &LossModelConfig {
        &self.config
    }

    /// Name of the loss strategy behind the cached result: `"heterogeneous"`
    /// once a homogeneous or automatic strategy has handed a mixed pool to
    /// the recursion, the strategy selected at construction before that.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Dates of the last `compute`.
    pub fn dates(&self) -> &[Time] {
        &self.dates
    }

    /// State of the cache.
    pub fn status(&self) -> BasketStatus {
        match &self.state {
            CacheState::Uninitialized => BasketStatus::Uninitialized,
            CacheState::Cached { versions, .. } => {
                let changed = NameCollection::first_changed(versions, &self.names.versions());
                match (changed, self.dirty_from) {
                    (None, None) => BasketStatus::Current,
                    (Some(a), Some(b)) => BasketStatus::Stale {
                        first_changed: a.min(b),
                    },
                    (Some(i), None) | (None, Some(i)) => BasketStatus::Stale { first_changed: i },
                }
            }
        }
    }

    /// Compute the loss distribution at `dates`.
    ///
    /// Computing again with the same dates while the cache is current
    /// returns the cached result.  On error the cache is left uninitialized.
    pub fn compute(&mut self, dates: &[Time]) -> Result<&LossDistribution> {
        if self.dates == dates && self.status() == BasketStatus::Current {
            trace!("basket cache is current");
            return self.distribution();
        }
        self.state = CacheState::Uninitialized;
        self.dates = dates.to_vec();
        let versions = self.names.versions();
        let distribution =
            self.strategy
                .compute(&self.names, &self.correlation, &self.copula, &self.dates)?;
        self.store(distribution, versions)
    }

    /// Recompute after the inputs of names at or after `min_index` changed.
    ///
    /// The result equals a fresh `compute` on the same dates.  Names whose
    /// curves changed below `min_index` lower the starting point; without a
    /// cached result the recursion starts from the first name.
    ///
    /// # Errors
    /// [`Error::IndexOutOfRange`] if `min_index` exceeds the number of names;
    /// [`Error::Uninitialized`] if no dates were ever computed.
    pub fn refit(&mut self, min_index: usize) -> Result<&LossDistribution> {
        if min_index > self.names.len() {
            return Err(Error::IndexOutOfRange {
                index: min_index,
                size: self.names.len(),
            });
        }
        if self.dates.is_empty() && matches!(self.state, CacheState::Uninitialized) {
            return Err(Error::Uninitialized(
                "refit needs the dates of a previous compute".to_string(),
            ));
        }
        let changed = match &self.state {
            CacheState::Cached { versions, .. } => {
                NameCollection::first_changed(versions, &self.names.versions())
            }
            CacheState::Uninitialized => Some(0),
        };
        let min_index = [self.dirty_from, changed]
            .into_iter()
            .flatten()
            .fold(min_index, usize::min);
        self.state = CacheState::Uninitialized;
        let versions = self.names.versions();
        debug!(min_index, strategy = self.strategy.name(), "basket refit");
        let distribution = self.strategy.refit(
            &self.names,
            &self.correlation,
            &self.copula,
            &self.dates,
            min_index,
        )?;
        self.store(distribution, versions)
    }

    /// Drop the cache; the next `ensure_current` recomputes from scratch.
    pub fn reset(&mut self) {
        debug!("basket reset");
        self.state = CacheState::Uninitialized;
        self.dirty_from = None;
        self.strategy.reset();
    }

    /// Bring the cache up to date with the current inputs: refit from the
    /// lowest changed name, or compute from scratch after a reset.
    pub fn ensure_current(&mut self) -> Result<()> {
        match self.status() {
            BasketStatus::Current => Ok(()),
            BasketStatus::Stale { first_changed } => {
                debug!(first_changed, "basket inputs changed, refitting");
                self.refit(first_changed).map(|_| ())
            }
            BasketStatus::Uninitialized => {
                if self.dates.is_empty() {
                    return Err(Error::Uninitialized(
                        "basket was never computed".to_string(),
                    ));
                }
                let dates = std::mem::take(&mut self.dates);
                self.compute(&dates).map(|_| ())
            }
        }
    }

    /// Replace the name at position `i`; the cache goes stale from `i`.
    pub fn replace_name(&mut self, i: usize, name: Name) -> Result<()> {
        let previous = self.names.get(i)?.clone();
        self.names.replace(i, name)?;
        let mut errors = ValidationErrors::new();
        self.names.validate(&mut errors);
        if let Err(e) = errors.into_result() {
            self.names.replace(i, previous)?;
            return Err(e);
        }
        self.dirty_from = Some(self.dirty_from.map_or(i, |d| d.min(i)));
        Ok(())
    }

    fn store(
        &mut self,
        distribution: LossDistribution,
        versions: VersionSnapshot,
    ) -> Result<&LossDistribution> {
        let mass_error = distribution.max_mass_error();
        ql_core::ensure_post!(
            mass_error <= MASS_TOLERANCE,
            "loss distribution masses deviate from one by {mass_error:e}"
        );
        debug!(
            dates = self.dates.len(),
            mass_error,
            strategy = self.strategy.name(),
            "basket loss distribution cached"
        );
        self.dirty_from = None;
        self.state = CacheState::Cached {
            distribution,
            versions,
        };
        self.distribution()
    }

    /// The cached distribution.
    ///
    /// # Errors
    /// [`Error::Uninitialized`] before the first `compute` or after a reset;
    /// [`Error::Stale`] when inputs changed since.
    pub fn distribution(&self) -> Result<&LossDistribution> {
        match (&self.state, self.status()) {
            (CacheState::Cached { distribution, .. }, BasketStatus::Current) => Ok(distribution),
            (_, BasketStatus::Stale { first_changed }) => {
                debug!(first_changed, "query on a stale basket");
                Err(Error::Stale(format!(
                    "inputs of name {first_changed} changed since the last computation; call ensure_current or refit"
                )))
            }
            _ => Err(Error::Uninitialized(
                "basket loss distribution has not been computed".to_string(),
            )),
        }
    }

    /// Expected pool loss at `t`, as a fraction of total notional.
    pub fn expected_loss(&self, t: Time) -> Result<Real> {
        self.distribution()?.expected_loss(t)
    }

    /// Expected loss of the tranche `[attachment, detachment]` at `t`.
    pub fn tranche_expected_loss(&self, attachment: Real, detachment: Real, t: Time) -> Result<Real> {
        self.distribution()?
            .tranche_expected_loss(attachment, detachment, t)
    }

    /// Standard error of a simulated tranche expected loss.
    pub fn tranche_loss_standard_error(
        &self,
        attachment: Real,
        detachment: Real,
        t: Time,
    ) -> Result<Option<Real>> {
        Ok(self
            .distribution()?
            .slice(t)?
            .tranche_loss_standard_error(attachment, detachment))
    }

    /// Expected amortization of the tranche `[attachment, detachment]` at `t`.
    pub fn tranche_expected_amortization(
        &self,
        attachment: Real,
        detachment: Real,
        t: Time,
    ) -> Result<Real> {
        self.distribution()?
            .tranche_expected_amortization(attachment, detachment, t)
    }

    /// `P(N(t) ≥ n)`, realized defaults included.
    pub fn probability_at_least_n_defaults(&self, n: usize, t: Time) -> Result<Probability> {
        self.distribution()?.probability_at_least_n_defaults(n, t)
    }

    /// `P(L(t) > x)`.
    pub fn probability_over_loss(&self, x: Real, t: Time) -> Result<Probability> {
        self.distribution()?.probability_over_loss(x, t)
    }

    /// Loss percentile at `t`.
    pub fn percentile(&self, q: Probability, t: Time) -> Result<Real> {
        self.distribution()?.percentile(q, t)
    }

    /// Expected shortfall at `t`.
    pub fn expected_shortfall(&self, q: Probability, t: Time) -> Result<Real> {
        self.distribution()?.expected_shortfall(q, t)
    }
}

/// Read access to a loss distribution, for tranche pricers.
pub trait LossDistributionProvider: Send + Sync + fmt::Debug {
    /// Make sure subsequent queries see the current inputs, recomputing if
    /// the provider can; otherwise fail with [`Error::Stale`].
    fn ensure_fresh(&self) -> Result<()>;

    /// Computed evaluation dates.
    fn dates(&self) -> Vec<Time>;

    /// Expected tranche loss at `t`.
    fn tranche_expected_loss(&self, attachment: Real, detachment: Real, t: Time) -> Result<Real>;

    /// Expected tranche amortization at `t`.
    fn tranche_expected_amortization(
        &self,
        attachment: Real,
        detachment: Real,
        t: Time,
    ) -> Result<Real>;

    /// `P(N(t) ≥ n)`.
    fn probability_at_least_n_defaults(&self, n: usize, t: Time) -> Result<Probability>;
}

/// A provider that can bring its own cache up to date.
pub trait CachedLossModel: LossDistributionProvider {
    /// Recompute whatever the input changes since the last computation
    /// require.
    fn ensure_current(&mut self) -> Result<()>;
}

impl LossDistributionProvider for BasketPricer {
    fn ensure_fresh(&self) -> Result<()> {
        self.distribution().map(|_| ())
    }

    fn dates(&self) -> Vec<Time> {
        self.dates.clone()
    }

    fn tranche_expected_loss(&self, attachment: Real, detachment: Real, t: Time) -> Result<Real> {
        BasketPricer::tranche_expected_loss(self, attachment, detachment, t)
    }

    fn tranche_expected_amortization(
        &self,
        attachment: Real,
        detachment: Real,
        t: Time,
    ) -> Result<Real> {
        BasketPricer::tranche_expected_amortization(self, attachment, detachment, t)
    }

    fn probability_at_least_n_defaults(&self, n: usize, t: Time) -> Result<Probability> {
        BasketPricer::probability_at_least_n_defaults(self, n, t)
    }
}

impl CachedLossModel for BasketPricer {
    fn ensure_current(&mut self) -> Result<()> {
        BasketPricer::ensure_current(self)
    }
}

impl<P: CachedLossModel> LossDistributionProvider for RwLock<P> {
    fn ensure_fresh(&self) -> Result<()> {
        if self
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ensure_fresh()
            .is_ok()
        {
            return Ok(());
        }
        self.write()
            .unwrap_or_else(PoisonError::into_inner)
            .ensure_current()
    }

    fn dates(&self) -> Vec<Time> {
        self.read().unwrap_or_else(PoisonError::into_inner).dates()
    }

    fn tranche_expected_loss(&self, attachment: Real, detachment: Real, t: Time) -> Result<Real> {
        self.read()
            .unwrap_or_else(PoisonError::into_inner)
            .tranche_expected_loss(attachment, detachment, t)
    }

    fn tranche_expected_amortization(
        &self,
        attachment: Real,
        detachment: Real,
        t: Time,
    ) -> Result<Real> {
        self.read()
            .unwrap_or_else(PoisonError::into_inner)
            .tranche_expected_amortization(attachment, detachment, t)
    }

    fn probability_at_least_n_defaults(&self, n: usize, t: Time) -> Result<Probability> {
        self.read()
            .unwrap_or_else(PoisonError::into_inner)
            .probability_at_least_n_defaults(n, t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyKind;
    use approx::assert_abs_diff_eq;
    use ql_termstructures::{DefaultProbabilityTermStructure, FixedRecovery, FlatHazardRate, PiecewiseHazardRateCurve, QuoteBump};

    fn basket_with(curve: Arc<PiecewiseHazardRateCurve>) -> BasketPricer {
        let names: NameCollection = (0..4)
            .map(|i| {
                let survival: Arc<dyn ql_termstructures::DefaultProbabilityTermStructure> = if i == 2 {
                    curve.clone()
                } else {
                    Arc::new(FlatHazardRate::new(0.02))
                };
                Name::new(format!("N{i}"), survival, Arc::new(FixedRecovery::new(0.4)), 1.0)
            })
            .collect();
        let config = LossModelConfig {
            loss_step: 0.01,
            quadrature_order: 24,
            ..LossModelConfig::with_strategy(StrategyKind::Heterogeneous)
        };
        BasketPricer::new(names, CorrelationModel::Flat(0.3), CopulaType::Gaussian, &config).unwrap()
    }

    #[test]
    fn queries_before_compute_are_uninitialized() {
        let curve = Arc::new(PiecewiseHazardRateCurve::flat(0.03).unwrap());
        let mut basket = basket_with(curve);
        assert_eq!(basket.status(), BasketStatus::Uninitialized);
        assert!(matches!(basket.expected_loss(1.0), Err(Error::Uninitialized(_))));
        assert!(matches!(basket.ensure_current(), Err(Error::Uninitialized(_))));
        assert!(matches!(basket.refit(0), Err(Error::Uninitialized(_))));
    }

    #[test]
    fn bumped_curve_makes_the_basket_stale() {
        let curve = Arc::new(PiecewiseHazardRateCurve::flat(0.03).unwrap());
        let mut basket = basket_with(curve.clone());
        basket.compute(&[1.0, 5.0]).unwrap();
        let before = basket.expected_loss(5.0).unwrap();

        curve.bump_quote(&QuoteBump::absolute(0.01)).unwrap();
        assert_eq!(basket.status(), BasketStatus::Stale { first_changed: 2 });
        assert!(matches!(basket.expected_loss(5.0), Err(Error::Stale(_))));

        basket.ensure_current().unwrap();
        assert_eq!(basket.status(), BasketStatus::Current);
        assert!(basket.expected_loss(5.0).unwrap() > before);
    }

    #[test]
    fn reset_then_ensure_current_recomputes() {
        let curve = Arc::new(PiecewiseHazardRateCurve::flat(0.03).unwrap());
        let mut basket = basket_with(curve);
        let el = basket.compute(&[2.0]).unwrap().clone();
        basket.reset();
        assert!(matches!(basket.expected_loss(2.0), Err(Error::Uninitialized(_))));
        basket.ensure_current().unwrap();
        assert_eq!(basket.distribution().unwrap(), &el);
    }

    #[test]
    fn refit_index_is_checked() {
        let curve = Arc::new(PiecewiseHazardRateCurve::flat(0.03).unwrap());
        let mut basket = basket_with(curve);
        basket.compute(&[1.0]).unwrap();
        assert!(matches!(
            basket.refit(5),
            Err(Error::IndexOutOfRange { index: 5, size: 4 })
        ));
        assert!(basket.refit(4).is_ok());
    }

    #[test]
    fn replacing_a_name_is_validated() {
        let curve = Arc::new(PiecewiseHazardRateCurve::flat(0.03).unwrap());
        let mut basket = basket_with(curve);
        basket.compute(&[1.0]).unwrap();
        let duplicate = basket.names().get(0).unwrap().clone();
        assert!(matches!(basket.replace_name(3, duplicate), Err(Error::Validation(_))));
        assert_eq!(basket.status(), BasketStatus::Current);

        let riskier = Name::new(
            "N3",
            Arc::new(FlatHazardRate::new(0.1)),
            Arc::new(FixedRecovery::new(0.4)),
            1.0,
        );
        basket.replace_name(3, riskier).unwrap();
        assert_eq!(basket.status(), BasketStatus::Stale { first_changed: 3 });
        let el = basket.refit(3).unwrap().expected_loss(1.0).unwrap();
        assert_abs_diff_eq!(el, basket.names().expected_loss(1.0).unwrap(), epsilon = 1e-3);
    }

    #[test]
    fn invalid_inputs_are_all_reported() {
        let names = NameCollection::new(vec![Name::new(
            "A",
            Arc::new(FlatHazardRate::new(0.01)),
            Arc::new(FixedRecovery::new(1.5)),
            1.0,
        )]);
        let config = LossModelConfig {
            loss_step: -1.0,
            ..LossModelConfig::default()
        };
        match BasketPricer::new(
            names,
            CorrelationModel::Flat(1.5),
            CopulaType::StudentT { df: 0.0 },
            &config,
        ) {
            Err(Error::Validation(errors)) => assert_eq!(errors.len(), 4, "{errors}"),
            other => panic!("expected validation errors, got {other:?}"),
        }
    }
}
