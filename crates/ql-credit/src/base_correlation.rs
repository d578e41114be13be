//! Base correlation.
//!
//! The market quotes one flat correlation per detachment strike, valid for
//! the equity ("base") tranche `[0, K]`.  Any tranche `[A, D]` is priced as
//! the difference of two base tranches, each at its own correlation:
//!
//! ```text
//! EL[A, D] = EL_{ρ(D)}[0, D] − EL_{ρ(A)}[0, A]
//! ```
//!
//! Quotes refer to the original pool.  After defaults a detachment is first
//! mapped back to the curve's strike axis with
//! [`BaseCorrelationCurve::rescale_strike`].  Nothing guarantees that the
//! difference is non-negative when the curve is steep; it is returned as is.

use crate::basket::{BasketPricer, BasketStatus, CachedLossModel, LossDistributionProvider};
use crate::config::LossModelConfig;
use crate::copula::CopulaType;
use crate::correlation::CorrelationModel;
use crate::name::NameCollection;
use ql_core::{errors::Result, Error, Probability, Real, Time};
use ql_math::{Extrapolation, Interpolation1D, LinearInterpolation};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How detachment strikes are mapped onto the curve's strike axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrikeMethod {
    /// Strikes as fractions of the remaining pool notional.
    #[default]
    Unscaled,
    /// Strikes in multiples of the pool's expected loss at maturity.
    ExpectedLoss,
}

/// Base correlation by detachment strike.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseCorrelationCurve {
    interpolation: LinearInterpolation,
    method: StrikeMethod,
}

impl BaseCorrelationCurve {
    /// Curve through `(strikes[i], correlations[i])`.
    ///
    /// # Errors
    /// Configuration error for correlations outside `[0, 1]`; precondition
    /// errors for empty, mismatched or unsorted strikes.
    pub fn new(
        strikes: &[Real],
        correlations: &[Real],
        extrapolation: Extrapolation,
        method: StrikeMethod,
    ) -> Result<Self> {
        for &rho in correlations {
            ql_core::config_error!(
                (0.0..=1.0).contains(&rho),
                "base correlation must be in [0, 1], got {rho}"
            );
        }
        ql_core::config_error!(
            strikes.iter().all(|&k| k > 0.0),
            "base correlation strikes must be positive"
        );
        Ok(Self {
            interpolation: LinearInterpolation::new(strikes, correlations, extrapolation)?,
            method,
        })
    }

    /// Strike method.
    pub fn method(&self) -> StrikeMethod {
        self.method
    }

    /// Quoted strikes.
    pub fn strikes(&self) -> &[Real] {
        self.interpolation.xs()
    }

    /// Correlation at a strike already on the curve's axis, clipped to
    /// `[0, 1]` (linear extrapolation can leave it).
    pub fn correlation(&self, strike: Real) -> Real {
        self.interpolation.operator(strike).clamp(0.0, 1.0)
    }

    /// Map a detachment (fraction of original notional) to the curve's
    /// strike axis: remove realized losses, rescale to the remaining
    /// notional and, for [`StrikeMethod::ExpectedLoss`], divide by the
    /// remaining pool's expected loss at `maturity`.
    pub fn rescale_strike(&self, detachment: Real, names: &NameCollection, maturity: Time) -> Result<Real> {
        let (realized, _) = names.realized_loss_and_recovery()?;
        let remaining = names.remaining_fraction();
        if remaining <= 0.0 {
            return Ok(0.0);
        }
        let strike = ((detachment - realized) / remaining).clamp(0.0, 1.0);
        match self.method {
            StrikeMethod::Unscaled => Ok(strike),
            StrikeMethod::ExpectedLoss => {
                let pool_el = (names.expected_loss(maturity)? - realized) / remaining;
                ql_core::domain_error!(
                    pool_el > 0.0,
                    "expected-loss strikes need a positive pool expected loss at t = {maturity}"
                );
                Ok(strike / pool_el)
            }
        }
    }
}

/// A basket priced under a base correlation curve.
///
/// Strikes must be registered by [`compute`](BaseCorrelationBasket::compute)
/// before tranches using them can be queried.  One inner [`BasketPricer`]
/// (flat correlation) is kept per distinct base correlation.
#[derive(Debug)]
pub struct BaseCorrelationBasket {
    names: NameCollection,
    curve: BaseCorrelationCurve,
    copula: CopulaType,
    config: LossModelConfig,
    dates: Vec<Time>,
    /// `(strike, correlation)` of every registered strike.
    strikes: Vec<(Real, Real)>,
    pricers: Vec<(Real, BasketPricer)>,
    computed: bool,
}

fn same(a: Real, b: Real) -> bool {
    (a - b).abs() <= 1.0e-12
}

impl BaseCorrelationBasket {
    /// Basket over `names` with correlations read off `curve`.
    ///
    /// # Errors
    /// Validation errors for the names, the copula or the configuration.
    pub fn new(
        names: NameCollection,
        curve: BaseCorrelationCurve,
        copula: CopulaType,
        config: &LossModelConfig,
    ) -> Result<Self> {
        // validates everything except the correlation
        BasketPricer::new(names.clone(), CorrelationModel::Flat(0.0), copula, config)?;
        Ok(Self {
            names,
            curve,
            copula,
            config: config.clone(),
            dates: Vec::new(),
            strikes: Vec::new(),
            pricers: Vec::new(),
            computed: false,
        })
    }

    /// The correlation curve.
    pub fn curve(&self) -> &BaseCorrelationCurve {
        &self.curve
    }

    /// The names.
    pub fn names(&self) -> &NameCollection {
        &self.names
    }

    /// Number of distinct correlations (inner baskets) in use.
    pub fn inner_baskets(&self) -> usize {
        self.pricers.len()
    }

    /// Compute the base-tranche losses for every strike in `strikes` (tranche
    /// attachments and detachments, as fractions of original notional).
    ///
    /// Inner baskets whose correlation is still needed are kept and brought
    /// up to date; the others are dropped.
    pub fn compute(&mut self, dates: &[Time], strikes: &[Real]) -> Result<()> {
        let maturity = dates.last().copied().unwrap_or(0.0);
        let mut previous = std::mem::take(&mut self.pricers);
        self.computed = false;

        let mut registered = Vec::with_capacity(strikes.len());
        let mut pricers: Vec<(Real, BasketPricer)> = Vec::new();
        for &strike in strikes {
            ql_core::ensure!(
                (0.0..=1.0).contains(&strike),
                "strike must be in [0, 1], got {strike}"
            );
            if strike == 0.0 {
                continue;
            }
            let rho = self
                .curve
                .correlation(self.curve.rescale_strike(strike, &self.names, maturity)?);
            registered.push((strike, rho));
            if pricers.iter().any(|(r, _)| r.to_bits() == rho.to_bits()) {
                continue;
            }
            let mut pricer = match previous.iter().position(|(r, _)| r.to_bits() == rho.to_bits()) {
                Some(i) => previous.swap_remove(i).1,
                None => BasketPricer::new(
                    self.names.clone(),
                    CorrelationModel::Flat(rho),
                    self.copula,
                    &self.config,
                )?,
            };
            if pricer.dates() == dates {
                if pricer.status() == BasketStatus::Uninitialized {
                    pricer.compute(dates)?;
                } else {
                    pricer.ensure_current()?;
                }
            } else {
                pricer.compute(dates)?;
            }
            pricers.push((rho, pricer));
        }
        debug!(
            strikes = registered.len(),
            correlations = pricers.len(),
            dates = dates.len(),
            "base correlation basket computed"
        );
        self.dates = dates.to_vec();
        self.strikes = registered;
        self.pricers = pricers;
        self.computed = true;
        Ok(())
    }

    /// Base correlation used for a registered strike.
    pub fn base_correlation(&self, strike: Real) -> Result<Real> {
        self.strikes
            .iter()
            .find(|(k, _)| same(*k, strike))
            .map(|&(_, rho)| rho)
            .ok_or_else(|| Error::InvalidArgument(format!("strike {strike} was not registered")))
    }

    fn pricer(&self, strike: Real) -> Result<&BasketPricer> {
        let rho = self.base_correlation(strike)?;
        self.pricers
            .iter()
            .find(|(r, _)| r.to_bits() == rho.to_bits())
            .map(|(_, p)| p)
            .ok_or_else(|| Error::Uninitialized("base correlation basket was not computed".to_string()))
    }

    /// Expected loss of the base tranche `[0, strike]` at its own
    /// correlation.
    pub fn base_expected_loss(&self, strike: Real, t: Time) -> Result<Real> {
        if strike == 0.0 {
            return Ok(0.0);
        }
        self.pricer(strike)?.tranche_expected_loss(0.0, strike, t)
    }

    /// Expected loss of `[attachment, detachment]` as the difference of two
    /// base tranches.
    pub fn tranche_expected_loss(&self, attachment: Real, detachment: Real, t: Time) -> Result<Real> {
        ql_core::ensure!(
            0.0 <= attachment && attachment <= detachment && detachment <= 1.0,
            "tranche bounds must satisfy 0 <= attachment <= detachment <= 1"
        );
        Ok(self.base_expected_loss(detachment, t)? - self.base_expected_loss(attachment, t)?)
    }

    /// Expected amortization of `[attachment, detachment]`, decomposed the
    /// same way.
    pub fn tranche_expected_amortization(
        &self,
        attachment: Real,
        detachment: Real,
        t: Time,
    ) -> Result<Real> {
        ql_core::ensure!(
            0.0 <= attachment && attachment <= detachment && detachment <= 1.0,
            "tranche bounds must satisfy 0 <= attachment <= detachment <= 1"
        );
        let base = |k: Real| -> Result<Real> {
            if k == 0.0 {
                return Ok(0.0);
            }
            self.pricer(k)?.tranche_expected_amortization(0.0, k, t)
        };
        Ok(base(detachment)? - base(attachment)?)
    }

    /// Computed, and every inner basket is current.  Strikes all at zero
    /// need no inner basket.
    fn is_current(&self) -> bool {
        self.computed
            && self
                .pricers
                .iter()
                .all(|(_, p)| p.status() == BasketStatus::Current)
    }
}

impl LossDistributionProvider for BaseCorrelationBasket {
    fn ensure_fresh(&self) -> Result<()> {
        if !self.computed {
            return Err(Error::Uninitialized(
                "base correlation basket was not computed".to_string(),
            ));
        }
        if !self.is_current() {
            return Err(Error::Stale(
                "curves changed since the base correlation basket was computed".to_string(),
            ));
        }
        Ok(())
    }

    fn dates(&self) -> Vec<Time> {
        self.dates.clone()
    }

    fn tranche_expected_loss(&self, attachment: Real, detachment: Real, t: Time) -> Result<Real> {
        self.ensure_fresh()?;
        BaseCorrelationBasket::tranche_expected_loss(self, attachment, detachment, t)
    }

    fn tranche_expected_amortization(
        &self,
        attachment: Real,
        detachment: Real,
        t: Time,
    ) -> Result<Real> {
        self.ensure_fresh()?;
        BaseCorrelationBasket::tranche_expected_amortization(self, attachment, detachment, t)
    }

    fn probability_at_least_n_defaults(&self, _n: usize, _t: Time) -> Result<Probability> {
        Err(Error::Configuration(
            "default counts have no single correlation under base correlation".to_string(),
        ))
    }
}

impl CachedLossModel for BaseCorrelationBasket {
    /// Re-derive the strike correlations (they move with the curves when
    /// strikes are in expected-loss units) and refresh the inner baskets.
    fn ensure_current(&mut self) -> Result<()> {
        if self.is_current() {
            return Ok(());
        }
        if !self.computed && self.dates.is_empty() {
            return Err(Error::Uninitialized(
                "base correlation basket was never computed".to_string(),
            ));
        }
        let dates = self.dates.clone();
        let strikes: Vec<Real> = self.strikes.iter().map(|&(k, _)| k).collect();
        self.compute(&dates, &strikes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyKind;
    use crate::name::Name;
    use approx::assert_abs_diff_eq;
    use ql_termstructures::{FixedRecovery, FlatHazardRate};
    use std::sync::Arc;

    fn names(defaulted: bool) -> NameCollection {
        (0..10)
            .map(|i| {
                let name = Name::new(
                    format!("N{i}"),
                    Arc::new(FlatHazardRate::new(0.02)),
                    Arc::new(FixedRecovery::new(0.4)),
                    1.0,
                );
                if defaulted && i == 0 {
                    name.with_default_index(0)
                } else {
                    name
                }
            })
            .collect()
    }

    fn config() -> LossModelConfig {
        LossModelConfig {
            loss_step: 0.01,
            quadrature_order: 24,
            ..LossModelConfig::with_strategy(StrategyKind::Heterogeneous)
        }
    }

    #[test]
    fn strikes_are_rescaled_after_defaults() {
        let curve = BaseCorrelationCurve::new(
            &[0.03, 0.07, 0.1],
            &[0.2, 0.3, 0.4],
            Extrapolation::Flat,
            StrikeMethod::Unscaled,
        )
        .unwrap();
        // one name of ten lost 6 %; 90 % of notional remains
        let k = curve.rescale_strike(0.15, &names(true), 5.0).unwrap();
        assert_abs_diff_eq!(k, 0.1, epsilon = 1e-12);
        assert_eq!(curve.rescale_strike(0.03, &names(true), 5.0).unwrap(), 0.0);
        assert_abs_diff_eq!(curve.correlation(0.05), 0.25, epsilon = 1e-12);
        assert_eq!(curve.correlation(0.5), 0.4);
    }

    #[test]
    fn flat_curve_matches_a_flat_basket() {
        let curve =
            BaseCorrelationCurve::new(&[0.03, 0.1], &[0.3, 0.3], Extrapolation::Flat, StrikeMethod::Unscaled)
                .unwrap();
        let mut basket = BaseCorrelationBasket::new(names(false), curve, CopulaType::Gaussian, &config()).unwrap();
        basket.compute(&[5.0], &[0.03, 0.1]).unwrap();
        assert_eq!(basket.inner_baskets(), 1);
        let mut flat =
            BasketPricer::new(names(false), CorrelationModel::Flat(0.3), CopulaType::Gaussian, &config()).unwrap();
        flat.compute(&[5.0]).unwrap();
        assert_abs_diff_eq!(
            basket.tranche_expected_loss(0.03, 0.1, 5.0).unwrap(),
            flat.tranche_expected_loss(0.03, 0.1, 5.0).unwrap(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn steeper_curve_changes_mezzanine_only_through_strikes() {
        let curve = BaseCorrelationCurve::new(
            &[0.03, 0.07],
            &[0.1, 0.5],
            Extrapolation::Flat,
            StrikeMethod::Unscaled,
        )
        .unwrap();
        let mut basket = BaseCorrelationBasket::new(names(false), curve, CopulaType::Gaussian, &config()).unwrap();
        basket.compute(&[3.0, 5.0], &[0.0, 0.03, 0.07]).unwrap();
        assert_eq!(basket.inner_baskets(), 2);
        let equity = basket.tranche_expected_loss(0.0, 0.03, 5.0).unwrap();
        let mezz = basket.tranche_expected_loss(0.03, 0.07, 5.0).unwrap();
        assert_abs_diff_eq!(
            equity + mezz,
            basket.base_expected_loss(0.07, 5.0).unwrap(),
            epsilon = 1e-14
        );
        assert!(matches!(
            basket.tranche_expected_loss(0.07, 0.1, 5.0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn zero_strikes_need_no_inner_basket() {
        let curve =
            BaseCorrelationCurve::new(&[0.03, 0.1], &[0.2, 0.4], Extrapolation::Flat, StrikeMethod::Unscaled)
                .unwrap();
        let mut basket = BaseCorrelationBasket::new(names(false), curve, CopulaType::Gaussian, &config()).unwrap();
        assert!(matches!(basket.ensure_fresh(), Err(Error::Uninitialized(_))));
        basket.compute(&[5.0], &[0.0]).unwrap();
        assert_eq!(basket.inner_baskets(), 0);
        basket.ensure_fresh().unwrap();
        basket.ensure_current().unwrap();
        assert_eq!(
            LossDistributionProvider::tranche_expected_loss(&basket, 0.0, 0.0, 5.0).unwrap(),
            0.0
        );
    }
}
