//! Binomial mixture for pools of identical names.
//!
//! When every live name has the same default probability, recovery,
//! principal and factor loading, the number of defaults conditional on a
//! factor node is binomial, and the loss is that count times the (snapped)
//! single-name loss.  The grid is the one the recursion would use, so both
//! strategies agree to rounding on a homogeneous pool.
//!
//! Pools that are not homogeneous at every date are handed to an internal
//! [`HeterogeneousStrategy`] for the whole computation.

use super::{
    check_dates, checked_default_probability, snap, HeterogeneousStrategy,
    LossDistributionStrategy, Realized,
};
use crate::config::LossModelConfig;
use crate::copula::FactorCopula;
use crate::correlation::CorrelationModel;
use crate::loss_distribution::{GridDistribution, LossDistribution, LossSlice};
use crate::name::NameCollection;
use ql_core::{errors::Result, Real, Time};
use ql_math::BinomialDistribution;
use tracing::debug;

/// Closed-form strategy for homogeneous pools.
#[derive(Debug, Clone)]
pub struct HomogeneousStrategy {
    loss_step: Real,
    track_amortization: bool,
    track_default_counts: bool,
    fallback: HeterogeneousStrategy,
    delegated: bool,
}

/// Common inputs of the live names at one date.
struct Common {
    default_probability: Real,
    recovery: Real,
    weight: Real,
    loading: Real,
}

/// Spread `counts[k]` onto grid index `k·shift`.
fn place(counts: &[Real], shift: usize) -> Vec<Real> {
    let mut masses = vec![0.0; (counts.len() - 1) * shift + 1];
    for (k, &m) in counts.iter().enumerate() {
        masses[k * shift] += m;
    }
    masses
}

impl HomogeneousStrategy {
    /// Binomial strategy on a grid of `loss_step`.
    pub fn new(loss_step: Real) -> Self {
        Self {
            loss_step,
            track_amortization: false,
            track_default_counts: false,
            fallback: HeterogeneousStrategy::new(loss_step),
            delegated: false,
        }
    }

    /// Settings taken from an engine configuration.
    pub fn from_config(config: &LossModelConfig) -> Self {
        Self {
            loss_step: config.loss_step,
            track_amortization: config.track_amortization,
            track_default_counts: config.track_default_counts,
            fallback: HeterogeneousStrategy::from_config(config),
            delegated: false,
        }
    }

    /// Also build the recovered-notional and default-count distributions.
    pub fn tracking(mut self, amortization: bool, default_counts: bool) -> Self {
        self.track_amortization = amortization;
        self.track_default_counts = default_counts;
        self.fallback = self.fallback.tracking(amortization, default_counts);
        self
    }

    /// `true` if the last computation was handed to the recursion because
    /// the pool was not homogeneous.
    pub fn delegated(&self) -> bool {
        self.delegated
    }

    /// Common inputs at `t`, or `None` if the live names differ.
    fn common(
        names: &NameCollection,
        correlation: &CorrelationModel,
        live: &[usize],
        weights: &[Real],
        t: Time,
    ) -> Result<Option<Common>> {
        let Some(&first) = live.first() else {
            return Ok(Some(Common {
                default_probability: 0.0,
                recovery: 0.0,
                weight: 0.0,
                loading: 0.0,
            }));
        };
        let common = Common {
            default_probability: checked_default_probability(names, first, t)?,
            recovery: names.get(first)?.recovery_rate(t)?,
            weight: weights[first],
            loading: correlation.loading(first)?,
        };
        for &i in &live[1..] {
            let same = checked_default_probability(names, i, t)?.to_bits()
                == common.default_probability.to_bits()
                && names.get(i)?.recovery_rate(t)?.to_bits() == common.recovery.to_bits()
                && weights[i].to_bits() == common.weight.to_bits()
                && correlation.loading(i)?.to_bits() == common.loading.to_bits();
            if !same {
                return Ok(None);
            }
        }
        Ok(Some(common))
    }

    fn slice(
        &self,
        copula: &FactorCopula,
        t: Time,
        n: usize,
        common: &Common,
        realized: &Realized,
    ) -> Result<LossSlice> {
        let threshold = copula.threshold(common.default_probability, common.loading)?;
        let mut counts = vec![0.0; n + 1];
        if n == 0 {
            counts[0] = 1.0;
        } else {
            for node in copula.nodes() {
                let q = copula.conditional_default_probability(threshold, common.loading, node);
                let row = BinomialDistribution::new(q, n as u64)?.pmf_row();
                for (c, m) in counts.iter_mut().zip(row) {
                    *c += node.weight * m;
                }
            }
        }
        let loss_steps = snap(common.weight * (1.0 - common.recovery), self.loss_step);
        let mut slice = LossSlice::new(
            t,
            GridDistribution::new(realized.loss, self.loss_step, place(&counts, loss_steps)),
        );
        if self.track_amortization {
            let recovery_steps = snap(common.weight * common.recovery, self.loss_step);
            slice = slice.with_amortization(GridDistribution::new(
                realized.recovered,
                self.loss_step,
                place(&counts, recovery_steps),
            ));
        }
        if self.track_default_counts {
            slice = slice.with_default_counts(GridDistribution::new(
                realized.defaults as Real,
                1.0,
                counts,
            ));
        }
        Ok(slice)
    }
}

impl LossDistributionStrategy for HomogeneousStrategy {
    fn name(&self) -> &'static str {
        if self.delegated {
            "heterogeneous"
        } else {
            "homogeneous"
        }
    }

    fn compute(
        &mut self,
        names: &NameCollection,
        correlation: &CorrelationModel,
        copula: &FactorCopula,
        dates: &[Time],
    ) -> Result<LossDistribution> {
        check_dates(dates)?;
        ql_core::config_error!(
            self.loss_step > 0.0,
            "loss step must be positive, got {}",
            self.loss_step
        );
        self.delegated = false;
        let live = names.live_indices();
        let weights = names.weights();
        let mut commons = Vec::with_capacity(dates.len());
        for &t in dates {
            match Self::common(names, correlation, &live, &weights, t)? {
                Some(common) => commons.push(common),
                None => {
                    debug!(t, "pool is not homogeneous, using the loss recursion");
                    self.delegated = true;
                    return self.fallback.compute(names, correlation, copula, dates);
                }
            }
        }
        let realized = Realized::of(names)?;
        debug!(
            live = live.len(),
            nodes = copula.nodes().len(),
            dates = dates.len(),
            "homogeneous binomial mixture"
        );
        let slices = dates
            .iter()
            .zip(&commons)
            .map(|(&t, common)| self.slice(copula, t, live.len(), common, &realized))
            .collect::<Result<Vec<_>>>()?;
        Ok(LossDistribution::new(slices))
    }

    fn refit(
        &mut self,
        names: &NameCollection,
        correlation: &CorrelationModel,
        copula: &FactorCopula,
        dates: &[Time],
        min_index: usize,
    ) -> Result<LossDistribution> {
        if self.delegated {
            // a bump may have made the pool homogeneous again
            let live = names.live_indices();
            let weights = names.weights();
            let mut still_mixed = false;
            for &t in dates {
                if Self::common(names, correlation, &live, &weights, t)?.is_none() {
                    still_mixed = true;
                    break;
                }
            }
            if still_mixed {
                return self.fallback.refit(names, correlation, copula, dates, min_index);
            }
        }
        self.compute(names, correlation, copula, dates)
    }

    fn reset(&mut self) {
        self.delegated = false;
        self.fallback.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;
    use approx::assert_abs_diff_eq;
    use ql_termstructures::{FixedRecovery, FlatHazardRate};
    use std::sync::Arc;

    fn identical(n: usize) -> NameCollection {
        (0..n)
            .map(|i| {
                Name::new(
                    format!("N{i}"),
                    Arc::new(FlatHazardRate::from_survival_probability(0.95, 1.0).unwrap()),
                    Arc::new(FixedRecovery::new(0.4)),
                    0.2,
                )
            })
            .collect()
    }

    #[test]
    fn placement_spreads_counts_over_the_grid() {
        assert_eq!(place(&[0.5, 0.3, 0.2], 3), vec![0.5, 0.0, 0.0, 0.3, 0.0, 0.0, 0.2]);
        assert_eq!(place(&[0.5, 0.5], 0), vec![1.0]);
    }

    #[test]
    fn matches_the_recursion_on_identical_names() {
        let names = identical(5);
        let copula = FactorCopula::gaussian(48).unwrap();
        let corr = CorrelationModel::Flat(0.3);
        let dates = [0.5, 1.0];
        let mut homogeneous = HomogeneousStrategy::new(0.01).tracking(true, true);
        let closed = homogeneous.compute(&names, &corr, &copula, &dates).unwrap();
        assert!(!homogeneous.delegated());
        let recursion = HeterogeneousStrategy::new(0.01)
            .tracking(true, true)
            .compute(&names, &corr, &copula, &dates)
            .unwrap();
        for (a, b) in closed.slices().iter().zip(recursion.slices()) {
            assert_eq!(a.loss().masses().len(), b.loss().masses().len());
            for (x, y) in a.loss().masses().iter().zip(b.loss().masses()) {
                assert_abs_diff_eq!(*x, *y, epsilon = 1e-12);
            }
            assert_abs_diff_eq!(
                a.tranche_expected_amortization(0.0, 0.3).unwrap(),
                b.tranche_expected_amortization(0.0, 0.3).unwrap(),
                epsilon = 1e-12
            );
            assert_abs_diff_eq!(
                a.probability_at_least_n_defaults(2).unwrap(),
                b.probability_at_least_n_defaults(2).unwrap(),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn mixed_pools_use_the_recursion() {
        let mut names = identical(4);
        let odd = Name::new(
            "N3",
            Arc::new(FlatHazardRate::new(0.08)),
            Arc::new(FixedRecovery::new(0.4)),
            0.2,
        );
        names.replace(3, odd).unwrap();
        let copula = FactorCopula::gaussian(24).unwrap();
        let corr = CorrelationModel::Flat(0.2);
        let mut homogeneous = HomogeneousStrategy::new(0.01);
        let dist = homogeneous.compute(&names, &corr, &copula, &[1.0]).unwrap();
        assert!(homogeneous.delegated());
        assert_eq!(homogeneous.name(), "heterogeneous");
        let recursion = HeterogeneousStrategy::new(0.01)
            .compute(&names, &corr, &copula, &[1.0])
            .unwrap();
        assert_eq!(dist, recursion);
        homogeneous.reset();
        assert!(!homogeneous.delegated());
        assert_eq!(homogeneous.name(), "homogeneous");
    }

    #[test]
    fn empty_pool_is_a_point_mass_at_zero() {
        let copula = FactorCopula::gaussian(8).unwrap();
        let dist = HomogeneousStrategy::new(0.01)
            .compute(&NameCollection::default(), &CorrelationModel::Flat(0.3), &copula, &[1.0, 2.0])
            .unwrap();
        for slice in dist.slices() {
            assert_eq!(slice.loss().masses(), &[1.0]);
            assert_eq!(slice.expected_loss(), 0.0);
        }
    }
}
