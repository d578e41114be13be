//! Portfolio loss distributions.
//!
//! A [`LossDistribution`] holds one [`LossSlice`] per evaluation date.  Each
//! slice carries the distribution of cumulative pool loss on an evenly spaced
//! grid (as a fraction of total basket notional), optionally the
//! distributions of recovered notional and of the number of defaults, and,
//! for simulated distributions, the realized losses themselves.

use ql_core::{errors::Result, Error, Probability, Real, Time};
use ql_math::OrderStatistics;

/// Tolerance used to match requested dates against computed ones.
pub const DATE_TOLERANCE: Time = 1.0e-10;

/// A distribution supported on the grid `offset + k·step`, `k = 0, 1, …`.
#[derive(Debug, Clone, PartialEq)]
pub struct GridDistribution {
    offset: Real,
    step: Real,
    masses: Vec<Probability>,
}

impl GridDistribution {
    /// Distribution with the given grid and masses.
    pub fn new(offset: Real, step: Real, masses: Vec<Probability>) -> Self {
        Self {
            offset,
            step,
            masses,
        }
    }

    /// All mass at `value`.
    pub fn point_mass(value: Real, step: Real) -> Self {
        Self::new(value, step, vec![1.0])
    }

    /// Empirical distribution of `samples`, each snapped to the nearest grid
    /// point above `offset`.
    pub fn from_samples(samples: &[Real], offset: Real, step: Real) -> Self {
        let mut masses = vec![0.0];
        if samples.is_empty() {
            return Self::new(offset, step, masses);
        }
        let unit = 1.0 / samples.len() as Real;
        for &x in samples {
            let k = ((x - offset) / step + 0.5).floor().max(0.0) as usize;
            if k >= masses.len() {
                masses.resize(k + 1, 0.0);
            }
            masses[k] += unit;
        }
        Self::new(offset, step, masses)
    }

    /// Value of the first grid point.
    pub fn offset(&self) -> Real {
        self.offset
    }

    /// Grid spacing.
    pub fn step(&self) -> Real {
        self.step
    }

    /// Probability masses, one per grid point.
    pub fn masses(&self) -> &[Probability] {
        &self.masses
    }

    /// Value of grid point `k`.
    pub fn level(&self, k: usize) -> Real {
        self.offset + k as Real * self.step
    }

    /// `(value, mass)` pairs in increasing value order.
    pub fn iter(&self) -> impl Iterator<Item = (Real, Probability)> + '_ {
        self.masses
            .iter()
            .enumerate()
            .map(|(k, &m)| (self.level(k), m))
    }

    /// Sum of the masses (one up to rounding).
    pub fn total_mass(&self) -> Probability {
        self.masses.iter().sum()
    }

    /// Expected value.
    pub fn mean(&self) -> Real {
        self.iter().map(|(x, m)| x * m).sum()
    }

    /// Expected value of the layer `clip(X − lower, 0, upper − lower)`.
    pub fn expected_layer(&self, lower: Real, upper: Real) -> Real {
        let width = upper - lower;
        self.iter()
            .map(|(x, m)| m * (x - lower).clamp(0.0, width))
            .sum()
    }

    /// `P(X > x)`.
    pub fn probability_above(&self, x: Real) -> Probability {
        self.iter().filter(|&(v, _)| v > x).map(|(_, m)| m).sum()
    }

    /// `P(X ≥ x)`, treating grid points within a millionth of a step of `x`
    /// as equal to it.
    pub fn probability_at_least(&self, x: Real) -> Probability {
        let cut = x - 1.0e-6 * self.step;
        self.iter().filter(|&(v, _)| v >= cut).map(|(_, m)| m).sum()
    }

    /// Smallest grid value whose cumulative probability reaches `q`.
    pub fn percentile(&self, q: Probability) -> Real {
        let q = q.clamp(0.0, 1.0);
        let mut cumulative = 0.0;
        for (k, &m) in self.masses.iter().enumerate() {
            cumulative += m;
            if cumulative >= q - 1.0e-12 {
                return self.level(k);
            }
        }
        self.level(self.masses.len() - 1)
    }

    /// Expected value beyond the `q`-percentile (expected shortfall).
    pub fn expected_shortfall(&self, q: Probability) -> Real {
        let q = q.clamp(0.0, 1.0);
        let var = self.percentile(q);
        if q >= 1.0 {
            return var;
        }
        let mut below = 0.0;
        let mut tail = 0.0;
        for (x, m) in self.iter() {
            if x > var {
                tail += m * x;
            } else {
                below += m;
            }
        }
        (tail + var * (below - q)) / (1.0 - q)
    }
}

/// The loss distribution at one evaluation date.
#[derive(Debug, Clone, PartialEq)]
pub struct LossSlice {
    date: Time,
    loss: GridDistribution,
    amortization: Option<GridDistribution>,
    default_counts: Option<GridDistribution>,
    samples: Option<OrderStatistics>,
}

impl LossSlice {
    /// Slice with a loss distribution only.
    pub fn new(date: Time, loss: GridDistribution) -> Self {
        Self {
            date,
            loss,
            amortization: None,
            default_counts: None,
            samples: None,
        }
    }

    /// Attach the distribution of recovered notional.
    pub fn with_amortization(mut self, amortization: GridDistribution) -> Self {
        self.amortization = Some(amortization);
        self
    }

    /// Attach the distribution of the number of defaults.
    pub fn with_default_counts(mut self, counts: GridDistribution) -> Self {
        self.default_counts = Some(counts);
        self
    }

    /// Attach realized simulated losses.
    pub fn with_samples(mut self, samples: OrderStatistics) -> Self {
        self.samples = Some(samples);
        self
    }

    /// Evaluation date.
    pub fn date(&self) -> Time {
        self.date
    }

    /// Distribution of cumulative loss.
    pub fn loss(&self) -> &GridDistribution {
        &self.loss
    }

    /// Distribution of recovered notional, if tracked.
    pub fn amortization(&self) -> Option<&GridDistribution> {
        self.amortization.as_ref()
    }

    /// Distribution of the number of defaults, if tracked.
    pub fn default_counts(&self) -> Option<&GridDistribution> {
        self.default_counts.as_ref()
    }

    /// Realized simulated losses, if kept.
    pub fn samples(&self) -> Option<&OrderStatistics> {
        self.samples.as_ref()
    }

    /// Expected pool loss.
    pub fn expected_loss(&self) -> Real {
        match &self.samples {
            Some(s) => s.mean_of(|x| x).unwrap_or(0.0),
            None => self.loss.mean(),
        }
    }

    /// Expected loss absorbed by the tranche `[attachment, detachment]`.
    pub fn tranche_expected_loss(&self, attachment: Real, detachment: Real) -> Real {
        let width = detachment - attachment;
        match &self.samples {
            Some(s) => s
                .mean_of(|x| (x - attachment).clamp(0.0, width))
                .unwrap_or(0.0),
            None => self.loss.expected_layer(attachment, detachment),
        }
    }

    /// Standard error of the simulated tranche expected loss; `None` for
    /// analytic slices.
    pub fn tranche_loss_standard_error(&self, attachment: Real, detachment: Real) -> Option<Real> {
        let s = self.samples.as_ref()?;
        let n = s.len();
        if n < 2 {
            return None;
        }
        let width = detachment - attachment;
        let mean = s.mean_of(|x| (x - attachment).clamp(0.0, width))?;
        let second = s.mean_of(|x| (x - attachment).clamp(0.0, width).powi(2))?;
        let variance = (second - mean * mean).max(0.0) * n as Real / (n - 1) as Real;
        Some((variance / n as Real).sqrt())
    }

    /// Expected amortization of the tranche `[attachment, detachment]`:
    /// recoveries write the capital structure down from the top.
    pub fn tranche_expected_amortization(&self, attachment: Real, detachment: Real) -> Result<Real> {
        let amortization = self.amortization.as_ref().ok_or_else(|| {
            Error::Configuration("amortization distribution was not tracked".to_string())
        })?;
        Ok(amortization.expected_layer(1.0 - detachment, 1.0 - attachment))
    }

    /// `P(N ≥ n)` for the number of defaults `N`, realized defaults included.
    pub fn probability_at_least_n_defaults(&self, n: usize) -> Result<Probability> {
        let counts = self.default_counts.as_ref().ok_or_else(|| {
            Error::Configuration("default-count distribution was not tracked".to_string())
        })?;
        Ok(counts.probability_at_least(n as Real))
    }

    /// `P(L > x)`.
    pub fn probability_over_loss(&self, x: Real) -> Probability {
        match &self.samples {
            Some(s) => s.fraction_above(x),
            None => self.loss.probability_above(x),
        }
    }

    /// Loss percentile (value at risk) at level `q`.
    pub fn percentile(&self, q: Probability) -> Real {
        match self.samples.as_ref().and_then(|s| s.quantile(q)) {
            Some(v) => v,
            None => self.loss.percentile(q),
        }
    }

    /// Expected shortfall at level `q`.
    pub fn expected_shortfall(&self, q: Probability) -> Real {
        match self.samples.as_ref().and_then(|s| s.tail_mean(q)) {
            Some(v) => v,
            None => self.loss.expected_shortfall(q),
        }
    }
}

/// Loss distributions for a set of evaluation dates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LossDistribution {
    slices: Vec<LossSlice>,
}

fn check_tranche(attachment: Real, detachment: Real) -> Result<()> {
    ql_core::ensure!(
        (0.0..=1.0).contains(&attachment)
            && (0.0..=1.0).contains(&detachment)
            && attachment <= detachment,
        "tranche bounds must satisfy 0 <= attachment <= detachment <= 1, got [{attachment}, {detachment}]"
    );
    Ok(())
}

impl LossDistribution {
    /// Collect slices; they must be in increasing date order.
    pub fn new(slices: Vec<LossSlice>) -> Self {
        Self { slices }
    }

    /// The slices in date order.
    pub fn slices(&self) -> &[LossSlice] {
        &self.slices
    }

    /// Evaluation dates.
    pub fn dates(&self) -> Vec<Time> {
        self.slices.iter().map(LossSlice::date).collect()
    }

    /// Position of `date` among the computed dates.
    pub fn date_index(&self, date: Time) -> Result<usize> {
        let i = self
            .slices
            .partition_point(|s| s.date < date - DATE_TOLERANCE);
        match self.slices.get(i) {
            Some(s) if (s.date - date).abs() <= DATE_TOLERANCE => Ok(i),
            _ => Err(Error::InvalidArgument(format!(
                "no loss distribution computed for t = {date}"
            ))),
        }
    }

    /// The slice at `date`.
    pub fn slice(&self, date: Time) -> Result<&LossSlice> {
        Ok(&self.slices[self.date_index(date)?])
    }

    /// Expected pool loss at `date`.
    pub fn expected_loss(&self, date: Time) -> Result<Real> {
        Ok(self.slice(date)?.expected_loss())
    }

    /// Expected tranche loss at `date`.  `tranche_expected_loss(0, 1, t)` is
    /// the expected pool loss.
    pub fn tranche_expected_loss(&self, attachment: Real, detachment: Real, date: Time) -> Result<Real> {
        check_tranche(attachment, detachment)?;
        Ok(self.slice(date)?.tranche_expected_loss(attachment, detachment))
    }

    /// Expected tranche amortization at `date`.
    pub fn tranche_expected_amortization(
        &self,
        attachment: Real,
        detachment: Real,
        date: Time,
    ) -> Result<Real> {
        check_tranche(attachment, detachment)?;
        self.slice(date)?
            .tranche_expected_amortization(attachment, detachment)
    }

    /// `P(N(date) ≥ n)`.
    pub fn probability_at_least_n_defaults(&self, n: usize, date: Time) -> Result<Probability> {
        self.slice(date)?.probability_at_least_n_defaults(n)
    }

    /// `P(L(date) > x)`.
    pub fn probability_over_loss(&self, x: Real, date: Time) -> Result<Probability> {
        Ok(self.slice(date)?.probability_over_loss(x))
    }

    /// Loss percentile at `date`.
    pub fn percentile(&self, q: Probability, date: Time) -> Result<Real> {
        Ok(self.slice(date)?.percentile(q))
    }

    /// Expected shortfall at `date`.
    pub fn expected_shortfall(&self, q: Probability, date: Time) -> Result<Real> {
        Ok(self.slice(date)?.expected_shortfall(q))
    }

    /// Largest deviation of any slice's total mass from one.
    pub fn max_mass_error(&self) -> Real {
        self.slices
            .iter()
            .map(|s| (s.loss.total_mass() - 1.0).abs())
            .fold(0.0, Real::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn two_point() -> GridDistribution {
        // loss 0 w.p. 0.7, 0.1 w.p. 0.2, 0.3 w.p. 0.1
        GridDistribution::new(0.0, 0.1, vec![0.7, 0.2, 0.0, 0.1])
    }

    #[test]
    fn layer_expectations_add_up() {
        let d = two_point();
        assert_abs_diff_eq!(d.mean(), 0.05, epsilon = 1e-15);
        let parts = d.expected_layer(0.0, 0.05) + d.expected_layer(0.05, 0.2) + d.expected_layer(0.2, 1.0);
        assert_abs_diff_eq!(parts, d.mean(), epsilon = 1e-15);
        assert_abs_diff_eq!(d.expected_layer(0.0, 1.0), d.mean(), epsilon = 1e-15);
    }

    #[test]
    fn percentiles_and_shortfall() {
        let d = two_point();
        assert_eq!(d.percentile(0.5), 0.0);
        assert_abs_diff_eq!(d.percentile(0.9), 0.1, epsilon = 1e-15);
        assert_abs_diff_eq!(d.percentile(0.95), 0.3, epsilon = 1e-15);
        // tail beyond the 80% level: 0.1 w.p. 0.1 (of 0.2) and 0.3 w.p. 0.1
        assert_abs_diff_eq!(d.expected_shortfall(0.8), 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(d.probability_above(0.05), 0.3, epsilon = 1e-15);
    }

    #[test]
    fn samples_snap_to_grid() {
        let d = GridDistribution::from_samples(&[0.0, 0.0, 0.26, 0.34], 0.0, 0.1);
        assert_eq!(d.masses(), &[0.5, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn slice_lookup_and_tranche_checks() {
        let dist = LossDistribution::new(vec![
            LossSlice::new(1.0, GridDistribution::point_mass(0.0, 0.1)),
            LossSlice::new(2.0, two_point()),
        ]);
        assert_eq!(dist.date_index(2.0 + 1e-12).unwrap(), 1);
        assert!(dist.slice(1.5).is_err());
        assert!(dist.tranche_expected_loss(0.3, 0.1, 2.0).is_err());
        assert_abs_diff_eq!(dist.tranche_expected_loss(0.0, 1.0, 2.0).unwrap(), 0.05, epsilon = 1e-15);
        assert!(matches!(
            dist.probability_at_least_n_defaults(1, 2.0),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn sampled_slices_use_the_samples() {
        let samples = OrderStatistics::from_unsorted(vec![0.0, 0.1, 0.2, 0.3]);
        let grid = GridDistribution::from_samples(samples.as_slice(), 0.0, 0.1);
        let slice = LossSlice::new(1.0, grid).with_samples(samples);
        assert_abs_diff_eq!(slice.expected_loss(), 0.15, epsilon = 1e-15);
        assert_abs_diff_eq!(slice.tranche_expected_loss(0.1, 0.2), 0.05, epsilon = 1e-15);
        assert!(slice.tranche_loss_standard_error(0.0, 1.0).unwrap() > 0.0);
        assert_abs_diff_eq!(slice.percentile(0.5), 0.1, epsilon = 1e-15);
    }
}
