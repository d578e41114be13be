//! `DefaultProbabilityTermStructure`: credit default-probability curves.
//!
//! Provides the `DefaultProbabilityTermStructure` trait plus:
//! * `FlatHazardRate`: constant hazard-rate curve
//! * `PiecewiseHazardRateCurve`: piecewise-constant hazard rates fitted to
//!   tenor quotes, bumpable and re-fittable in place
//!
//! Curves are shared between many consumers behind `Arc`, so quote bumps go
//! through interior mutability and every completed re-fit advances the
//! curve's [`Version`].

use crate::term_structure::TermStructure;
use ql_core::{
    errors::Result, fail, Error, Probability, Real, Time, Version, VersionCounter, Versioned,
};
use ql_math::solvers1d::solve_increasing;
use std::sync::{PoisonError, RwLock};

/// Hazard rate type alias.
pub type HazardRate = Real;

/// Horizon (in years) beyond which the generic default-time inversion gives
/// up and reports "never defaults".
pub const DEFAULT_TIME_HORIZON: Time = 500.0;

/// A quote bump applied to a calibrated survival curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteBump {
    /// Size of the bump; a fraction of the quote when `relative` is set.
    pub amount: Real,
    /// Tenor to bump, or `None` for a parallel bump of every tenor.
    pub tenor: Option<usize>,
    /// Multiply the quote by `1 + amount` instead of adding `amount`.
    pub relative: bool,
    /// Re-fit the curve immediately after bumping.
    pub refit: bool,
}

impl QuoteBump {
    /// Parallel absolute bump, re-fitted immediately.
    pub fn absolute(amount: Real) -> Self {
        Self {
            amount,
            tenor: None,
            relative: false,
            refit: true,
        }
    }

    /// Parallel relative bump, re-fitted immediately.
    pub fn relative(amount: Real) -> Self {
        Self {
            relative: true,
            ..Self::absolute(amount)
        }
    }

    /// Restrict the bump to a single tenor.
    pub fn at_tenor(mut self, tenor: usize) -> Self {
        self.tenor = Some(tenor);
        self
    }

    /// Leave the curve un-fitted after the bump; call
    /// [`DefaultProbabilityTermStructure::refit`] later.
    pub fn deferred(mut self) -> Self {
        self.refit = false;
        self
    }

    fn apply(&self, quote: Real) -> Real {
        if self.relative {
            quote * (1.0 + self.amount)
        } else {
            quote + self.amount
        }
    }
}

/// A default-probability term structure parameterised by time.
///
/// Implementors provide [`survival_probability`]; everything else has a
/// default.  Curves without market quotes reject bumps.
///
/// [`survival_probability`]: DefaultProbabilityTermStructure::survival_probability
pub trait DefaultProbabilityTermStructure: TermStructure + Versioned {
    /// Survival probability `S(t) = P(τ > t)`.
    fn survival_probability(&self, t: Time) -> Probability;

    /// Default (cumulative) probability `F(t) = 1 − S(t)`.
    fn default_probability(&self, t: Time) -> Probability {
        1.0 - self.survival_probability(t)
    }

    /// Probability of default in `(t1, t2]`.
    fn default_probability_between(&self, t1: Time, t2: Time) -> Probability {
        self.survival_probability(t1) - self.survival_probability(t2)
    }

    /// Hazard rate `h(t)`.
    ///
    /// Default: `-d ln S(t) / dt` by central differences.
    fn hazard_rate(&self, t: Time) -> HazardRate {
        let dt = 1.0e-4_f64;
        let t1 = (t - dt / 2.0).max(0.0);
        let t2 = t + dt / 2.0;
        let s1 = self.survival_probability(t1);
        let s2 = self.survival_probability(t2);
        if s2 <= 0.0 {
            return HazardRate::INFINITY;
        }
        (s1.ln() - s2.ln()) / (t2 - t1)
    }

    /// Default time implied by the uniform deviate `u`: the earliest `t`
    /// with `F(t) ≥ u`, or `+∞` if the name never defaults that early.
    fn default_time(&self, u: Probability) -> Time {
        if u <= 0.0 {
            return 0.0;
        }
        if self.default_probability(DEFAULT_TIME_HORIZON) < u {
            return Time::INFINITY;
        }
        solve_increasing(
            |t| self.default_probability(t) - u,
            0.0,
            1.0,
            Some(0.0),
            1.0e-12,
        )
        .unwrap_or(Time::INFINITY)
    }

    /// Pillar times of the calibration, empty for analytic curves.
    fn tenors(&self) -> Vec<Time> {
        Vec::new()
    }

    /// Current market quotes, one per tenor.
    fn quotes(&self) -> Vec<Real> {
        Vec::new()
    }

    /// Bump the curve's market quotes.
    fn bump_quote(&self, bump: &QuoteBump) -> Result<()> {
        fail!("{self:?} has no market quotes to bump (requested {bump:?})")
    }

    /// Replace the market quotes wholesale, e.g. to undo a bump exactly.
    fn set_quotes(&self, quotes: &[Real], refit: bool) -> Result<()> {
        fail!(
            "{self:?} has no market quotes to set ({} given, refit = {refit})",
            quotes.len()
        )
    }

    /// Re-fit the curve from tenor `from_tenor` onwards.  A no-op for
    /// analytic curves.
    fn refit(&self, _from_tenor: usize) -> Result<()> {
        Ok(())
    }
}

// ── FlatHazardRate ────────────────────────────────────────────────────────────

/// A constant hazard-rate default-probability term structure.
///
/// `S(t) = exp(-h·t)` where `h` is a constant hazard rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatHazardRate {
    hazard_rate: HazardRate,
}

impl FlatHazardRate {
    /// Create a flat hazard-rate curve.
    pub fn new(hazard_rate: HazardRate) -> Self {
        Self { hazard_rate }
    }

    /// The flat curve matching survival probability `survival` at time `t`.
    pub fn from_survival_probability(survival: Probability, t: Time) -> Result<Self> {
        ql_core::ensure!(t > 0.0, "calibration time must be positive, got {t}");
        ql_core::domain_error!(
            (0.0..=1.0).contains(&survival),
            "survival probability must be in [0, 1], got {survival}"
        );
        Ok(Self::new(-survival.ln() / t))
    }

    /// The constant hazard rate.
    pub fn hazard_rate_value(&self) -> HazardRate {
        self.hazard_rate
    }
}

impl TermStructure for FlatHazardRate {}

impl Versioned for FlatHazardRate {
    fn version(&self) -> Version {
        Version::INITIAL
    }
}

impl DefaultProbabilityTermStructure for FlatHazardRate {
    fn survival_probability(&self, t: Time) -> Probability {
        if t <= 0.0 {
            return 1.0;
        }
        (-self.hazard_rate * t).exp()
    }

    fn hazard_rate(&self, _t: Time) -> HazardRate {
        self.hazard_rate
    }

    fn default_time(&self, u: Probability) -> Time {
        if u <= 0.0 {
            return 0.0;
        }
        if self.hazard_rate <= 0.0 {
            return Time::INFINITY;
        }
        -(-u).ln_1p() / self.hazard_rate
    }
}

// ── PiecewiseHazardRateCurve ──────────────────────────────────────────────────

/// What the quotes of a [`PiecewiseHazardRateCurve`] represent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HazardQuote {
    /// Each quote is the hazard rate on the segment ending at its tenor.
    HazardRate,
    /// Each quote is a running CDS spread to its tenor; the cumulative hazard
    /// is fitted with the credit triangle `H(T) = s·T / (1 − R)`.
    ParSpread {
        /// Recovery rate assumed by the quotes.
        recovery: Real,
    },
}

#[derive(Debug, Clone)]
struct Fit {
    quotes: Vec<Real>,
    hazards: Vec<HazardRate>,
    /// Cumulative hazard at each tenor.
    cumulative: Vec<Real>,
    /// First tenor whose quote changed since the last fit.
    pending: Option<usize>,
}

/// Piecewise-constant hazard-rate curve fitted to quotes at a set of tenors.
///
/// The last segment's hazard rate is extrapolated flat.  Hazard rates may be
/// `+∞`, which describes a name certain to default within that segment.
#[derive(Debug)]
pub struct PiecewiseHazardRateCurve {
    tenors: Vec<Time>,
    kind: HazardQuote,
    fit: RwLock<Fit>,
    version: VersionCounter,
}

impl PiecewiseHazardRateCurve {
    /// Build and fit a curve from tenors and quotes.
    ///
    /// # Errors
    /// Fails if the tenors are not positive and strictly increasing, the
    /// lengths differ, or the quotes imply a negative hazard rate.
    pub fn new(tenors: Vec<Time>, quotes: Vec<Real>, kind: HazardQuote) -> Result<Self> {
        ql_core::ensure!(!tenors.is_empty(), "at least one tenor is required");
        ql_core::ensure!(
            tenors.len() == quotes.len(),
            "tenors and quotes must have the same length ({} vs {})",
            tenors.len(),
            quotes.len()
        );
        ql_core::ensure!(
            tenors[0] > 0.0 && tenors.windows(2).all(|w| w[1] > w[0]),
            "tenors must be positive and strictly increasing"
        );
        if let HazardQuote::ParSpread { recovery } = kind {
            ql_core::domain_error!(
                (0.0..1.0).contains(&recovery),
                "quote recovery must be in [0, 1), got {recovery}"
            );
        }
        let n = tenors.len();
        let mut fit = Fit {
            quotes,
            hazards: vec![0.0; n],
            cumulative: vec![0.0; n],
            pending: None,
        };
        Self::fit_from(&tenors, kind, &mut fit, 0)?;
        Ok(Self {
            tenors,
            kind,
            fit: RwLock::new(fit),
            version: VersionCounter::new(),
        })
    }

    /// A curve quoted by its segment hazard rates.
    pub fn from_hazard_rates(tenors: Vec<Time>, hazards: Vec<HazardRate>) -> Result<Self> {
        Self::new(tenors, hazards, HazardQuote::HazardRate)
    }

    /// A curve that reproduces the given survival probabilities at their
    /// times.  A zero survival probability yields an infinite hazard rate.
    pub fn from_survival_probabilities(points: &[(Time, Probability)]) -> Result<Self> {
        let mut previous = 1.0;
        let mut last_t = 0.0;
        let mut hazards = Vec::with_capacity(points.len());
        for &(t, s) in points {
            ql_core::domain_error!(
                (0.0..=previous).contains(&s),
                "survival probabilities must lie in [0, 1] and be non-increasing, got {s} after {previous}"
            );
            let h = if s == 0.0 {
                HazardRate::INFINITY
            } else {
                (previous / s).ln() / (t - last_t)
            };
            hazards.push(h);
            previous = s;
            last_t = t;
        }
        Self::from_hazard_rates(points.iter().map(|p| p.0).collect(), hazards)
    }

    /// A flat curve with a single tenor.
    pub fn flat(hazard_rate: HazardRate) -> Result<Self> {
        Self::from_hazard_rates(vec![1.0], vec![hazard_rate])
    }

    /// What the quotes represent.
    pub fn quote_kind(&self) -> HazardQuote {
        self.kind
    }

    /// Fitted segment hazard rates.
    pub fn hazard_rates(&self) -> Vec<HazardRate> {
        self.read().hazards.clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Fit> {
        self.fit.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Fit> {
        self.fit.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn fit_from(tenors: &[Time], kind: HazardQuote, fit: &mut Fit, from: usize) -> Result<()> {
        let (mut t_prev, mut h_prev) = if from == 0 {
            (0.0, 0.0)
        } else {
            (tenors[from - 1], fit.cumulative[from - 1])
        };
        for i in from..tenors.len() {
            let t = tenors[i];
            let q = fit.quotes[i];
            let hazard = match kind {
                HazardQuote::HazardRate => q,
                HazardQuote::ParSpread { recovery } => {
                    let target = q * t / (1.0 - recovery);
                    (target - h_prev) / (t - t_prev)
                }
            };
            if hazard.is_nan() || hazard < 0.0 {
                return Err(Error::Domain(format!(
                    "quote {q} at tenor {i} (t = {t}) implies hazard rate {hazard}"
                )));
            }
            let cumulative = h_prev + hazard * (t - t_prev);
            fit.hazards[i] = hazard;
            fit.cumulative[i] = cumulative;
            t_prev = t;
            h_prev = cumulative;
        }
        fit.pending = None;
        Ok(())
    }

    /// Segment containing `t`: the first tenor at or after `t`, or the last
    /// segment when extrapolating.
    fn segment(&self, t: Time) -> usize {
        self.tenors
            .partition_point(|&ti| ti < t)
            .min(self.tenors.len() - 1)
    }

    fn segment_start(&self, fit: &Fit, i: usize) -> (Time, Real) {
        if i == 0 {
            (0.0, 0.0)
        } else {
            (self.tenors[i - 1], fit.cumulative[i - 1])
        }
    }

    fn cumulative_hazard(&self, t: Time) -> Real {
        let fit = self.read();
        let i = self.segment(t);
        let (t0, h0) = self.segment_start(&fit, i);
        let hazard = fit.hazards[i];
        if hazard == 0.0 {
            return h0;
        }
        // t > t0 here, so an infinite hazard never meets a zero length
        h0 + hazard * (t - t0)
    }
}

impl TermStructure for PiecewiseHazardRateCurve {
    fn max_time(&self) -> Time {
        self.tenors[self.tenors.len() - 1]
    }
}

impl Versioned for PiecewiseHazardRateCurve {
    fn version(&self) -> Version {
        self.version.current()
    }
}

impl DefaultProbabilityTermStructure for PiecewiseHazardRateCurve {
    fn survival_probability(&self, t: Time) -> Probability {
        if t <= 0.0 {
            return 1.0;
        }
        (-self.cumulative_hazard(t)).exp()
    }

    fn hazard_rate(&self, t: Time) -> HazardRate {
        self.read().hazards[self.segment(t.max(0.0))]
    }

    fn default_time(&self, u: Probability) -> Time {
        if u <= 0.0 {
            return 0.0;
        }
        let target = -(-u).ln_1p();
        let fit = self.read();
        let i = fit
            .cumulative
            .partition_point(|&h| h < target)
            .min(self.tenors.len() - 1);
        let (t0, h0) = self.segment_start(&fit, i);
        let hazard = fit.hazards[i];
        if hazard.is_infinite() {
            return t0;
        }
        if hazard <= 0.0 {
            // only reachable when extrapolating a zero hazard
            return Time::INFINITY;
        }
        t0 + (target - h0) / hazard
    }

    fn tenors(&self) -> Vec<Time> {
        self.tenors.clone()
    }

    fn quotes(&self) -> Vec<Real> {
        self.read().quotes.clone()
    }

    fn bump_quote(&self, bump: &QuoteBump) -> Result<()> {
        let from = match bump.tenor {
            Some(i) if i >= self.tenors.len() => {
                return Err(Error::IndexOutOfRange {
                    index: i,
                    size: self.tenors.len(),
                })
            }
            Some(i) => i,
            None => 0,
        };
        {
            let mut fit = self.write();
            match bump.tenor {
                Some(i) => fit.quotes[i] = bump.apply(fit.quotes[i]),
                None => fit.quotes.iter_mut().for_each(|q| *q = bump.apply(*q)),
            }
            fit.pending = Some(fit.pending.map_or(from, |p| p.min(from)));
        }
        if bump.refit {
            self.refit(from)?;
        }
        Ok(())
    }

    fn set_quotes(&self, quotes: &[Real], refit: bool) -> Result<()> {
        ql_core::ensure!(
            quotes.len() == self.tenors.len(),
            "expected {} quotes, got {}",
            self.tenors.len(),
            quotes.len()
        );
        {
            let mut fit = self.write();
            let from = fit
                .quotes
                .iter()
                .zip(quotes)
                .position(|(a, b)| a.to_bits() != b.to_bits());
            let Some(from) = from else {
                return Ok(());
            };
            fit.quotes.copy_from_slice(quotes);
            fit.pending = Some(fit.pending.map_or(from, |p| p.min(from)));
        }
        if refit {
            self.refit(0)?;
        }
        Ok(())
    }

    /// Re-fit from `from_tenor`, extended back to the earliest quote changed
    /// since the last fit.  The fit is all-or-nothing: on error the curve
    /// keeps its previous state.
    fn refit(&self, from_tenor: usize) -> Result<()> {
        let mut fit = self.write();
        let from = fit
            .pending
            .map_or(from_tenor, |p| p.min(from_tenor))
            .min(self.tenors.len());
        if from == self.tenors.len() {
            return Ok(());
        }
        let mut candidate = fit.clone();
        Self::fit_from(&self.tenors, self.kind, &mut candidate, from)?;
        *fit = candidate;
        drop(fit);
        self.version.bump();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flat_hazard_survival_and_inversion() {
        let c = FlatHazardRate::new(0.02);
        assert_relative_eq!(c.survival_probability(5.0), (-0.1f64).exp(), epsilon = 1e-15);
        let u = c.default_probability(3.0);
        assert_relative_eq!(c.default_time(u), 3.0, epsilon = 1e-12);
        assert_eq!(FlatHazardRate::new(0.0).default_time(0.5), Time::INFINITY);
    }

    #[test]
    fn calibrated_flat_curve_hits_target() {
        let c = FlatHazardRate::from_survival_probability(0.95, 1.0).unwrap();
        assert_relative_eq!(c.survival_probability(1.0), 0.95, epsilon = 1e-15);
        assert!(FlatHazardRate::from_survival_probability(1.2, 1.0).is_err());
    }

    #[test]
    fn piecewise_reproduces_survival_points() {
        let pts = [(1.0, 0.98), (3.0, 0.93), (5.0, 0.85)];
        let c = PiecewiseHazardRateCurve::from_survival_probabilities(&pts).unwrap();
        for (t, s) in pts {
            assert_relative_eq!(c.survival_probability(t), s, epsilon = 1e-14);
        }
        assert!(c.survival_probability(7.0) < 0.85);
    }

    #[test]
    fn piecewise_default_time_inverts_default_probability() {
        let c = PiecewiseHazardRateCurve::from_hazard_rates(vec![1.0, 3.0, 5.0], vec![0.01, 0.03, 0.05])
            .unwrap();
        for t in [0.3, 1.0, 2.2, 4.9, 8.0] {
            let u = c.default_probability(t);
            assert_relative_eq!(c.default_time(u), t, epsilon = 1e-10);
        }
        // numeric inversion agrees with the closed form
        let u = c.default_probability(2.7);
        let numeric =
            solve_increasing(|t| c.default_probability(t) - u, 0.0, 1.0, Some(0.0), 1e-12).unwrap();
        assert_relative_eq!(c.default_time(u), numeric, epsilon = 1e-9);
    }

    #[test]
    fn zero_survival_means_certain_default() {
        let c = PiecewiseHazardRateCurve::from_survival_probabilities(&[(1.0, 0.0)]).unwrap();
        assert_eq!(c.survival_probability(1.0), 0.0);
        assert_eq!(c.survival_probability(0.0), 1.0);
        assert_eq!(c.default_probability(0.5), 1.0);
        assert_eq!(c.default_time(0.999), 0.0);
    }

    #[test]
    fn non_monotone_survival_is_rejected() {
        let err = PiecewiseHazardRateCurve::from_survival_probabilities(&[(1.0, 0.9), (2.0, 0.95)]);
        assert!(matches!(err, Err(Error::Domain(_))));
    }

    #[test]
    fn bump_and_restore_moves_version_and_values() {
        let c = PiecewiseHazardRateCurve::new(
            vec![1.0, 3.0, 5.0],
            vec![0.0060, 0.0075, 0.0090],
            HazardQuote::ParSpread { recovery: 0.4 },
        )
        .unwrap();
        let v0 = c.version();
        let base = c.survival_probability(4.0);
        let saved = c.quotes();

        c.bump_quote(&QuoteBump::absolute(0.0001)).unwrap();
        assert!(c.version() > v0);
        assert!(c.survival_probability(4.0) < base);

        c.set_quotes(&saved, true).unwrap();
        assert_eq!(c.survival_probability(4.0).to_bits(), base.to_bits());
    }

    #[test]
    fn deferred_bump_leaves_fit_until_refit() {
        let c = PiecewiseHazardRateCurve::from_hazard_rates(vec![1.0, 2.0], vec![0.01, 0.02]).unwrap();
        let before = c.survival_probability(2.0);
        let v0 = c.version();
        c.bump_quote(&QuoteBump::relative(0.5).at_tenor(1).deferred()).unwrap();
        assert_eq!(c.version(), v0);
        assert_eq!(c.survival_probability(2.0), before);
        c.refit(1).unwrap();
        assert!(c.version() > v0);
        assert_relative_eq!(c.hazard_rates()[1], 0.03, epsilon = 1e-15);
        assert_relative_eq!(c.hazard_rates()[0], 0.01, epsilon = 1e-15);
    }

    #[test]
    fn failed_refit_keeps_previous_state() {
        let c = PiecewiseHazardRateCurve::new(
            vec![1.0, 2.0],
            vec![0.01, 0.012],
            HazardQuote::ParSpread { recovery: 0.4 },
        )
        .unwrap();
        let v0 = c.version();
        let before = c.survival_probability(2.0);
        let bump = QuoteBump::absolute(-0.02).at_tenor(1);
        assert!(c.bump_quote(&bump).is_err());
        assert_eq!(c.version(), v0);
        assert_eq!(c.survival_probability(2.0), before);
    }

    #[test]
    fn flat_curves_reject_bumps() {
        assert!(FlatHazardRate::new(0.01)
            .bump_quote(&QuoteBump::absolute(0.001))
            .is_err());
        let c = PiecewiseHazardRateCurve::flat(0.01).unwrap();
        assert!(matches!(
            c.bump_quote(&QuoteBump::absolute(0.001).at_tenor(3)),
            Err(Error::IndexOutOfRange { index: 3, size: 1 })
        ));
    }

    proptest::proptest! {
        #[test]
        fn piecewise_survival_is_monotone_and_invertible(
            hazards in proptest::collection::vec(0.0..0.5f64, 1..6),
            t in 0.01..10.0f64,
        ) {
            let tenors: Vec<Time> = (1..=hazards.len()).map(|i| i as Time).collect();
            let c = PiecewiseHazardRateCurve::from_hazard_rates(tenors, hazards).unwrap();
            proptest::prop_assert!(c.survival_probability(t + 0.5) <= c.survival_probability(t));
            let u = c.default_probability(t);
            let tau = c.default_time(u);
            if u > 1e-6 && tau.is_finite() {
                proptest::prop_assert!((c.default_probability(tau) - u).abs() < 1e-10);
            }
        }
    }
}
