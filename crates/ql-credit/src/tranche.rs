//! Tranche and n-th-to-default pricing off a loss-distribution provider.
//!
//! One [`TranchePricer`] covers every product: what differs between a
//! tranche and an n-th-to-default basket is only how the expected loss and
//! outstanding notional of the protected layer are read from the basket
//! ([`TrancheKind`]).
//!
//! With `L(t)` the expected fraction of the protected layer lost by `t` and
//! `O(t)` the expected fraction still outstanding, over payment periods
//! `(s_i, e_i]` with accrual `α_i`:
//!
//! ```text
//! protection = N · Σ P(½(s_i + e_i)) · (L(e_i) − L(s_i))
//! annuity    = N · Σ α_i · P(e_i) · ½(O(s_i) + O(e_i))
//! npv        = protection − spread · annuity − upfront · N     (protection buyer)
//! ```

use crate::basket::LossDistributionProvider;
use ql_core::{errors::Result, Real, Time};
use ql_termstructures::{DefaultProbabilityTermStructure, QuoteBump, YieldTermStructure};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One premium period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaymentPeriod {
    /// Accrual start.
    pub start: Time,
    /// Accrual end and payment time.
    pub end: Time,
    /// Accrual fraction.
    pub accrual: Real,
}

/// Contiguous premium periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSchedule {
    periods: Vec<PaymentPeriod>,
}

impl PaymentSchedule {
    /// Schedule from explicit periods.
    ///
    /// # Errors
    /// Precondition error unless periods are non-empty, non-negative,
    /// each with `start < end`, contiguous, with non-negative accruals.
    pub fn from_periods(periods: Vec<PaymentPeriod>) -> Result<Self> {
        ql_core::ensure!(!periods.is_empty(), "payment schedule is empty");
        ql_core::ensure!(periods[0].start >= 0.0, "first period starts before today");
        for (i, p) in periods.iter().enumerate() {
            ql_core::ensure!(
                p.start < p.end && p.accrual >= 0.0,
                "period {i} is invalid: ({}, {}] with accrual {}",
                p.start,
                p.end,
                p.accrual
            );
        }
        ql_core::ensure!(
            periods.windows(2).all(|w| w[1].start == w[0].end),
            "payment periods must be contiguous"
        );
        Ok(Self { periods })
    }

    /// Regular schedule from today to `maturity` with `frequency` payments a
    /// year and a short last period.
    pub fn regular(maturity: Time, frequency: u32) -> Result<Self> {
        ql_core::ensure!(maturity > 0.0, "maturity must be positive, got {maturity}");
        ql_core::ensure!(frequency > 0, "payment frequency must be positive");
        let dt = 1.0 / Real::from(frequency);
        let mut periods = Vec::new();
        let mut start = 0.0;
        let mut k = 1;
        while (k as Real) * dt < maturity - 1.0e-12 {
            let end = k as Real * dt;
            periods.push(PaymentPeriod {
                start,
                end,
                accrual: end - start,
            });
            start = end;
            k += 1;
        }
        periods.push(PaymentPeriod {
            start,
            end: maturity,
            accrual: maturity - start,
        });
        Self::from_periods(periods)
    }

    /// The periods.
    pub fn periods(&self) -> &[PaymentPeriod] {
        &self.periods
    }

    /// Last payment time.
    pub fn maturity(&self) -> Time {
        self.periods[self.periods.len() - 1].end
    }

    /// Every period boundary, increasing: the dates a basket must be computed
    /// on to price against this schedule.
    pub fn boundaries(&self) -> Vec<Time> {
        std::iter::once(self.periods[0].start)
            .chain(self.periods.iter().map(|p| p.end))
            .collect()
    }
}

/// What part of the basket is protected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrancheKind {
    /// Losses between `attachment` and `detachment` (fractions of basket
    /// notional).
    Tranche {
        /// Lower bound of the layer.
        attachment: Real,
        /// Upper bound of the layer.
        detachment: Real,
    },
    /// Pays `1 − recovery` of the notional at the `n`-th default (one-based,
    /// realized defaults included).
    NthToDefault {
        /// Which default triggers the payment.
        n: usize,
        /// Recovery on the triggering name.
        recovery: Real,
    },
}

impl TrancheKind {
    fn validate(&self) -> Result<()> {
        match *self {
            TrancheKind::Tranche {
                attachment,
                detachment,
            } => {
                ql_core::ensure!(
                    0.0 <= attachment && attachment < detachment && detachment <= 1.0,
                    "tranche bounds must satisfy 0 <= attachment < detachment <= 1, got [{attachment}, {detachment}]"
                );
            }
            TrancheKind::NthToDefault { n, recovery } => {
                ql_core::ensure!(n >= 1, "n-th to default needs n >= 1");
                ql_core::domain_error!(
                    (0.0..=1.0).contains(&recovery),
                    "recovery must be in [0, 1], got {recovery}"
                );
            }
        }
        Ok(())
    }
}

/// Present values of one pricing run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrancheResults {
    /// Protection-leg PV.
    pub protection_leg: Real,
    /// Premium-leg PV at the running spread.
    pub premium_leg: Real,
    /// PV of one unit of running spread.
    pub risky_annuity: Real,
    /// Upfront amount paid by the protection buyer.
    pub upfront: Real,
    /// Value to the protection buyer.
    pub npv: Real,
    /// Running spread that sets the NPV to zero given the upfront.
    pub fair_spread: Real,
}

/// Prices protection on a layer of a basket.
#[derive(Debug, Clone)]
pub struct TranchePricer {
    basket: Arc<dyn LossDistributionProvider>,
    discount: Arc<dyn YieldTermStructure>,
    schedule: PaymentSchedule,
    kind: TrancheKind,
    notional: Real,
    running_spread: Real,
    upfront_rate: Real,
    include_amortization: bool,
}

impl TranchePricer {
    /// Pricer for `notional` of protection on `kind`.
    pub fn new(
        basket: Arc<dyn LossDistributionProvider>,
        discount: Arc<dyn YieldTermStructure>,
        schedule: PaymentSchedule,
        kind: TrancheKind,
        notional: Real,
    ) -> Result<Self> {
        kind.validate()?;
        ql_core::ensure!(notional > 0.0, "notional must be positive, got {notional}");
        Ok(Self {
            basket,
            discount,
            schedule,
            kind,
            notional,
            running_spread: 0.0,
            upfront_rate: 0.0,
            include_amortization: false,
        })
    }

    /// Running spread paid on the outstanding notional.
    pub fn with_running_spread(mut self, spread: Real) -> Self {
        self.running_spread = spread;
        self
    }

    /// Upfront as a fraction of notional.
    pub fn with_upfront(mut self, upfront_rate: Real) -> Self {
        self.upfront_rate = upfront_rate;
        self
    }

    /// Reduce the premium notional by recoveries written off from the top
    /// of the capital structure (needs a basket tracking amortization).
    pub fn with_amortization(mut self, include: bool) -> Self {
        self.include_amortization = include;
        self
    }

    /// The protected layer.
    pub fn kind(&self) -> TrancheKind {
        self.kind
    }

    /// The premium schedule.
    pub fn schedule(&self) -> &PaymentSchedule {
        &self.schedule
    }

    /// Dates the basket has to be computed on.
    pub fn required_dates(&self) -> Vec<Time> {
        self.schedule.boundaries()
    }

    /// Expected fraction of the layer lost by `t`.
    pub fn loss_fraction(&self, t: Time) -> Result<Real> {
        match self.kind {
            TrancheKind::Tranche {
                attachment,
                detachment,
            } => Ok(self.basket.tranche_expected_loss(attachment, detachment, t)?
                / (detachment - attachment)),
            TrancheKind::NthToDefault { n, recovery } => {
                Ok(self.basket.probability_at_least_n_defaults(n, t)? * (1.0 - recovery))
            }
        }
    }

    /// Expected fraction of the layer still paying premium at `t`.
    pub fn outstanding_fraction(&self, t: Time) -> Result<Real> {
        match self.kind {
            TrancheKind::Tranche {
                attachment,
                detachment,
            } => {
                let width = detachment - attachment;
                let lost = self.basket.tranche_expected_loss(attachment, detachment, t)?;
                let amortized = if self.include_amortization {
                    self.basket
                        .tranche_expected_amortization(attachment, detachment, t)?
                } else {
                    0.0
                };
                Ok(1.0 - (lost + amortized) / width)
            }
            TrancheKind::NthToDefault { n, .. } => {
                Ok(1.0 - self.basket.probability_at_least_n_defaults(n, t)?)
            }
        }
    }

    /// Protection-leg PV, losses discounted from mid-period.
    pub fn protection_leg(&self) -> Result<Real> {
        self.basket.ensure_fresh()?;
        let mut pv = 0.0;
        for p in self.schedule.periods() {
            let dl = self.loss_fraction(p.end)? - self.loss_fraction(p.start)?;
            pv += self.discount.discount(0.5 * (p.start + p.end)) * dl;
        }
        Ok(self.notional * pv)
    }

    /// PV of one unit of running spread on the expected outstanding notional.
    pub fn risky_annuity(&self) -> Result<Real> {
        self.basket.ensure_fresh()?;
        let mut pv = 0.0;
        for p in self.schedule.periods() {
            let outstanding =
                0.5 * (self.outstanding_fraction(p.start)? + self.outstanding_fraction(p.end)?);
            pv += p.accrual * self.discount.discount(p.end) * outstanding;
        }
        Ok(self.notional * pv)
    }

    /// Premium-leg PV at the running spread.
    pub fn premium_leg(&self) -> Result<Real> {
        Ok(self.running_spread * self.risky_annuity()?)
    }

    /// Upfront amount.
    pub fn upfront(&self) -> Real {
        self.upfront_rate * self.notional
    }

    /// Value to the protection buyer.
    pub fn npv(&self) -> Result<Real> {
        Ok(self.protection_leg()? - self.premium_leg()? - self.upfront())
    }

    /// Running spread that makes the NPV zero, given the upfront.
    ///
    /// # Errors
    /// Runtime error when the risky annuity vanishes (layer certainly wiped
    /// out).
    pub fn fair_spread(&self) -> Result<Real> {
        let annuity = self.risky_annuity()?;
        if annuity.abs() <= 1.0e-14 * self.notional {
            ql_core::fail!("risky annuity is zero; fair spread undefined");
        }
        Ok((self.protection_leg()? - self.upfront()) / annuity)
    }

    /// Upfront rate that makes the NPV zero at the running spread.
    pub fn fair_upfront(&self) -> Result<Real> {
        Ok((self.protection_leg()? - self.premium_leg()?) / self.notional)
    }

    /// Premium accrued since the start of the period containing `t`.
    pub fn accrued(&self, t: Time) -> Result<Real> {
        let Some(p) = self
            .schedule
            .periods()
            .iter()
            .find(|p| p.start < t && t <= p.end)
        else {
            return Ok(0.0);
        };
        self.basket.ensure_fresh()?;
        let fraction = p.accrual * (t - p.start) / (p.end - p.start);
        Ok(self.running_spread * self.notional * fraction * self.outstanding_fraction(p.start)?)
    }

    /// All present values at once.
    pub fn price(&self) -> Result<TrancheResults> {
        let protection_leg = self.protection_leg()?;
        let risky_annuity = self.risky_annuity()?;
        let premium_leg = self.running_spread * risky_annuity;
        let upfront = self.upfront();
        if risky_annuity.abs() <= 1.0e-14 * self.notional {
            ql_core::fail!("risky annuity is zero; fair spread undefined");
        }
        Ok(TrancheResults {
            protection_leg,
            premium_leg,
            risky_annuity,
            upfront,
            npv: protection_leg - premium_leg - upfront,
            fair_spread: (protection_leg - upfront) / risky_annuity,
        })
    }

    /// NPV change when `curve` is bumped by `bump`.
    ///
    /// Follows bump → refresh → price → restore → refresh.  The curve's
    /// quotes are restored whether or not pricing the bumped state
    /// succeeded; the provider must be able to refresh itself (a shared
    /// basket behind a lock).
    pub fn curve_sensitivity(
        &self,
        curve: &dyn DefaultProbabilityTermStructure,
        bump: &QuoteBump,
    ) -> Result<Real> {
        let base = self.npv()?;
        let saved = curve.quotes();
        ql_core::ensure!(!saved.is_empty(), "curve has no quotes to bump");
        curve.bump_quote(bump)?;
        let bumped = self.basket.ensure_fresh().and_then(|_| self.npv());
        let restored = curve
            .set_quotes(&saved, true)
            .and_then(|_| self.basket.ensure_fresh());
        let bumped = bumped?;
        restored?;
        debug!(base, bumped, "curve sensitivity");
        Ok(bumped - base)
    }
}

impl TrancheResults {
    /// Fair spread in basis points.
    pub fn fair_spread_bps(&self) -> Real {
        self.fair_spread * 1.0e4
    }
}
