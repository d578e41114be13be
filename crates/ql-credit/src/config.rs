//! Engine configuration.
//!
//! Every numerical knob of the loss engine lives in [`LossModelConfig`], so a
//! basket can be rebuilt from a serialized configuration and produce the same
//! numbers.

use ql_core::{errors::Result, Real, ValidationErrors};
use serde::{Deserialize, Serialize};

/// Which loss-distribution strategy a basket uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Binomial mixture for identical names; falls back to the recursion
    /// when the pool is not homogeneous at some date.
    Homogeneous,
    /// Recursive convolution over a loss grid.
    Heterogeneous,
    /// Simulation of default times.
    MonteCarlo,
    /// Homogeneous (with fallback) for factor models, Monte Carlo for full
    /// correlation matrices.
    #[default]
    Auto,
}

/// Numerical configuration of a loss model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossModelConfig {
    /// Strategy selection.
    pub strategy: StrategyKind,
    /// Width of a loss bucket as a fraction of total basket notional.
    pub loss_step: Real,
    /// Number of quadrature nodes over the systemic factor.
    pub quadrature_order: usize,
    /// Number of quadrature nodes over the Student-t mixing variable.
    pub mixing_order: usize,
    /// Monte Carlo path count.
    pub paths: usize,
    /// Monte Carlo master seed.
    pub seed: u64,
    /// Also build the distribution of recovered notional.
    pub track_amortization: bool,
    /// Also build the distribution of the number of defaults.
    pub track_default_counts: bool,
    /// Keep the realized Monte Carlo losses for exact sample estimators and
    /// quantiles; otherwise only the bucketed distribution is kept.
    pub keep_samples: bool,
}

impl Default for LossModelConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Auto,
            loss_step: 0.001,
            quadrature_order: 48,
            mixing_order: 16,
            paths: 100_000,
            seed: 42,
            track_amortization: false,
            track_default_counts: false,
            keep_samples: true,
        }
    }
}

impl LossModelConfig {
    /// Configuration with the given strategy and defaults elsewhere.
    pub fn with_strategy(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Record every problem with the configuration in `errors`.
    pub fn validate(&self, errors: &mut ValidationErrors) {
        errors.check(self.loss_step > 0.0 && self.loss_step <= 1.0, || {
            format!("loss step must be in (0, 1], got {}", self.loss_step)
        });
        errors.check(self.quadrature_order > 0, || {
            "quadrature order must be positive".to_string()
        });
        errors.check(self.mixing_order > 0, || {
            "mixing order must be positive".to_string()
        });
        errors.check(self.paths > 0, || "path count must be positive".to_string());
    }

    /// `Ok(())` if the configuration is usable, the collected problems
    /// otherwise.
    pub fn check(&self) -> Result<()> {
        let mut errors = ValidationErrors::new();
        self.validate(&mut errors);
        errors.into_result()
    }
}
