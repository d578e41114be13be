//! Simulated default times.
//!
//! Each path draws the copula's latent variables, maps them to uniforms
//! through the latent CDF and inverts every live name's survival curve to
//! get a default time.  Losses are accumulated at each evaluation date and
//! bucketed on the loss grid; the realized losses are also kept, sorted, for
//! sample estimators and quantiles.
//!
//! Paths are generated in blocks of [`BLOCK_PATHS`], block `b` drawing from
//! sub-stream `b` of the master seed.  The same seed therefore gives the same
//! paths whether blocks run sequentially or in parallel.

use super::{check_dates, LossDistributionStrategy, Realized};
use crate::config::LossModelConfig;
use crate::copula::{CopulaType, FactorCopula};
use crate::correlation::CorrelationModel;
use crate::loss_distribution::{GridDistribution, LossDistribution, LossSlice};
use crate::name::NameCollection;
use nalgebra::{DMatrix, DVector};
use ql_core::{errors::Result, Error, Real, Time};
use ql_math::{MersenneTwisterUniformRng, OrderStatistics, Statistics};
use tracing::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Paths per random-number block.
pub const BLOCK_PATHS: usize = 1024;

const MIN_UNIFORM: Real = Real::MIN_POSITIVE;
const MAX_UNIFORM: Real = 1.0 - Real::EPSILON / 2.0;

/// Uniform draws of the last run, `paths × names`, row-major.
#[derive(Debug, Clone)]
struct Draws {
    paths: usize,
    seed: u64,
    copula: CopulaType,
    correlation: CorrelationModel,
    names: usize,
    uniforms: Vec<Real>,
}

/// Per-date outcomes of a range of paths.
#[derive(Debug, Default)]
struct Outcomes {
    /// `loss[d][p]`
    loss: Vec<Vec<Real>>,
    recovered: Vec<Vec<Real>>,
    defaults: Vec<Vec<Real>>,
}

impl Outcomes {
    fn with_dates(n: usize) -> Self {
        Self {
            loss: vec![Vec::new(); n],
            recovered: vec![Vec::new(); n],
            defaults: vec![Vec::new(); n],
        }
    }

    fn append(&mut self, other: Outcomes) {
        for (d, v) in other.loss.into_iter().enumerate() {
            self.loss[d].extend(v);
        }
        for (d, v) in other.recovered.into_iter().enumerate() {
            self.recovered[d].extend(v);
        }
        for (d, v) in other.defaults.into_iter().enumerate() {
            self.defaults[d].extend(v);
        }
    }
}

/// Monte Carlo loss strategy.
#[derive(Debug, Clone)]
pub struct MonteCarloStrategy {
    paths: usize,
    seed: u64,
    loss_step: Real,
    track_amortization: bool,
    track_default_counts: bool,
    keep_samples: bool,
    draws: Option<Draws>,
}

/// How latent variables are generated for one run.
enum Latents<'a> {
    Factor {
        copula: &'a FactorCopula,
        loadings: Vec<Real>,
    },
    Matrix {
        copula: &'a FactorCopula,
        cholesky: DMatrix<Real>,
    },
}

impl Latents<'_> {
    /// Uniforms of every name for the paths of block `block`.
    fn block(&self, seed: u64, block: usize, paths: usize, names: usize) -> Vec<Real> {
        let mut rng = MersenneTwisterUniformRng::for_stream(seed, block as u64);
        let mut out = Vec::with_capacity(paths * names);
        for _ in 0..paths {
            match self {
                Latents::Factor { copula, loadings } => {
                    let draw = copula.sample_systemic(&mut rng);
                    for &beta in loadings {
                        let shock = copula.sample_idiosyncratic(&mut rng);
                        let x = copula.latent(beta, &draw, shock);
                        out.push(copula.latent_cdf(x, beta).clamp(MIN_UNIFORM, MAX_UNIFORM));
                    }
                }
                Latents::Matrix { copula, cholesky } => {
                    let draw = copula.sample_systemic(&mut rng);
                    let z = DVector::from_fn(names, |_, _| copula.sample_idiosyncratic(&mut rng));
                    let x = cholesky * z;
                    out.extend(
                        x.iter()
                            .map(|&xi| copula.latent_cdf(draw.scale * xi, 0.0).clamp(MIN_UNIFORM, MAX_UNIFORM)),
                    );
                }
            }
        }
        out
    }
}

impl MonteCarloStrategy {
    /// Simulation with `paths` paths from master seed `seed`, bucketed on a
    /// grid of `loss_step`.
    pub fn new(paths: usize, seed: u64, loss_step: Real) -> Self {
        Self {
            paths,
            seed,
            loss_step,
            track_amortization: false,
            track_default_counts: false,
            keep_samples: true,
            draws: None,
        }
    }

    /// Settings taken from an engine configuration.
    pub fn from_config(config: &LossModelConfig) -> Self {
        Self {
            paths: config.paths,
            seed: config.seed,
            loss_step: config.loss_step,
            track_amortization: config.track_amortization,
            track_default_counts: config.track_default_counts,
            keep_samples: config.keep_samples,
            draws: None,
        }
    }

    /// Also build the recovered-notional and default-count distributions.
    pub fn tracking(mut self, amortization: bool, default_counts: bool) -> Self {
        self.track_amortization = amortization;
        self.track_default_counts = default_counts;
        self
    }

    /// Keep (or drop) the realized losses alongside the bucketed
    /// distribution.
    pub fn keeping_samples(mut self, keep: bool) -> Self {
        self.keep_samples = keep;
        self
    }

    /// Number of paths.
    pub fn paths(&self) -> usize {
        self.paths
    }

    fn blocks(&self) -> usize {
        self.paths.div_ceil(BLOCK_PATHS)
    }

    fn block_len(&self, block: usize) -> usize {
        BLOCK_PATHS.min(self.paths - block * BLOCK_PATHS)
    }

    fn draw(
        &self,
        names: &NameCollection,
        correlation: &CorrelationModel,
        copula: &FactorCopula,
    ) -> Result<Draws> {
        let n = names.len();
        let latents = if correlation.is_factor_model() {
            Latents::Factor {
                copula,
                loadings: correlation.loadings(n)?,
            }
        } else {
            if !copula.supports_matrix() {
                return Err(Error::Configuration(format!(
                    "the {} copula cannot drive a full correlation matrix",
                    copula.kind()
                )));
            }
            Latents::Matrix {
                copula,
                cholesky: correlation.cholesky(n)?,
            }
        };
        let blocks: Vec<usize> = (0..self.blocks()).collect();
        let run = |&b: &usize| latents.block(self.seed, b, self.block_len(b), n);
        #[cfg(feature = "parallel")]
        let parts: Vec<Vec<Real>> = blocks.par_iter().map(run).collect();
        #[cfg(not(feature = "parallel"))]
        let parts: Vec<Vec<Real>> = blocks.iter().map(run).collect();
        Ok(Draws {
            paths: self.paths,
            seed: self.seed,
            copula: copula.kind(),
            correlation: correlation.clone(),
            names: n,
            uniforms: parts.concat(),
        })
    }

    /// Outcomes of paths `start..start + len`.
    fn evaluate(
        names: &NameCollection,
        weights: &[Real],
        live: &[usize],
        dates: &[Time],
        draws: &Draws,
        start: usize,
        len: usize,
    ) -> Result<Outcomes> {
        let horizon = dates.last().copied().unwrap_or(0.0);
        let mut out = Outcomes::with_dates(dates.len());
        let mut loss = vec![0.0; dates.len()];
        let mut recovered = vec![0.0; dates.len()];
        let mut defaults = vec![0.0; dates.len()];
        for p in start..start + len {
            loss.fill(0.0);
            recovered.fill(0.0);
            defaults.fill(0.0);
            let row = &draws.uniforms[p * draws.names..(p + 1) * draws.names];
            for &i in live {
                let name = names.get(i)?;
                let tau = name.survival().default_time(row[i]);
                if tau > horizon {
                    continue;
                }
                let r = name.recovery_rate(tau)?;
                let first = dates.partition_point(|&t| t < tau);
                for d in first..dates.len() {
                    loss[d] += weights[i] * (1.0 - r);
                    recovered[d] += weights[i] * r;
                    defaults[d] += 1.0;
                }
            }
            for d in 0..dates.len() {
                out.loss[d].push(loss[d]);
                out.recovered[d].push(recovered[d]);
                out.defaults[d].push(defaults[d]);
            }
        }
        Ok(out)
    }

    fn simulate(
        &self,
        names: &NameCollection,
        dates: &[Time],
        draws: &Draws,
    ) -> Result<LossDistribution> {
        let live = names.live_indices();
        let weights = names.weights();
        let realized = Realized::of(names)?;
        let ranges: Vec<(usize, usize)> = (0..self.blocks())
            .map(|b| (b * BLOCK_PATHS, self.block_len(b)))
            .collect();
        let run = |&(start, len): &(usize, usize)| {
            Self::evaluate(names, &weights, &live, dates, draws, start, len)
        };
        #[cfg(feature = "parallel")]
        let parts: Vec<Result<Outcomes>> = ranges.par_iter().map(run).collect();
        #[cfg(not(feature = "parallel"))]
        let parts: Vec<Result<Outcomes>> = ranges.iter().map(run).collect();
        let mut outcomes = Outcomes::with_dates(dates.len());
        for part in parts {
            outcomes.append(part?);
        }

        let mut slices = Vec::with_capacity(dates.len());
        for (d, &t) in dates.iter().enumerate() {
            let losses: Vec<Real> = outcomes.loss[d].iter().map(|x| realized.loss + x).collect();
            let mut slice = LossSlice::new(
                t,
                GridDistribution::from_samples(&losses, realized.loss, self.loss_step),
            );
            if self.track_amortization {
                let recovered: Vec<Real> =
                    outcomes.recovered[d].iter().map(|x| realized.recovered + x).collect();
                slice = slice.with_amortization(GridDistribution::from_samples(
                    &recovered,
                    realized.recovered,
                    self.loss_step,
                ));
            }
            if self.track_default_counts {
                let offset = realized.defaults as Real;
                let counts: Vec<Real> = outcomes.defaults[d].iter().map(|k| offset + k).collect();
                slice = slice.with_default_counts(GridDistribution::from_samples(&counts, offset, 1.0));
            }
            if d + 1 == dates.len() {
                let stats: Statistics = losses.iter().copied().collect();
                debug!(
                    t,
                    paths = self.paths,
                    mean = stats.mean().unwrap_or(0.0),
                    standard_error = stats.error_estimate().unwrap_or(0.0),
                    "Monte Carlo expected loss at the last date"
                );
            }
            if self.keep_samples {
                slice = slice.with_samples(OrderStatistics::from_unsorted(losses));
            }
            slices.push(slice);
        }
        Ok(LossDistribution::new(slices))
    }

    fn reusable(
        &self,
        draws: &Draws,
        names: &NameCollection,
        correlation: &CorrelationModel,
        copula: &FactorCopula,
    ) -> bool {
        draws.paths == self.paths
            && draws.seed == self.seed
            && draws.names == names.len()
            && draws.copula == copula.kind()
            && &draws.correlation == correlation
    }
}

impl LossDistributionStrategy for MonteCarloStrategy {
    fn name(&self) -> &'static str {
        "monte-carlo"
    }

    fn compute(
        &mut self,
        names: &NameCollection,
        correlation: &CorrelationModel,
        copula: &FactorCopula,
        dates: &[Time],
    ) -> Result<LossDistribution> {
        check_dates(dates)?;
        ql_core::config_error!(self.paths > 0, "path count must be positive");
        ql_core::config_error!(
            self.loss_step > 0.0,
            "loss step must be positive, got {}",
            self.loss_step
        );
        if self.paths < 1000 {
            warn!(paths = self.paths, "few Monte Carlo paths; estimates will be noisy");
        }
        self.draws = None;
        debug!(
            names = names.len(),
            paths = self.paths,
            seed = self.seed,
            dates = dates.len(),
            copula = %copula.kind(),
            "Monte Carlo loss simulation"
        );
        let draws = self.draw(names, correlation, copula)?;
        let distribution = self.simulate(names, dates, &draws)?;
        self.draws = Some(draws);
        Ok(distribution)
    }

    fn refit(
        &mut self,
        names: &NameCollection,
        correlation: &CorrelationModel,
        copula: &FactorCopula,
        dates: &[Time],
        min_index: usize,
    ) -> Result<LossDistribution> {
        match self.draws.take() {
            Some(draws) if self.reusable(&draws, names, correlation, copula) => {
                check_dates(dates)?;
                debug!(min_index, paths = self.paths, "Monte Carlo refit reuses the latent draws");
                let distribution = self.simulate(names, dates, &draws);
                self.draws = Some(draws);
                distribution
            }
            _ => self.compute(names, correlation, copula, dates),
        }
    }

    fn reset(&mut self) {
        self.draws = None;
    }
}
