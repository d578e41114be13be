//! Recursive convolution over a loss grid.
//!
//! Conditional on a factor node, names default independently, so the pool
//! loss distribution is built one name at a time:
//!
//! ```text
//! f'(k) = f(k)·(1 − p) + f(k − b)·p
//! ```
//!
//! where `p` is the name's conditional default probability and `b` its loss
//! in grid steps.  Each name's loss is snapped to the nearest grid point
//! (halves round up), so a grid much coarser than the smallest name loss
//! biases the result; shrink `loss_step` until the numbers stop moving.
//! Names are convolved in collection order.
//!
//! Partial states after every `stride` names are kept per date and node, so
//! that [`refit`](LossDistributionStrategy::refit) can resume the recursion
//! at the first changed name instead of starting over.

use super::{check_dates, checked_default_probability, snap, LossDistributionStrategy, Realized};
use crate::config::LossModelConfig;
use crate::copula::{FactorCopula, FactorNode};
use crate::correlation::CorrelationModel;
use crate::loss_distribution::{GridDistribution, LossDistribution, LossSlice};
use crate::name::NameCollection;
use ql_core::{errors::Result, Real, Time};
use tracing::{debug, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Conditional distributions of one node after a prefix of the names.
#[derive(Debug, Clone, PartialEq)]
struct Conditional {
    loss: Vec<Real>,
    recovered: Option<Vec<Real>>,
    count: Option<Vec<Real>>,
}

fn convolve(dist: &mut Vec<Real>, p: Real, shift: usize) {
    if shift == 0 {
        return;
    }
    let n = dist.len();
    dist.resize(n + shift, 0.0);
    for k in (0..n + shift).rev() {
        let stay = if k < n { dist[k] * (1.0 - p) } else { 0.0 };
        let moved = if k >= shift { dist[k - shift] * p } else { 0.0 };
        dist[k] = stay + moved;
    }
}

impl Conditional {
    fn start(track_amortization: bool, track_default_counts: bool) -> Self {
        Self {
            loss: vec![1.0],
            recovered: track_amortization.then(|| vec![1.0]),
            count: track_default_counts.then(|| vec![1.0]),
        }
    }

    fn add(&mut self, p: Real, loss_steps: usize, recovery_steps: usize) {
        convolve(&mut self.loss, p, loss_steps);
        if let Some(r) = self.recovered.as_mut() {
            convolve(r, p, recovery_steps);
        }
        if let Some(c) = self.count.as_mut() {
            convolve(c, p, 1);
        }
    }
}

/// Per-date inputs of the live names, in recursion order.
#[derive(Debug, Clone, PartialEq)]
struct DateInputs {
    default_probabilities: Vec<Real>,
    recoveries: Vec<Real>,
    thresholds: Vec<Real>,
    loss_steps: Vec<usize>,
    recovery_steps: Vec<usize>,
}

#[derive(Debug, Clone)]
struct DateState {
    inputs: DateInputs,
    /// `checkpoints[c][node]`: state after the first `c·stride` live names.
    checkpoints: Vec<Vec<Conditional>>,
    slice: LossSlice,
}

#[derive(Debug, Clone)]
struct Cache {
    dates: Vec<Time>,
    live: Vec<usize>,
    weights: Vec<Real>,
    loadings: Vec<Real>,
    nodes: Vec<FactorNode>,
    realized: Realized,
    stride: usize,
    states: Vec<DateState>,
}

/// Recursive-convolution loss strategy.
#[derive(Debug, Clone)]
pub struct HeterogeneousStrategy {
    loss_step: Real,
    track_amortization: bool,
    track_default_counts: bool,
    cache: Option<Cache>,
}

/// Everything one date's recursion needs, borrowed.
struct Recursion<'a> {
    copula: &'a FactorCopula,
    loadings: &'a [Real],
    inputs: &'a DateInputs,
    stride: usize,
}

impl Recursion<'_> {
    /// Run one node from live position `from` (a checkpoint) to the end,
    /// returning the checkpoints passed on the way and the final state.
    fn run_node(&self, node: &FactorNode, mut state: Conditional, from: usize) -> (Vec<Conditional>, Conditional) {
        let n = self.loadings.len();
        let mut checkpoints = Vec::new();
        for pos in from..n {
            if pos % self.stride == 0 && pos > from {
                checkpoints.push(state.clone());
            }
            let p = self.copula.conditional_default_probability(
                self.inputs.thresholds[pos],
                self.loadings[pos],
                node,
            );
            state.add(p, self.inputs.loss_steps[pos], self.inputs.recovery_steps[pos]);
        }
        (checkpoints, state)
    }

    fn run(&self, nodes: &[FactorNode], starts: Vec<Conditional>, from: usize) -> Vec<(Vec<Conditional>, Conditional)> {
        #[cfg(feature = "parallel")]
        {
            nodes
                .par_iter()
                .zip(starts.into_par_iter())
                .map(|(node, start)| self.run_node(node, start, from))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            nodes
                .iter()
                .zip(starts)
                .map(|(node, start)| self.run_node(node, start, from))
                .collect()
        }
    }
}

fn accumulate(acc: &mut [Real], values: &[Real], weight: Real) {
    for (a, x) in acc.iter_mut().zip(values) {
        *a += weight * x;
    }
}

/// Weighted sum over nodes, in node order.
fn mix(nodes: &[FactorNode], finals: &[Conditional]) -> Conditional {
    let first = &finals[0];
    let mut total = Conditional {
        loss: vec![0.0; first.loss.len()],
        recovered: first.recovered.as_ref().map(|r| vec![0.0; r.len()]),
        count: first.count.as_ref().map(|c| vec![0.0; c.len()]),
    };
    for (node, c) in nodes.iter().zip(finals) {
        accumulate(&mut total.loss, &c.loss, node.weight);
        if let (Some(acc), Some(v)) = (total.recovered.as_mut(), c.recovered.as_ref()) {
            accumulate(acc, v, node.weight);
        }
        if let (Some(acc), Some(v)) = (total.count.as_mut(), c.count.as_ref()) {
            accumulate(acc, v, node.weight);
        }
    }
    total
}

impl HeterogeneousStrategy {
    /// Recursion on a grid of `loss_step` (fraction of total notional).
    pub fn new(loss_step: Real) -> Self {
        Self {
            loss_step,
            track_amortization: false,
            track_default_counts: false,
            cache: None,
        }
    }

    /// Settings taken from an engine configuration.
    pub fn from_config(config: &LossModelConfig) -> Self {
        Self {
            loss_step: config.loss_step,
            track_amortization: config.track_amortization,
            track_default_counts: config.track_default_counts,
            cache: None,
        }
    }

    /// Also build the recovered-notional and default-count distributions.
    pub fn tracking(mut self, amortization: bool, default_counts: bool) -> Self {
        self.track_amortization = amortization;
        self.track_default_counts = default_counts;
        self
    }

    /// Bucket width.
    pub fn loss_step(&self) -> Real {
        self.loss_step
    }

    /// Inputs of live positions `from..` at date `t`.
    #[allow(clippy::too_many_arguments)]
    fn inputs_from(
        &self,
        names: &NameCollection,
        copula: &FactorCopula,
        live: &[usize],
        weights: &[Real],
        loadings: &[Real],
        t: Time,
        from: usize,
    ) -> Result<DateInputs> {
        let n = live.len() - from;
        let mut inputs = DateInputs {
            default_probabilities: Vec::with_capacity(n),
            recoveries: Vec::with_capacity(n),
            thresholds: Vec::with_capacity(n),
            loss_steps: Vec::with_capacity(n),
            recovery_steps: Vec::with_capacity(n),
        };
        for pos in from..live.len() {
            let i = live[pos];
            let p = checked_default_probability(names, i, t)?;
            let r = names.get(i)?.recovery_rate(t)?;
            inputs.default_probabilities.push(p);
            inputs.recoveries.push(r);
            inputs.thresholds.push(copula.threshold(p, loadings[pos])?);
            inputs.loss_steps.push(snap(weights[pos] * (1.0 - r), self.loss_step));
            inputs.recovery_steps.push(snap(weights[pos] * r, self.loss_step));
        }
        Ok(inputs)
    }

    fn slice(&self, t: Time, realized: &Realized, mixed: Conditional) -> LossSlice {
        let mut slice = LossSlice::new(
            t,
            GridDistribution::new(realized.loss, self.loss_step, mixed.loss),
        );
        if let Some(r) = mixed.recovered {
            slice = slice.with_amortization(GridDistribution::new(realized.recovered, self.loss_step, r));
        }
        if let Some(c) = mixed.count {
            slice = slice.with_default_counts(GridDistribution::new(realized.defaults as Real, 1.0, c));
        }
        slice
    }

    /// Run the recursion for one date from checkpoint `checkpoint` and
    /// assemble its state.
    #[allow(clippy::too_many_arguments)]
    fn solve_date(
        &self,
        copula: &FactorCopula,
        loadings: &[Real],
        stride: usize,
        t: Time,
        realized: &Realized,
        inputs: DateInputs,
        mut checkpoints: Vec<Vec<Conditional>>,
        checkpoint: usize,
    ) -> DateState {
        let nodes = copula.nodes();
        let from = checkpoint * stride;
        checkpoints.truncate(checkpoint + 1);
        let starts = checkpoints[checkpoint].clone();
        if loadings.is_empty() {
            let mixed = Conditional::start(self.track_amortization, self.track_default_counts);
            let slice = self.slice(t, realized, mixed);
            return DateState {
                inputs,
                checkpoints,
                slice,
            };
        }
        let recursion = Recursion {
            copula,
            loadings,
            inputs: &inputs,
            stride,
        };
        let results = recursion.run(nodes, starts, from);
        let passed = results.first().map_or(0, |r| r.0.len());
        for c in 0..passed {
            checkpoints.push(results.iter().map(|r| r.0[c].clone()).collect());
        }
        let finals: Vec<Conditional> = results.into_iter().map(|r| r.1).collect();
        let slice = self.slice(t, realized, mix(nodes, &finals));
        DateState {
            inputs,
            checkpoints,
            slice,
        }
    }

    fn distribution(cache: &Cache) -> LossDistribution {
        LossDistribution::new(cache.states.iter().map(|s| s.slice.clone()).collect())
    }
}

impl LossDistributionStrategy for HeterogeneousStrategy {
    fn name(&self) -> &'static str {
        "heterogeneous"
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
        self.cache = None;
        let live = names.live_indices();
        let all_weights = names.weights();
        let weights: Vec<Real> = live.iter().map(|&i| all_weights[i]).collect();
        let loadings = live
            .iter()
            .map(|&i| correlation.loading(i))
            .collect::<Result<Vec<_>>>()?;
        let realized = Realized::of(names)?;
        let stride = ((live.len() as Real).sqrt().ceil() as usize).max(1);
        let nodes = copula.nodes().to_vec();
        let start = Conditional::start(self.track_amortization, self.track_default_counts);

        debug!(
            names = names.len(),
            live = live.len(),
            nodes = nodes.len(),
            dates = dates.len(),
            step = self.loss_step,
            "heterogeneous loss recursion"
        );
        let mut states = Vec::with_capacity(dates.len());
        for &t in dates {
            let inputs = self.inputs_from(names, copula, &live, &weights, &loadings, t, 0)?;
            let checkpoints = vec![vec![start.clone(); nodes.len()]];
            states.push(self.solve_date(copula, &loadings, stride, t, &realized, inputs, checkpoints, 0));
        }
        let cache = Cache {
            dates: dates.to_vec(),
            live,
            weights,
            loadings,
            nodes,
            realized,
            stride,
            states,
        };
        let distribution = Self::distribution(&cache);
        self.cache = Some(cache);
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
        let Some(mut cache) = self.cache.take() else {
            return self.compute(names, correlation, copula, dates);
        };
        let live = names.live_indices();
        let all_weights = names.weights();
        let reusable = cache.dates == dates
            && cache.live == live
            && live.iter().zip(&cache.weights).all(|(&i, &w)| all_weights[i] == w)
            && live
                .iter()
                .zip(&cache.loadings)
                .all(|(&i, &b)| correlation.loading(i).map_or(false, |l| l == b))
            && cache.nodes.as_slice() == copula.nodes()
            && Realized::of(names).map_or(false, |r| r == cache.realized);
        if !reusable {
            debug!("heterogeneous refit falls back to a full recursion");
            return self.compute(names, correlation, copula, dates);
        }

        let from = live.partition_point(|&i| i < min_index);
        let checkpoint = from / cache.stride;
        let mut recomputed = 0;
        for (d, &t) in dates.iter().enumerate() {
            let tail =
                self.inputs_from(names, copula, &cache.live, &cache.weights, &cache.loadings, t, from)?;
            let old = &cache.states[d].inputs;
            let unchanged = tail.default_probabilities.iter().map(|p| p.to_bits())
                .eq(old.default_probabilities[from..].iter().map(|p| p.to_bits()))
                && tail.recoveries.iter().map(|r| r.to_bits())
                    .eq(old.recoveries[from..].iter().map(|r| r.to_bits()));
            if unchanged {
                trace!(t, "inputs unchanged, date skipped");
                continue;
            }
            let mut inputs = old.clone();
            for (k, pos) in (from..cache.live.len()).enumerate() {
                inputs.default_probabilities[pos] = tail.default_probabilities[k];
                inputs.recoveries[pos] = tail.recoveries[k];
                inputs.thresholds[pos] = tail.thresholds[k];
                inputs.loss_steps[pos] = tail.loss_steps[k];
                inputs.recovery_steps[pos] = tail.recovery_steps[k];
            }
            let checkpoints = std::mem::take(&mut cache.states[d].checkpoints);
            cache.states[d] = self.solve_date(
                copula,
                &cache.loadings,
                cache.stride,
                t,
                &cache.realized,
                inputs,
                checkpoints,
                checkpoint,
            );
            recomputed += 1;
        }
        debug!(
            min_index,
            from_position = from,
            checkpoint,
            recomputed,
            dates = dates.len(),
            "heterogeneous refit"
        );
        let distribution = Self::distribution(&cache);
        self.cache = Some(cache);
        Ok(distribution)
    }

    fn reset(&mut self) {
        self.cache = None;
    }
}
