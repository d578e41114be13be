//! 1D interpolation.
//!
//! Only piecewise-linear interpolation is needed by the credit layer (base
//! correlation by strike, recovery by time); the extrapolation policy beyond
//! the first and last node is explicit.

use ql_core::{errors::Result, Real};

/// A 1D interpolation function `f: R → R` defined by a set of known points.
pub trait Interpolation1D: std::fmt::Debug + Send + Sync {
    /// Evaluate the interpolation at `x`.
    fn operator(&self, x: Real) -> Real;

    /// Return the lower bound of the interpolation domain.
    fn x_min(&self) -> Real;

    /// Return the upper bound of the interpolation domain.
    fn x_max(&self) -> Real;

    /// Return `true` if `x` is within the interpolation range.
    fn is_in_range(&self, x: Real) -> bool {
        x >= self.x_min() && x <= self.x_max()
    }
}

/// Behaviour outside `[x_min, x_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extrapolation {
    /// Hold the boundary value.
    #[default]
    Flat,
    /// Extend the first / last segment.
    Linear,
}

// ── Linear ────────────────────────────────────────────────────────────────────

/// Linear interpolation.
///
/// `f(x) = y[i] + (y[i+1] - y[i]) * (x - x[i]) / (x[i+1] - x[i])`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearInterpolation {
    xs: Vec<Real>,
    ys: Vec<Real>,
    extrapolation: Extrapolation,
}

impl LinearInterpolation {
    /// Construct a linear interpolation from strictly increasing `xs` and
    /// corresponding `ys`.
    ///
    /// A single point is accepted and yields a constant function.
    ///
    /// # Errors
    /// Returns an error if the slices are empty, have different lengths, or
    /// `xs` is not strictly increasing.
    pub fn new(xs: &[Real], ys: &[Real], extrapolation: Extrapolation) -> Result<Self> {
        ql_core::ensure!(!xs.is_empty(), "need at least 1 point for interpolation");
        ql_core::ensure!(
            xs.len() == ys.len(),
            "xs and ys must have the same length ({} vs {})",
            xs.len(),
            ys.len()
        );
        ql_core::ensure!(
            xs.windows(2).all(|w| w[1] > w[0]),
            "interpolation nodes must be strictly increasing"
        );
        Ok(Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            extrapolation,
        })
    }

    /// Interpolation nodes.
    pub fn xs(&self) -> &[Real] {
        &self.xs
    }

    /// Interpolated values at the nodes.
    pub fn ys(&self) -> &[Real] {
        &self.ys
    }

    fn locate(&self, x: Real) -> usize {
        let n = self.xs.len();
        self.xs[1..n - 1].partition_point(|&xi| xi <= x)
    }
}

impl Interpolation1D for LinearInterpolation {
    fn x_min(&self) -> Real {
        self.xs[0]
    }

    fn x_max(&self) -> Real {
        self.xs[self.xs.len() - 1]
    }

    fn operator(&self, x: Real) -> Real {
        let n = self.xs.len();
        if n == 1 {
            return self.ys[0];
        }
        if self.extrapolation == Extrapolation::Flat {
            if x <= self.xs[0] {
                return self.ys[0];
            }
            if x >= self.xs[n - 1] {
                return self.ys[n - 1];
            }
        }
        let i = self.locate(x);
        let dx = self.xs[i + 1] - self.xs[i];
        self.ys[i] + (x - self.xs[i]) * (self.ys[i + 1] - self.ys[i]) / dx
    }
}
