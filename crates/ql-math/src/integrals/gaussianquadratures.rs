//! Gaussian quadrature rules.
//!
//! Nodes and weights come from the Golub–Welsch eigenvalue method applied to
//! the three-term recurrence of each orthogonal-polynomial family.  Besides
//! the classical weight functions, each family has a *probability-normalised*
//! constructor whose weights sum to one, so that `Σ wᵢ f(xᵢ)` approximates an
//! expectation directly:
//!
//! | constructor | approximates |
//! |-------------|--------------|
//! | [`GaussHermiteIntegration::standard_normal`] | `E[f(Z)]`, `Z ~ N(0, 1)` |
//! | [`GaussLaguerreIntegration::gamma`] | `E[f(Y)]`, `Y ~ Gamma(k, 1)` |
//! | [`GaussLegendreIntegration::unit_interval`] | `E[f(U)]`, `U ~ U(0, 1)` |

use ql_core::Real;
use std::f64::consts::PI;

/// A Gauss quadrature rule defined by nodes and weights.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianQuadrature {
    x: Vec<Real>,
    w: Vec<Real>,
}

impl GaussianQuadrature {
    /// Quadrature nodes, in increasing order.
    pub fn x(&self) -> &[Real] {
        &self.x
    }

    /// Quadrature weights.
    pub fn w(&self) -> &[Real] {
        &self.w
    }

    /// Number of quadrature points.
    pub fn order(&self) -> usize {
        self.x.len()
    }

    /// Evaluate `Σ wᵢ f(xᵢ)`.
    pub fn integrate<F: Fn(Real) -> Real>(&self, f: F) -> Real {
        self.x.iter().zip(self.w.iter()).map(|(&xi, &wi)| wi * f(xi)).sum()
    }

    /// Iterate over `(node, weight)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Real, Real)> + '_ {
        self.x.iter().copied().zip(self.w.iter().copied())
    }

    /// Apply an affine change of variable `x ↦ a + b·x` and scale the weights
    /// by `c`.
    fn transformed(self, a: Real, b: Real, c: Real) -> Self {
        Self {
            x: self.x.into_iter().map(|x| a + b * x).collect(),
            w: self.w.into_iter().map(|w| c * w).collect(),
        }
    }
}

// ── Gauss-Legendre ────────────────────────────────────────────────────────────

/// Gauss-Legendre quadrature on [−1, 1].
pub struct GaussLegendreIntegration;

impl GaussLegendreIntegration {
    /// Gauss-Legendre rule of the given `order` on [−1, 1] (weights sum to 2).
    pub fn new(order: usize) -> GaussianQuadrature {
        // Monic Legendre recurrence: αᵢ = 0, βᵢ = i² / (4i² − 1), μ₀ = 2.
        let alpha = vec![0.0; order];
        let beta: Vec<Real> = (0..order)
            .map(|i| {
                if i == 0 {
                    2.0
                } else {
                    let i2 = (i * i) as Real;
                    i2 / (4.0 * i2 - 1.0)
                }
            })
            .collect();
        golub_welsch(&alpha, &beta)
    }

    /// Rule on the open unit interval with weights summing to one.
    pub fn unit_interval(order: usize) -> GaussianQuadrature {
        Self::new(order).transformed(0.5, 0.5, 0.5)
    }

    /// Integrate `f` on [a, b].
    pub fn integrate<F: Fn(Real) -> Real>(order: usize, f: F, a: Real, b: Real) -> Real {
        let half = 0.5 * (b - a);
        let mid = 0.5 * (a + b);
        Self::new(order).integrate(|x| f(mid + half * x)) * half
    }
}

// ── Gauss-Hermite ─────────────────────────────────────────────────────────────

/// Gauss-Hermite quadrature.
pub struct GaussHermiteIntegration;

impl GaussHermiteIntegration {
    /// Physicists' convention: weight `e^{-x²}` on ℝ (weights sum to √π).
    pub fn new(order: usize) -> GaussianQuadrature {
        // Monic Hermite recurrence: αᵢ = 0, βᵢ = i/2, μ₀ = √π.
        let alpha = vec![0.0; order];
        let beta: Vec<Real> = (0..order)
            .map(|i| if i == 0 { PI.sqrt() } else { (i as Real) / 2.0 })
            .collect();
        golub_welsch(&alpha, &beta)
    }

    /// Expectation under the standard normal density.
    ///
    /// `E[f(Z)] ≈ Σ wᵢ f(xᵢ)` with `xᵢ = √2·hᵢ`, `wᵢ = ηᵢ/√π`.
    pub fn standard_normal(order: usize) -> GaussianQuadrature {
        Self::new(order).transformed(0.0, std::f64::consts::SQRT_2, 1.0 / PI.sqrt())
    }
}

// ── Gauss-Laguerre ────────────────────────────────────────────────────────────

/// Generalized Gauss-Laguerre quadrature (weight `x^s e^{-x}` on [0, ∞)).
pub struct GaussLaguerreIntegration;

impl GaussLaguerreIntegration {
    /// Build a generalized Gauss-Laguerre rule; weights sum to `Γ(s + 1)`.
    pub fn new(order: usize, s: Real) -> GaussianQuadrature {
        // Recurrence: αᵢ = 2i + 1 + s, βᵢ = i(i + s), μ₀ = Γ(s + 1).
        let alpha: Vec<Real> = (0..order).map(|i| 2.0 * (i as Real) + 1.0 + s).collect();
        let beta: Vec<Real> = (0..order)
            .map(|i| {
                if i == 0 {
                    statrs::function::gamma::gamma(s + 1.0)
                } else {
                    (i as Real) * ((i as Real) + s)
                }
            })
            .collect();
        golub_welsch(&alpha, &beta)
    }

    /// Expectation under a `Gamma(shape, 1)` density (weights sum to one).
    ///
    /// Uses the generalized weights in log space so that large shapes do not
    /// overflow `Γ(shape)`.
    pub fn gamma(order: usize, shape: Real) -> GaussianQuadrature {
        let s = shape - 1.0;
        let alpha: Vec<Real> = (0..order).map(|i| 2.0 * (i as Real) + 1.0 + s).collect();
        let beta: Vec<Real> = (0..order)
            .map(|i| if i == 0 { 1.0 } else { (i as Real) * ((i as Real) + s) })
            .collect();
        golub_welsch(&alpha, &beta)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Golub-Welsch algorithm
// ═══════════════════════════════════════════════════════════════════════════════

/// Golub-Welsch for a general three-term recurrence.
///
/// `alpha[i]` are the diagonal coefficients; `beta[0]` is the total mass `μ₀`
/// and `beta[i]` for `i > 0` are the squared sub-diagonal elements.
fn golub_welsch(alpha: &[Real], beta: &[Real]) -> GaussianQuadrature {
    let n = alpha.len();
    if n == 0 {
        return GaussianQuadrature {
            x: vec![],
            w: vec![],
        };
    }
    if n == 1 {
        return GaussianQuadrature {
            x: vec![alpha[0]],
            w: vec![beta[0]],
        };
    }

    let mut diag = alpha.to_vec();
    let mut off: Vec<Real> = (1..n).map(|i| beta[i].abs().sqrt()).collect();

    let (eigenvalues, first_components) = symmetric_tridiagonal_qr(&mut diag, &mut off);

    let mu0 = beta[0];
    let w: Vec<Real> = first_components.iter().map(|v| mu0 * v * v).collect();

    GaussianQuadrature { x: eigenvalues, w }
}

/// Implicit-shift QR iteration for a symmetric tridiagonal matrix.
///
/// Returns the eigenvalues in increasing order together with the first
/// component of each normalised eigenvector (all Golub–Welsch needs).
fn symmetric_tridiagonal_qr(diag: &mut [Real], off: &mut [Real]) -> (Vec<Real>, Vec<Real>) {
    let n = diag.len();
    let mut z: Vec<Vec<Real>> = (0..n)
        .map(|i| {
            let mut row = vec![0.0; n];
            row[i] = 1.0;
            row
        })
        .collect();

    let max_iter = 100 * n;
    let mut m = n;

    for _ in 0..max_iter {
        if m <= 1 {
            break;
        }

        // Largest unreduced block ending at m - 1
        let mut l = m - 1;
        while l > 0 && off[l - 1].abs() > 1e-15 * (diag[l - 1].abs() + diag[l].abs()) {
            l -= 1;
        }

        if l == m - 1 {
            m -= 1;
            continue;
        }

        // Wilkinson shift
        let d = (diag[m - 2] - diag[m - 1]) / 2.0;
        let b2 = off[m - 2] * off[m - 2];
        let mu = if d.abs() < 1e-300 {
            diag[m - 1] - off[m - 2].abs()
        } else {
            diag[m - 1] - b2 / (d + d.signum() * (d * d + b2).sqrt())
        };

        let mut x = diag[l] - mu;
        let mut y = off[l];

        for k in l..(m - 1) {
            let (c, s) = if x.abs() > y.abs() {
                let t = -y / x;
                let c = 1.0 / (1.0 + t * t).sqrt();
                (c, c * t)
            } else if y.abs() > 1e-300 {
                let t = -x / y;
                let s = 1.0 / (1.0 + t * t).sqrt();
                (s * t, s)
            } else {
                (1.0, 0.0)
            };

            let w = c * x - s * y;
            let dk = diag[k] - diag[k + 1];
            let zk = (2.0 * c * off[k] + dk * s) * s;
            diag[k] -= zk;
            diag[k + 1] += zk;
            if k > l {
                off[k - 1] = w;
            }
            off[k] = dk * c * s + (c * c - s * s) * off[k];

            for row in z.iter_mut() {
                let t0 = row[k];
                let t1 = row[k + 1];
                row[k] = c * t0 - s * t1;
                row[k + 1] = s * t0 + c * t1;
            }

            x = off[k];
            if k < m - 2 {
                y = -s * off[k + 1];
                off[k + 1] *= c;
            }
        }
    }

    let mut idx: Vec<usize> = (0..n).collect();
    idx.sort_by(|&a, &b| diag[a].total_cmp(&diag[b]));

    let eigenvalues = idx.iter().map(|&i| diag[i]).collect();
    let first_components = idx.iter().map(|&i| z[0][i]).collect();
    (eigenvalues, first_components)
}
