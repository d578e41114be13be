//! One-factor copulas.
//!
//! Each name's latent variable is `X = S·(β·M + √(1 − β²)·Z)`, where `M` is
//! the systemic factor shared by all names, `Z` an idiosyncratic shock and `S`
//! a mixing scale (`S = 1` except for the Student-t copula, where
//! `S = √(ν/W)` with `W ~ χ²_ν` shared by all names).  A name has defaulted by
//! `t` when `X ≤ c(t)`, the latent threshold matching its unconditional
//! default probability.  Conditional on `(M, S)` names are independent.
//!
//! | family | `M` | `Z` | nodes |
//! |--------|-----|-----|-------|
//! | Gaussian | N(0,1) | N(0,1) | Gauss–Hermite |
//! | Student-t | N(0,1) | N(0,1) | Gauss–Hermite × generalized Gauss–Laguerre over `W/2` |
//! | double-t | unit-variance t(ν_M) | unit-variance t(ν_Z) | Gauss–Legendre on the factor's quantiles |

use ql_core::{errors::Result, Error, Probability, Real};
use ql_math::solvers1d::solve_increasing;
use ql_math::{
    normal_cdf, normal_cdf_inverse, GaussHermiteIntegration, GaussLaguerreIntegration,
    GaussLegendreIntegration, StudentTDistribution,
};
use rand::Rng;
use rand_distr::{ChiSquared, Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Copula family and parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum CopulaType {
    /// Gaussian factor copula.
    Gaussian,
    /// Student-t copula: factor and shocks share one chi-square mixing
    /// variable with `df` degrees of freedom.
    StudentT {
        /// Degrees of freedom, `> 0`.
        df: Real,
    },
    /// Double-t copula with independent unit-variance t factor and shocks.
    DoubleT {
        /// Degrees of freedom of the systemic factor, `> 2`.
        df_factor: Real,
        /// Degrees of freedom of the idiosyncratic shocks, `> 2`.
        df_idiosyncratic: Real,
    },
}

impl CopulaType {
    /// Check the parameters.
    ///
    /// # Errors
    /// Configuration error for non-positive (Student-t) or `≤ 2` (double-t)
    /// degrees of freedom.
    pub fn validate(&self) -> Result<()> {
        match *self {
            CopulaType::Gaussian => Ok(()),
            CopulaType::StudentT { df } => {
                StudentTDistribution::new(df)?;
                Ok(())
            }
            CopulaType::DoubleT {
                df_factor,
                df_idiosyncratic,
            } => {
                StudentTDistribution::unit_variance(df_factor)?;
                StudentTDistribution::unit_variance(df_idiosyncratic)?;
                Ok(())
            }
        }
    }
}

impl fmt::Display for CopulaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopulaType::Gaussian => write!(f, "gaussian"),
            CopulaType::StudentT { df } => write!(f, "student-t({df})"),
            CopulaType::DoubleT {
                df_factor,
                df_idiosyncratic,
            } => write!(f, "double-t({df_factor},{df_idiosyncratic})"),
        }
    }
}

impl FromStr for CopulaType {
    type Err = Error;

    /// Parse `gaussian`, `student-t(ν)` or `double-t(ν_M,ν_Z)`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        let (family, args) = match s.split_once('(') {
            Some((family, rest)) => {
                let args = rest.strip_suffix(')').ok_or_else(|| {
                    Error::Configuration(format!("unbalanced parentheses in copula '{s}'"))
                })?;
                let args = args
                    .split(',')
                    .map(|a| {
                        a.trim().parse::<Real>().map_err(|e| {
                            Error::Configuration(format!("bad copula parameter '{a}': {e}"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                (family.trim().to_string(), args)
            }
            None => (s.clone(), Vec::new()),
        };
        let copula = match (family.as_str(), args.as_slice()) {
            ("gaussian" | "normal", []) => CopulaType::Gaussian,
            ("student-t" | "t", [df]) => CopulaType::StudentT { df: *df },
            ("double-t", [df_factor, df_idiosyncratic]) => CopulaType::DoubleT {
                df_factor: *df_factor,
                df_idiosyncratic: *df_idiosyncratic,
            },
            _ => {
                return Err(Error::Configuration(format!(
                    "unsupported copula '{s}'; expected gaussian, student-t(df) or double-t(df_m,df_z)"
                )))
            }
        };
        copula.validate()?;
        Ok(copula)
    }
}

/// A quadrature node over the conditioning variables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorNode {
    /// Systemic factor value `m`.
    pub factor: Real,
    /// Mixing scale `s` (one unless Student-t).
    pub scale: Real,
    /// Quadrature weight; weights sum to one.
    pub weight: Real,
}

/// One simulated draw of the conditioning variables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemicDraw {
    /// Systemic factor value.
    pub factor: Real,
    /// Mixing scale.
    pub scale: Real,
}

#[derive(Debug, Clone)]
enum Family {
    Gaussian,
    StudentT {
        latent: StudentTDistribution,
        mixing: ChiSquared<Real>,
    },
    DoubleT {
        factor: StudentTDistribution,
        idiosyncratic: StudentTDistribution,
        factor_sampler: rand_distr::StudentT<Real>,
        idiosyncratic_sampler: rand_distr::StudentT<Real>,
    },
}

/// A factor copula ready for use by the loss strategies: family parameters,
/// quadrature nodes, latent CDF and its inverse, and samplers.
#[derive(Debug, Clone)]
pub struct FactorCopula {
    kind: CopulaType,
    family: Family,
    nodes: Vec<FactorNode>,
}

fn sampler_error(e: impl fmt::Display) -> Error {
    Error::Configuration(format!("invalid copula sampler parameters: {e}"))
}

impl FactorCopula {
    /// Build the copula with `order` factor nodes and, for Student-t,
    /// `mixing_order` nodes over the mixing variable.
    pub fn new(kind: CopulaType, order: usize, mixing_order: usize) -> Result<Self> {
        ql_core::config_error!(order > 0, "quadrature order must be positive");
        let (family, nodes) = match kind {
            CopulaType::Gaussian => {
                let nodes = GaussHermiteIntegration::standard_normal(order)
                    .iter()
                    .map(|(m, w)| FactorNode {
                        factor: m,
                        scale: 1.0,
                        weight: w,
                    })
                    .collect();
                (Family::Gaussian, nodes)
            }
            CopulaType::StudentT { df } => {
                let latent = StudentTDistribution::new(df)?;
                ql_core::config_error!(mixing_order > 0, "mixing order must be positive");
                let hermite = GaussHermiteIntegration::standard_normal(order);
                let laguerre = GaussLaguerreIntegration::gamma(mixing_order, df / 2.0);
                // W = 2Y with Y ~ Gamma(ν/2, 1); S = √(ν/W)
                let mut nodes = Vec::with_capacity(order * mixing_order);
                for (y, wy) in laguerre.iter() {
                    let scale = (df / (2.0 * y)).sqrt();
                    nodes.extend(hermite.iter().map(|(m, wm)| FactorNode {
                        factor: m,
                        scale,
                        weight: wm * wy,
                    }));
                }
                let mixing = ChiSquared::new(df).map_err(sampler_error)?;
                (Family::StudentT { latent, mixing }, nodes)
            }
            CopulaType::DoubleT {
                df_factor,
                df_idiosyncratic,
            } => {
                let factor = StudentTDistribution::unit_variance(df_factor)?;
                let idiosyncratic = StudentTDistribution::unit_variance(df_idiosyncratic)?;
                let nodes = GaussLegendreIntegration::unit_interval(order)
                    .iter()
                    .map(|(u, w)| FactorNode {
                        factor: factor.inverse_cdf(u),
                        scale: 1.0,
                        weight: w,
                    })
                    .collect();
                let family = Family::DoubleT {
                    factor,
                    idiosyncratic,
                    factor_sampler: rand_distr::StudentT::new(df_factor).map_err(sampler_error)?,
                    idiosyncratic_sampler: rand_distr::StudentT::new(df_idiosyncratic)
                        .map_err(sampler_error)?,
                };
                (family, nodes)
            }
        };
        Ok(Self {
            kind,
            family,
            nodes,
        })
    }

    /// Gaussian copula with `order` Gauss–Hermite nodes.
    pub fn gaussian(order: usize) -> Result<Self> {
        Self::new(CopulaType::Gaussian, order, 1)
    }

    /// Family and parameters.
    pub fn kind(&self) -> CopulaType {
        self.kind
    }

    /// Quadrature nodes over the conditioning variables.
    pub fn nodes(&self) -> &[FactorNode] {
        &self.nodes
    }

    fn idiosyncratic_cdf(&self, x: Real) -> Probability {
        match &self.family {
            Family::Gaussian | Family::StudentT { .. } => normal_cdf(x),
            Family::DoubleT { idiosyncratic, .. } => idiosyncratic.cdf(x),
        }
    }

    /// Default probability of a name with threshold `threshold` and loading
    /// `loading`, conditional on the node's factor and scale.
    pub fn conditional_default_probability(
        &self,
        threshold: Real,
        loading: Real,
        node: &FactorNode,
    ) -> Probability {
        let sigma = (1.0 - loading * loading).max(0.0).sqrt();
        let x = threshold / node.scale - loading * node.factor;
        if sigma == 0.0 {
            return if x >= 0.0 { 1.0 } else { 0.0 };
        }
        self.idiosyncratic_cdf(x / sigma)
    }

    /// Unconditional CDF of the latent variable of a name with the given
    /// loading.
    pub fn latent_cdf(&self, x: Real, loading: Real) -> Probability {
        match &self.family {
            Family::Gaussian => normal_cdf(x),
            Family::StudentT { latent, .. } => latent.cdf(x),
            Family::DoubleT {
                factor,
                idiosyncratic,
                ..
            } => {
                let sigma = (1.0 - loading * loading).max(0.0).sqrt();
                if sigma == 0.0 {
                    return factor.cdf(x);
                }
                self.nodes
                    .iter()
                    .map(|n| n.weight * idiosyncratic.cdf((x - loading * n.factor) / sigma))
                    .sum::<Real>()
                    .clamp(0.0, 1.0)
            }
        }
    }

    /// Latent default threshold matching unconditional default probability
    /// `p`.
    pub fn threshold(&self, p: Probability, loading: Real) -> Result<Real> {
        if p <= 0.0 {
            return Ok(Real::NEG_INFINITY);
        }
        if p >= 1.0 {
            return Ok(Real::INFINITY);
        }
        match &self.family {
            Family::Gaussian => Ok(normal_cdf_inverse(p)),
            Family::StudentT { latent, .. } => Ok(latent.inverse_cdf(p)),
            Family::DoubleT { .. } => solve_increasing(
                |x| self.latent_cdf(x, loading) - p,
                -1.0,
                1.0,
                None,
                1.0e-12,
            ),
        }
    }

    /// Draw the systemic factor and mixing scale.
    pub fn sample_systemic<R: Rng + ?Sized>(&self, rng: &mut R) -> SystemicDraw {
        match &self.family {
            Family::Gaussian => SystemicDraw {
                factor: StandardNormal.sample(rng),
                scale: 1.0,
            },
            Family::StudentT { latent, mixing } => {
                let factor: Real = StandardNormal.sample(rng);
                let w = mixing.sample(rng);
                SystemicDraw {
                    factor,
                    scale: (latent.df() / w).sqrt(),
                }
            }
            Family::DoubleT {
                factor,
                factor_sampler,
                ..
            } => SystemicDraw {
                factor: factor.scale() * factor_sampler.sample(rng),
                scale: 1.0,
            },
        }
    }

    /// Draw one idiosyncratic shock.
    pub fn sample_idiosyncratic<R: Rng + ?Sized>(&self, rng: &mut R) -> Real {
        match &self.family {
            Family::Gaussian | Family::StudentT { .. } => StandardNormal.sample(rng),
            Family::DoubleT {
                idiosyncratic,
                idiosyncratic_sampler,
                ..
            } => idiosyncratic.scale() * idiosyncratic_sampler.sample(rng),
        }
    }

    /// Latent variable of a name given a systemic draw and its shock.
    pub fn latent(&self, loading: Real, draw: &SystemicDraw, shock: Real) -> Real {
        let sigma = (1.0 - loading * loading).max(0.0).sqrt();
        draw.scale * (loading * draw.factor + sigma * shock)
    }

    /// `true` if the copula can drive a full correlation matrix (elliptical
    /// families only).
    pub fn supports_matrix(&self) -> bool {
        !matches!(self.family, Family::DoubleT { .. })
    }
}
