//! Dependence structure among the names of a basket.
//!
//! Factor models (a flat pairwise correlation or one loading per name) feed
//! the semi-analytic strategies.  A full correlation matrix can only be
//! simulated.  Base correlation by strike lives with its own basket in
//! [`crate::base_correlation`].

use nalgebra::{Cholesky, DMatrix};
use ql_core::{errors::Result, Error, Real, ValidationErrors};

/// Correlation model of a basket.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrelationModel {
    /// Same pairwise correlation `ρ ∈ [0, 1]` for every pair; each name loads
    /// `√ρ` on the systemic factor.
    Flat(Real),
    /// One systemic-factor loading per name, each in `[-1, 1]`.
    FactorLoadings(Vec<Real>),
    /// Full pairwise correlation matrix.  Must be positive semi-definite;
    /// this is not checked beyond what the Cholesky factorisation needs.
    Matrix(DMatrix<Real>),
}

impl CorrelationModel {
    /// `true` for single-factor models.
    pub fn is_factor_model(&self) -> bool {
        !matches!(self, CorrelationModel::Matrix(_))
    }

    /// Factor loading of name `i`.
    ///
    /// # Errors
    /// Configuration error for a full matrix, which has no loadings.
    pub fn loading(&self, i: usize) -> Result<Real> {
        match self {
            CorrelationModel::Flat(rho) => Ok(rho.sqrt()),
            CorrelationModel::FactorLoadings(betas) => {
                betas.get(i).copied().ok_or(Error::IndexOutOfRange {
                    index: i,
                    size: betas.len(),
                })
            }
            CorrelationModel::Matrix(_) => Err(Error::Configuration(
                "a full correlation matrix has no factor loadings; use the Monte Carlo strategy"
                    .to_string(),
            )),
        }
    }

    /// Factor loadings of the first `n` names.
    pub fn loadings(&self, n: usize) -> Result<Vec<Real>> {
        (0..n).map(|i| self.loading(i)).collect()
    }

    /// Pairwise correlation between names `i` and `j`.
    pub fn correlation(&self, i: usize, j: usize) -> Result<Real> {
        if i == j {
            return Ok(1.0);
        }
        match self {
            CorrelationModel::Matrix(m) => {
                if i >= m.nrows() || j >= m.nrows() {
                    return Err(Error::IndexOutOfRange {
                        index: i.max(j),
                        size: m.nrows(),
                    });
                }
                Ok(m[(i, j)])
            }
            _ => Ok(self.loading(i)? * self.loading(j)?),
        }
    }

    /// Record every problem with the model for a basket of `n` names.
    pub fn validate(&self, n: usize, errors: &mut ValidationErrors) {
        match self {
            CorrelationModel::Flat(rho) => {
                errors.check((0.0..=1.0).contains(rho), || {
                    format!("flat correlation must be in [0, 1], got {rho}")
                });
            }
            CorrelationModel::FactorLoadings(betas) => {
                errors.check(betas.len() == n, || {
                    format!("{} factor loadings given for {n} names", betas.len())
                });
                for (i, beta) in betas.iter().enumerate() {
                    errors.check((-1.0..=1.0).contains(beta), || {
                        format!("factor loading {i} must be in [-1, 1], got {beta}")
                    });
                }
            }
            CorrelationModel::Matrix(m) => {
                errors.check(m.nrows() == n && m.ncols() == n, || {
                    format!(
                        "correlation matrix is {}x{} for {n} names",
                        m.nrows(),
                        m.ncols()
                    )
                });
                if m.nrows() != m.ncols() {
                    return;
                }
                for i in 0..m.nrows() {
                    errors.check(m[(i, i)] == 1.0, || {
                        format!("correlation matrix diagonal entry {i} is {}", m[(i, i)])
                    });
                    for j in 0..i {
                        errors.check(m[(i, j)] == m[(j, i)], || {
                            format!("correlation matrix is not symmetric at ({i}, {j})")
                        });
                        errors.check((-1.0..=1.0).contains(&m[(i, j)]), || {
                            format!("correlation ({i}, {j}) = {} outside [-1, 1]", m[(i, j)])
                        });
                    }
                }
            }
        }
    }

    /// Lower Cholesky factor of the correlation matrix, for simulation.
    ///
    /// Singular (semi-definite) matrices are regularised with a tiny diagonal
    /// shift before giving up.
    pub fn cholesky(&self, n: usize) -> Result<DMatrix<Real>> {
        let matrix = match self {
            CorrelationModel::Matrix(m) => m.clone(),
            _ => DMatrix::from_fn(n, n, |i, j| {
                if i == j {
                    1.0
                } else {
                    self.correlation(i, j).unwrap_or(0.0)
                }
            }),
        };
        if let Some(chol) = Cholesky::new(matrix.clone()) {
            return Ok(chol.l());
        }
        let shifted = matrix + DMatrix::identity(n, n) * 1.0e-12;
        Cholesky::new(shifted)
            .map(|chol| chol.l())
            .ok_or_else(|| {
                Error::Domain("correlation matrix is not positive semi-definite".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn flat_correlation_loads_square_root() {
        let model = CorrelationModel::Flat(0.3);
        assert_abs_diff_eq!(model.loading(4).unwrap(), 0.3f64.sqrt());
        assert_abs_diff_eq!(model.correlation(0, 1).unwrap(), 0.3, epsilon = 1e-15);
        assert_eq!(model.correlation(2, 2).unwrap(), 1.0);
    }

    #[test]
    fn matrix_has_no_loadings() {
        let model = CorrelationModel::Matrix(DMatrix::identity(3, 3));
        assert!(matches!(model.loading(0), Err(Error::Configuration(_))));
        assert!(!model.is_factor_model());
    }

    #[test]
    fn validation_flags_bad_inputs() {
        let mut errors = ValidationErrors::new();
        CorrelationModel::FactorLoadings(vec![0.5, 1.2]).validate(3, &mut errors);
        assert_eq!(errors.len(), 2);

        let mut errors = ValidationErrors::new();
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 0.4, 0.3, 1.0]);
        CorrelationModel::Matrix(m).validate(2, &mut errors);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn cholesky_reproduces_matrix() {
        let m = DMatrix::from_row_slice(3, 3, &[1.0, 0.5, 0.2, 0.5, 1.0, 0.3, 0.2, 0.3, 1.0]);
        let l = CorrelationModel::Matrix(m.clone()).cholesky(3).unwrap();
        let back = &l * l.transpose();
        for (a, b) in back.iter().zip(m.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-14);
        }
    }

    #[test]
    fn perfectly_correlated_pool_factorises() {
        let l = CorrelationModel::Flat(1.0).cholesky(3).unwrap();
        assert_abs_diff_eq!(l[(2, 0)], 1.0, epsilon = 1e-5);
    }
}
