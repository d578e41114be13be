//! Probability distributions.
//!
//! Normal, Student-t and binomial distributions, delegating to the `statrs`
//! crate for special functions.

pub mod binomial;
pub mod normal;
pub mod student_t;

pub use binomial::BinomialDistribution;
pub use normal::{normal_cdf, normal_cdf_inverse, normal_pdf};
pub use student_t::StudentTDistribution;
