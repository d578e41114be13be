//! # qlcredit
//!
//! Loss distributions of credit baskets under one-factor copulas, and the
//! tranche and n-th-to-default pricers built on them.
//!
//! This crate is a **façade** that re-exports all public items from the
//! underlying workspace crates. Application code should depend on this
//! crate rather than the individual `ql-*` crates.
//!
//! ## Quick start
//!
//! ```toml
//! [dependencies]
//! qlcredit = "0.1"
//! ```
//!
//! ```rust
//! use qlcredit::credit::{
//!     BasketPricer, CopulaType, CorrelationModel, LossModelConfig, Name, NameCollection,
//! };
//! use qlcredit::termstructures::{FixedRecovery, FlatHazardRate};
//! use std::sync::Arc;
//!
//! let names: NameCollection = (0..10)
//!     .map(|i| {
//!         Name::new(
//!             format!("N{i}"),
//!             Arc::new(FlatHazardRate::new(0.02)),
//!             Arc::new(FixedRecovery::new(0.4)),
//!             1.0,
//!         )
//!     })
//!     .collect();
//! let mut basket = BasketPricer::new(
//!     names,
//!     CorrelationModel::Flat(0.3),
//!     CopulaType::Gaussian,
//!     &LossModelConfig::default(),
//! )?;
//! basket.compute(&[1.0, 5.0])?;
//! let equity = basket.tranche_expected_loss(0.0, 0.03, 5.0)?;
//! assert!(equity > 0.0 && equity <= 0.03);
//! # Ok::<(), qlcredit::core::Error>(())
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Core types, aliases, and error definitions.
pub use ql_core as core;

/// Mathematical utilities: distributions, quadrature, interpolation, RNG.
pub use ql_math as math;

/// Default-probability, recovery and discount curves.
pub use ql_termstructures as termstructures;

/// Copulas, loss distributions, baskets and tranche pricing.
pub use ql_credit as credit;
