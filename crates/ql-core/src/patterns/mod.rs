//! Patterns sub-module: version stamps for mutable market objects.

pub mod versioned;
