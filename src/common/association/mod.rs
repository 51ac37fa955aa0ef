//! Assignment solvers
pub mod hungarian;
