//! Shared helpers for the integration tests
//!
//! - [`assertions`] - Tolerance comparisons and covariance checks
//! - [`fixtures`] - Frame rigs, engines and seeded target scenarios

#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;

/// Route `log` output through env_logger (`RUST_LOG=debug cargo test`)
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
