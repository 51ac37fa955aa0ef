//! Common utilities shared by the tracking components.
//!
//! This module contains the assignment solver, linear algebra utilities,
//! and numerical constants used by the filter bank and association engine.

pub mod association;
pub mod constants;
pub mod linalg;
