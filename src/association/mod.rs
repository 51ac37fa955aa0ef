//! Data association
//!
//! - [`likelihood`] - Pairwise innovation, cost and appearance distance
//! - [`builder`] - Gated cost matrix over all (track, detection) pairs
//! - [`engine`] - Assignment strategies
//! - [`hungarian`] - Minimum-cost assignment solver

pub mod builder;
pub mod engine;
pub mod likelihood;

pub use crate::common::association::hungarian;
pub use crate::common::association::hungarian::hungarian;

pub use builder::{CostMatrix, CostMatrixBuilder};
pub use engine::{
    extended_cost_matrix, Association, Associator, GlobalNearestNeighbor, GreedyNearestNeighbor, Match,
};
pub use likelihood::{appearance_distance, compute_likelihood, PairLikelihood};
