//! Track lifecycle
//!
//! - [`manager`] - Track set ownership, births, status transitions, deletion
//! - [`score`] - Sequential log-likelihood ratio track score

pub mod manager;
pub mod score;

pub use manager::{
    BirthCandidate, CommitSummary, CyclePlan, LifecycleRules, TrackManager, TrackOutcome,
};
pub use score::{existence_probability, ScoreConfig};
