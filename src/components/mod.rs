//! Filter bank
//!
//! Per-track Gaussian estimation shared by every motion and measurement
//! model:
//!
//! - [`prediction`] - Time update to the cycle timestamp
//! - [`update`] - Measurement update, innovation and gating statistics
//! - [`unscented`] - Sigma points and weighted moments

pub mod prediction;
pub mod unscented;
pub mod update;

pub use prediction::{predict, predict_to, predict_tracks, PredictedTrack};
pub use unscented::{SigmaPoints, UnscentedParams};
pub use update::{apply_innovation, innovation, update, Innovation, UpdateOutcome};
