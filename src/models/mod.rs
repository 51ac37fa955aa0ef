//! Motion and measurement models
//!
//! - [`motion`] - Kinematic models: constant velocity, constant acceleration, CTRV
//! - [`measurement`] - State → measurement mappings for aligned detections

pub mod measurement;
pub mod motion;

pub use measurement::MeasurementModel;
pub use motion::{Layout, MotionModel, Prediction};
