//! Core data types
//!
//! - [`Detection`] / [`ObservationBatch`] - Sensor input
//! - [`TrackState`] - Gaussian state under a motion model
//! - [`Track`] - Lifecycle record of one object
//! - [`TrackSnapshot`] / [`CycleOutput`] - Per-cycle output

pub mod detection;
pub mod output;
pub mod state;
pub mod track;

pub use detection::{BoxShape, Detection, DetectionId, Geometry, ObservationBatch, SensorId};
pub use output::{
    CycleOutput, CycleReport, FusionStats, MatchRecord, ObjectEstimate, RejectedDetection,
    TrackSnapshot,
};
pub use state::TrackState;
pub use track::{HistoryEntry, Track, TrackHistory, TrackId, TrackStatus};
