//! Output types for fusion cycles
//!
//! Everything handed to callers is an owned value: snapshots of the track
//! set, a per-cycle report and running counters.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use super::detection::{BoxShape, DetectionId, SensorId};
use super::track::{TrackId, TrackStatus};
use crate::errors::{NumericalError, RejectionReason};
use crate::geometry::{FrameId, FrameKinematics};
use crate::models::MotionModel;

/// Immutable copy of a track at the end of a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    /// Track id
    pub track_id: TrackId,
    /// Lifecycle status
    pub status: TrackStatus,
    /// State mean
    pub mean: DVector<f64>,
    /// State covariance
    pub covariance: DMatrix<f64>,
    /// Motion model of the state
    pub motion: MotionModel,
    /// Frame of the state
    pub frame_id: FrameId,
    /// Time the state refers to
    pub timestamp: f64,
    /// Position, zero-padded to three axes
    pub position: Vector3<f64>,
    /// Cartesian velocity, zero-padded to three axes
    pub velocity: Vector3<f64>,
    /// Spawn time
    pub created_at: f64,
    /// Time of the last associated detection
    pub last_update: f64,
    /// Total hits
    pub hits: u32,
    /// Consecutive misses
    pub misses: u32,
    /// Track score (negative log-likelihood ratio)
    pub score: f64,
    /// Object class
    pub class_label: Option<String>,
    /// Last observed shape
    pub shape: Option<BoxShape>,
}

impl TrackSnapshot {
    /// Position covariance, zero-padded to 3×3
    pub fn position_covariance(&self) -> Matrix3<f64> {
        let d = self.motion.position_dim();
        Matrix3::from_fn(|i, j| {
            if i < d && j < d {
                self.covariance[(i, j)]
            } else {
                0.0
            }
        })
    }

    /// Kinematic summary in the snapshot's own frame
    pub fn estimate(&self) -> ObjectEstimate {
        ObjectEstimate {
            track_id: self.track_id,
            status: self.status,
            frame_id: self.frame_id,
            timestamp: self.timestamp,
            position: self.position,
            velocity: self.velocity,
            position_covariance: self.position_covariance(),
            class_label: self.class_label.clone(),
            shape: self.shape,
        }
    }
}

/// Position, velocity and extent of a track in some frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectEstimate {
    /// Track id
    pub track_id: TrackId,
    /// Lifecycle status
    pub status: TrackStatus,
    /// Frame the estimate is expressed in
    pub frame_id: FrameId,
    /// Time of the estimate
    pub timestamp: f64,
    /// Position
    pub position: Vector3<f64>,
    /// Velocity relative to `frame_id`
    pub velocity: Vector3<f64>,
    /// Position covariance
    pub position_covariance: Matrix3<f64>,
    /// Object class
    pub class_label: Option<String>,
    /// Box shape with orientation relative to `frame_id`
    pub shape: Option<BoxShape>,
}

impl ObjectEstimate {
    /// Re-express the estimate through `kinematics` (current frame → `frame_id`).
    ///
    /// Velocities pick up the relative motion of the frames.
    pub fn transformed(&self, kinematics: &FrameKinematics, frame_id: FrameId) -> ObjectEstimate {
        let (position, velocity) = kinematics.transform_velocity(&self.position, &self.velocity);
        let transform = &kinematics.transform;
        ObjectEstimate {
            frame_id,
            position,
            velocity,
            position_covariance: transform.transform_covariance(&self.position_covariance),
            shape: self.shape.map(|shape| BoxShape {
                size: shape.size,
                orientation: transform.transform_orientation(&shape.orientation),
            }),
            ..self.clone()
        }
    }
}

/// A detection dropped before association
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedDetection {
    /// Detection id
    pub detection_id: DetectionId,
    /// Producing sensor
    pub sensor_id: SensorId,
    /// Why it was dropped
    pub reason: RejectionReason,
}

/// One associated (track, detection) pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Track id
    pub track_id: TrackId,
    /// Detection id
    pub detection_id: DetectionId,
    /// Assignment cost of the pair
    pub cost: f64,
}

/// What happened during one cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Sensor of the processed batch
    pub sensor_id: Option<SensorId>,
    /// Detections in the batch
    pub detections_received: usize,
    /// Detections that survived validation and alignment
    pub detections_aligned: usize,
    /// Detections dropped before association
    pub rejected: Vec<RejectedDetection>,
    /// Associated pairs, ascending track id
    pub matches: Vec<MatchRecord>,
    /// Live tracks without a detection
    pub unmatched_tracks: Vec<TrackId>,
    /// Detections without a track
    pub unmatched_detections: Vec<DetectionId>,
    /// Tracks spawned this cycle
    pub born: Vec<TrackId>,
    /// Tracks removed by numerical failure
    pub numerical_failures: Vec<(TrackId, NumericalError)>,
}

/// Result of one fusion cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutput {
    /// Batch timestamp
    pub timestamp: f64,
    /// Live tracks after the cycle, ascending id
    pub tracks: Vec<TrackSnapshot>,
    /// Tracks deleted during the cycle
    pub deleted: Vec<TrackSnapshot>,
    /// Cycle diagnostics
    pub report: CycleReport,
}

impl CycleOutput {
    /// Snapshots of confirmed and coasting tracks
    pub fn confirmed(&self) -> impl Iterator<Item = &TrackSnapshot> {
        self.tracks.iter().filter(|t| t.status.is_confirmed())
    }

    /// Snapshot of a live track by id
    pub fn track(&self, id: TrackId) -> Option<&TrackSnapshot> {
        self.tracks.iter().find(|t| t.track_id == id)
    }
}

/// Running counters of an engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionStats {
    /// Cycles completed
    pub cycles: u64,
    /// Batches rejected for temporal order
    pub batches_rejected: u64,
    /// Batches currently held in the reorder buffer
    pub batches_buffered: u64,
    /// Detections dropped before association
    pub detections_dropped: u64,
    /// Tracks deleted after a numerical failure
    pub numerical_failures: u64,
    /// Cycles aborted by an association error
    pub cycles_aborted: u64,
    /// Tracks spawned
    pub tracks_born: u64,
    /// Tracks deleted
    pub tracks_deleted: u64,
}
