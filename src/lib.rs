/*!
# Sensor fusion tracker - Multi-sensor object tracking core

Turns timestamped detections from heterogeneous sensors into a consistent
set of tracked objects with identities, kinematic state and uncertainty.

## Features

- Reference-frame tree with rigid transforms and moving frames
- Constant velocity, constant acceleration and CTRV motion models
- Kalman, extended Kalman and unscented Kalman filtering
- Gated global-nearest-neighbour association (Hungarian solver)
- Track lifecycle with score-based deletion and atomic cycles

## Modules

- [`geometry`] - Frames, transforms, detection alignment
- [`types`] - Detections, states, tracks, cycle output
- [`models`] - Motion and measurement models
- [`components`] - Filter bank: prediction and update
- [`association`] - Cost matrix and assignment
- [`lifecycle`] - Track manager and track score
- [`pipeline`] - The fusion engine
- [`common`] - Low-level utilities

## Example

```rust
use nalgebra::Vector3;
use sensor_fusion_tracker::{Detection, FrameTree, FusionEngine, ObservationBatch, SensorId, TrackerConfig};

let (frames, world) = FrameTree::with_root("world");
let mut engine = FusionEngine::new(TrackerConfig::default(), frames, world).unwrap();

for step in 0..3 {
    let t = step as f64 * 0.1;
    let detection = Detection::point(step, SensorId(0), t, world, Vector3::new(10.0 + t, 0.0, 0.0), 0.3);
    let output = engine.process(ObservationBatch::new(SensorId(0), t, world, vec![detection])).unwrap();
    println!("t={t:.1}: {} tracks", output.tracks.len());
}
assert_eq!(engine.tracks().len(), 1);
```
*/

// ============================================================================
// Core modules
// ============================================================================

/// Reference frames and rigid-body geometry
pub mod geometry;

/// Detections, states, tracks and cycle output
pub mod types;

/// Motion and measurement models
pub mod models;

/// Filter bank (prediction, update)
pub mod components;

/// Gated cost matrix and assignment strategies
pub mod association;

/// Track manager and track score
pub mod lifecycle;

/// Fusion engine
pub mod pipeline;

/// Cycle observers
pub mod reporter;

/// Tracker configuration
pub mod config;

/// Error types
pub mod errors;

/// Low-level utilities (linear algebra, constants, assignment solver)
pub mod common;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// Geometry
pub use geometry::{FrameId, FrameKinematics, FrameMotion, FrameTree, RigidTransform};

// Input and output types
pub use types::{
    BoxShape, CycleOutput, CycleReport, Detection, DetectionId, FusionStats, Geometry,
    ObjectEstimate, ObservationBatch, SensorId, Track, TrackId, TrackSnapshot, TrackState,
    TrackStatus,
};

// Models
pub use models::{Layout, MeasurementModel, MotionModel};

// Association
pub use association::{Associator, GlobalNearestNeighbor, GreedyNearestNeighbor};

// Configuration
pub use config::{CostFunction, ExtentNoise, FilterFamily, InitialUncertainty, LateDataPolicy, TrackerConfig};
pub use lifecycle::ScoreConfig;

// Errors
pub use errors::{
    AssociationError, ConfigError, DetectionError, FrameError, FusionError, NumericalError,
    RejectionReason, TemporalOrderError,
};

// Engine and reporters
pub use pipeline::FusionEngine;
pub use reporter::{CompositeReporter, CycleReporter, DebugReporter, LoggingReporter, NoOpReporter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
