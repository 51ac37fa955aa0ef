//! Observability for fusion cycles.
//!
//! The [`CycleReporter`] trait receives callbacks at key points of a cycle
//! without polluting the engine logic. The default [`NoOpReporter`] compiles
//! to nothing.
//!
//! # Example
//!
//! ```
//! use sensor_fusion_tracker::reporter::{CycleReporter, DebugReporter};
//! use sensor_fusion_tracker::types::SensorId;
//!
//! let mut reporter = DebugReporter::new();
//! reporter.on_cycle_start(SensorId(0), 0.1, 3);
//! assert_eq!(reporter.cycle_starts().len(), 1);
//! ```

use nalgebra::DMatrix;

use crate::association::CostMatrix;
use crate::components::PredictedTrack;
use crate::errors::{AssociationError, NumericalError, TemporalOrderError};
use crate::types::{
    CycleOutput, MatchRecord, RejectedDetection, SensorId, TrackId, TrackSnapshot, TrackState,
};

// ============================================================================
// CycleReporter Trait
// ============================================================================

/// Observability trait for fusion cycles.
///
/// All methods default to no-ops; override the events you care about.
/// Callbacks take `&mut self`, so reporters need not be `Sync`.
///
/// # Example
///
/// ```
/// use sensor_fusion_tracker::reporter::CycleReporter;
/// use sensor_fusion_tracker::types::CycleOutput;
///
/// struct CountingReporter {
///     cycles: usize,
/// }
///
/// impl CycleReporter for CountingReporter {
///     fn on_cycle_complete(&mut self, _output: &CycleOutput) {
///         self.cycles += 1;
///     }
/// }
/// ```
pub trait CycleReporter {
    /// A batch passed the temporal check and a cycle begins
    fn on_cycle_start(&mut self, _sensor: SensorId, _timestamp: f64, _detections: usize) {}

    /// A detection was dropped before association
    fn on_detection_rejected(&mut self, _rejected: &RejectedDetection) {}

    /// Live tracks were predicted to the cycle time
    fn on_prediction(&mut self, _tracks: &[PredictedTrack<'_>]) {}

    /// The gated cost matrix was built
    fn on_cost_matrix(&mut self, _costs: &CostMatrix) {}

    /// Detections were assigned
    fn on_association(&mut self, _matches: &[MatchRecord]) {}

    /// A track failed numerically and will be deleted
    fn on_numerical_failure(&mut self, _track: TrackId, _error: &NumericalError) {}

    /// Tracks were spawned
    fn on_birth(&mut self, _tracks: &[TrackSnapshot]) {}

    /// Tracks were deleted
    fn on_deletion(&mut self, _tracks: &[TrackSnapshot]) {}

    /// The cycle was aborted and the track set left unchanged
    fn on_cycle_aborted(&mut self, _error: &AssociationError) {}

    /// A batch was rejected for temporal order
    fn on_batch_rejected(&mut self, _error: &TemporalOrderError) {}

    /// The cycle finished
    fn on_cycle_complete(&mut self, _output: &CycleOutput) {}
}

// ============================================================================
// NoOpReporter
// ============================================================================

/// Reporter that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReporter;

impl NoOpReporter {
    /// Create a new no-op reporter.
    pub fn new() -> Self {
        Self
    }
}

impl CycleReporter for NoOpReporter {}

// ============================================================================
// DebugReporter
// ============================================================================

/// Reporter that captures every event.
///
/// Stores clones of states and matrices; meant for tests and offline
/// debugging rather than long runs.
#[derive(Debug, Clone, Default)]
pub struct DebugReporter {
    cycle_starts: Vec<(SensorId, f64, usize)>,
    rejections: Vec<RejectedDetection>,
    predictions: Vec<Vec<(TrackId, TrackState)>>,
    cost_matrices: Vec<DMatrix<f64>>,
    associations: Vec<Vec<MatchRecord>>,
    failures: Vec<(TrackId, NumericalError)>,
    births: Vec<Vec<TrackSnapshot>>,
    deletions: Vec<Vec<TrackSnapshot>>,
    aborts: Vec<AssociationError>,
    rejected_batches: Vec<TemporalOrderError>,
    outputs: Vec<CycleOutput>,
}

impl DebugReporter {
    /// Create a new debug reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all captured events.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// (sensor, timestamp, detections) of every started cycle
    pub fn cycle_starts(&self) -> &[(SensorId, f64, usize)] {
        &self.cycle_starts
    }

    /// Dropped detections
    pub fn rejections(&self) -> &[RejectedDetection] {
        &self.rejections
    }

    /// Predicted states per cycle
    pub fn prediction_events(&self) -> &[Vec<(TrackId, TrackState)>] {
        &self.predictions
    }

    /// Cost matrices per cycle
    pub fn cost_matrices(&self) -> &[DMatrix<f64>] {
        &self.cost_matrices
    }

    /// Assignments per cycle
    pub fn association_events(&self) -> &[Vec<MatchRecord>] {
        &self.associations
    }

    /// Numerical failures
    pub fn failures(&self) -> &[(TrackId, NumericalError)] {
        &self.failures
    }

    /// Births per cycle
    pub fn birth_events(&self) -> &[Vec<TrackSnapshot>] {
        &self.births
    }

    /// Deletions per cycle
    pub fn deletion_events(&self) -> &[Vec<TrackSnapshot>] {
        &self.deletions
    }

    /// Aborted cycles
    pub fn aborts(&self) -> &[AssociationError] {
        &self.aborts
    }

    /// Rejected batches
    pub fn rejected_batches(&self) -> &[TemporalOrderError] {
        &self.rejected_batches
    }

    /// Completed cycle outputs
    pub fn outputs(&self) -> &[CycleOutput] {
        &self.outputs
    }

    /// Total number of captured events across all types.
    pub fn total_events(&self) -> usize {
        self.cycle_starts.len()
            + self.rejections.len()
            + self.predictions.len()
            + self.cost_matrices.len()
            + self.associations.len()
            + self.failures.len()
            + self.births.len()
            + self.deletions.len()
            + self.aborts.len()
            + self.rejected_batches.len()
            + self.outputs.len()
    }
}

impl CycleReporter for DebugReporter {
    fn on_cycle_start(&mut self, sensor: SensorId, timestamp: f64, detections: usize) {
        self.cycle_starts.push((sensor, timestamp, detections));
    }

    fn on_detection_rejected(&mut self, rejected: &RejectedDetection) {
        self.rejections.push(rejected.clone());
    }

    fn on_prediction(&mut self, tracks: &[PredictedTrack<'_>]) {
        self.predictions
            .push(tracks.iter().map(|p| (p.track.id, p.state.clone())).collect());
    }

    fn on_cost_matrix(&mut self, costs: &CostMatrix) {
        self.cost_matrices.push(costs.costs.clone());
    }

    fn on_association(&mut self, matches: &[MatchRecord]) {
        self.associations.push(matches.to_vec());
    }

    fn on_numerical_failure(&mut self, track: TrackId, error: &NumericalError) {
        self.failures.push((track, error.clone()));
    }

    fn on_birth(&mut self, tracks: &[TrackSnapshot]) {
        self.births.push(tracks.to_vec());
    }

    fn on_deletion(&mut self, tracks: &[TrackSnapshot]) {
        self.deletions.push(tracks.to_vec());
    }

    fn on_cycle_aborted(&mut self, error: &AssociationError) {
        self.aborts.push(error.clone());
    }

    fn on_batch_rejected(&mut self, error: &TemporalOrderError) {
        self.rejected_batches.push(error.clone());
    }

    fn on_cycle_complete(&mut self, output: &CycleOutput) {
        self.outputs.push(output.clone());
    }
}

// ============================================================================
// LoggingReporter
// ============================================================================

/// Reporter that emits events through the `log` crate.
///
/// - cycle completion: INFO
/// - births, deletions, rejections: DEBUG
/// - prediction, cost matrix, association: TRACE
/// - failures, aborts, rejected batches: WARN
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReporter {
    verbose: bool,
}

impl LoggingReporter {
    /// Create a new logging reporter.
    pub fn new() -> Self {
        Self { verbose: false }
    }

    /// Create a verbose logging reporter that includes per-track details.
    pub fn verbose() -> Self {
        Self { verbose: true }
    }
}

impl CycleReporter for LoggingReporter {
    fn on_cycle_start(&mut self, sensor: SensorId, timestamp: f64, detections: usize) {
        log::trace!("Cycle start: sensor {} t={:.3} ({} detections)", sensor, timestamp, detections);
    }

    fn on_detection_rejected(&mut self, rejected: &RejectedDetection) {
        log::debug!(
            "Detection {} from sensor {} rejected: {}",
            rejected.detection_id,
            rejected.sensor_id,
            rejected.reason
        );
    }

    fn on_prediction(&mut self, tracks: &[PredictedTrack<'_>]) {
        log::trace!("Prediction complete: {} tracks", tracks.len());
        if self.verbose {
            for p in tracks {
                log::trace!("  Track {}: position={:?}", p.track.id, p.state.position().as_slice());
            }
        }
    }

    fn on_cost_matrix(&mut self, costs: &CostMatrix) {
        log::trace!(
            "Cost matrix: {} tracks × {} detections, {} admissible",
            costs.num_tracks(),
            costs.num_detections(),
            costs.num_admissible()
        );
    }

    fn on_association(&mut self, matches: &[MatchRecord]) {
        log::trace!("Association: {} pairs", matches.len());
        if self.verbose {
            for m in matches {
                log::trace!("  Track {} ← detection {} (cost {:.4})", m.track_id, m.detection_id, m.cost);
            }
        }
    }

    fn on_numerical_failure(&mut self, track: TrackId, error: &NumericalError) {
        log::warn!("Track {} dropped: {}", track, error);
    }

    fn on_birth(&mut self, tracks: &[TrackSnapshot]) {
        log::debug!("Birth: {} new tracks", tracks.len());
    }

    fn on_deletion(&mut self, tracks: &[TrackSnapshot]) {
        log::debug!("Deletion: {} tracks", tracks.len());
        if self.verbose {
            for t in tracks {
                log::debug!("  Track {}: hits={}, misses={}, score={:.3}", t.track_id, t.hits, t.misses, t.score);
            }
        }
    }

    fn on_cycle_aborted(&mut self, error: &AssociationError) {
        log::warn!("Cycle aborted: {}", error);
    }

    fn on_batch_rejected(&mut self, error: &TemporalOrderError) {
        log::warn!("Batch rejected: {}", error);
    }

    fn on_cycle_complete(&mut self, output: &CycleOutput) {
        log::info!(
            "Cycle complete: t={:.3}, {} tracks ({} confirmed)",
            output.timestamp,
            output.tracks.len(),
            output.confirmed().count()
        );
    }
}

// ============================================================================
// CompositeReporter
// ============================================================================

/// Reporter that forwards events to two child reporters.
#[derive(Debug, Clone)]
pub struct CompositeReporter<A: CycleReporter, B: CycleReporter> {
    first: A,
    second: B,
}

impl<A: CycleReporter, B: CycleReporter> CompositeReporter<A, B> {
    /// Create a new composite reporter.
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }

    /// Get a reference to the first reporter.
    pub fn first(&self) -> &A {
        &self.first
    }

    /// Get a mutable reference to the first reporter.
    pub fn first_mut(&mut self) -> &mut A {
        &mut self.first
    }

    /// Get a reference to the second reporter.
    pub fn second(&self) -> &B {
        &self.second
    }

    /// Get a mutable reference to the second reporter.
    pub fn second_mut(&mut self) -> &mut B {
        &mut self.second
    }

    /// Consume and return both reporters.
    pub fn into_parts(self) -> (A, B) {
        (self.first, self.second)
    }
}

impl<A: CycleReporter, B: CycleReporter> CycleReporter for CompositeReporter<A, B> {
    fn on_cycle_start(&mut self, sensor: SensorId, timestamp: f64, detections: usize) {
        self.first.on_cycle_start(sensor, timestamp, detections);
        self.second.on_cycle_start(sensor, timestamp, detections);
    }

    fn on_detection_rejected(&mut self, rejected: &RejectedDetection) {
        self.first.on_detection_rejected(rejected);
        self.second.on_detection_rejected(rejected);
    }

    fn on_prediction(&mut self, tracks: &[PredictedTrack<'_>]) {
        self.first.on_prediction(tracks);
        self.second.on_prediction(tracks);
    }

    fn on_cost_matrix(&mut self, costs: &CostMatrix) {
        self.first.on_cost_matrix(costs);
        self.second.on_cost_matrix(costs);
    }

    fn on_association(&mut self, matches: &[MatchRecord]) {
        self.first.on_association(matches);
        self.second.on_association(matches);
    }

    fn on_numerical_failure(&mut self, track: TrackId, error: &NumericalError) {
        self.first.on_numerical_failure(track, error);
        self.second.on_numerical_failure(track, error);
    }

    fn on_birth(&mut self, tracks: &[TrackSnapshot]) {
        self.first.on_birth(tracks);
        self.second.on_birth(tracks);
    }

    fn on_deletion(&mut self, tracks: &[TrackSnapshot]) {
        self.first.on_deletion(tracks);
        self.second.on_deletion(tracks);
    }

    fn on_cycle_aborted(&mut self, error: &AssociationError) {
        self.first.on_cycle_aborted(error);
        self.second.on_cycle_aborted(error);
    }

    fn on_batch_rejected(&mut self, error: &TemporalOrderError) {
        self.first.on_batch_rejected(error);
        self.second.on_batch_rejected(error);
    }

    fn on_cycle_complete(&mut self, output: &CycleOutput) {
        self.first.on_cycle_complete(output);
        self.second.on_cycle_complete(output);
    }
}

// ============================================================================
// Tests
// ============================================================================
