//! Fusion engine
//!
//! [`FusionEngine`] runs one cycle per observation batch:
//!
//! ```text
//! batch ─▶ temporal check ─▶ align ─▶ predict ─▶ gate + assign ─▶ plan ─▶ commit ─▶ CycleOutput
//! ```
//!
//! Everything up to the plan reads the track set without modifying it. An
//! association failure aborts the cycle before the commit, so the engine
//! is left exactly as it was. Per-detection and per-track failures are
//! isolated: the detection is dropped or the track deleted, and the cycle
//! continues.

use std::collections::{BTreeMap, HashSet};

use log::{debug, trace, warn};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::association::{Associator, CostMatrixBuilder, GlobalNearestNeighbor};
use crate::components::{apply_innovation, predict_tracks, update};
use crate::config::{LateDataPolicy, TrackerConfig};
use crate::errors::{DetectionError, FrameError, FusionError, NumericalError, TemporalOrderError};
use crate::geometry::{align_detection, AlignedDetection, FrameId, FrameTree};
use crate::lifecycle::{CyclePlan, LifecycleRules, TrackManager, TrackOutcome};
use crate::reporter::{CycleReporter, NoOpReporter};
use crate::types::{
    CycleOutput, CycleReport, FusionStats, MatchRecord, ObjectEstimate, ObservationBatch,
    RejectedDetection, SensorId, Track, TrackId, TrackSnapshot,
};

/// Multi-sensor tracker.
///
/// Owns its frame tree, track set and counters; several engines can run side
/// by side without sharing state.
///
/// # Example
///
/// ```
/// use nalgebra::Vector3;
/// use sensor_fusion_tracker::config::TrackerConfig;
/// use sensor_fusion_tracker::geometry::FrameTree;
/// use sensor_fusion_tracker::pipeline::FusionEngine;
/// use sensor_fusion_tracker::types::{Detection, ObservationBatch, SensorId};
///
/// let (frames, world) = FrameTree::with_root("world");
/// let mut engine = FusionEngine::new(TrackerConfig::default(), frames, world).unwrap();
///
/// let detection = Detection::point(1, SensorId(0), 0.0, world, Vector3::new(5.0, 2.0, 0.0), 0.5);
/// let batch = ObservationBatch::new(SensorId(0), 0.0, world, vec![detection]);
/// let output = engine.process(batch).unwrap();
/// assert_eq!(output.tracks.len(), 1);
/// ```
pub struct FusionEngine<R: CycleReporter = NoOpReporter> {
    config: TrackerConfig,
    frames: FrameTree,
    fusion_frame: FrameId,
    manager: TrackManager,
    builder: CostMatrixBuilder,
    associator: Box<dyn Associator>,
    reporter: R,
    last_timestamp: Option<f64>,
    sensor_timestamps: BTreeMap<SensorId, f64>,
    buffer: Vec<ObservationBatch>,
    newest_seen: Option<f64>,
    stats: FusionStats,
}

impl FusionEngine<NoOpReporter> {
    /// Create an engine tracking in `fusion_frame`.
    ///
    /// Fails if the configuration is invalid or the frame is not registered.
    pub fn new(config: TrackerConfig, frames: FrameTree, fusion_frame: FrameId) -> Result<Self, FusionError> {
        config.validate()?;
        frames.get(fusion_frame)?;
        Ok(Self {
            manager: TrackManager::new(LifecycleRules::from(&config)),
            builder: CostMatrixBuilder::from_config(&config),
            associator: Box::new(GlobalNearestNeighbor),
            reporter: NoOpReporter,
            config,
            frames,
            fusion_frame,
            last_timestamp: None,
            sensor_timestamps: BTreeMap::new(),
            buffer: Vec::new(),
            newest_seen: None,
            stats: FusionStats::default(),
        })
    }
}

impl<R: CycleReporter> FusionEngine<R> {
    /// Replace the reporter
    pub fn with_reporter<R2: CycleReporter>(self, reporter: R2) -> FusionEngine<R2> {
        FusionEngine {
            config: self.config,
            frames: self.frames,
            fusion_frame: self.fusion_frame,
            manager: self.manager,
            builder: self.builder,
            associator: self.associator,
            reporter,
            last_timestamp: self.last_timestamp,
            sensor_timestamps: self.sensor_timestamps,
            buffer: self.buffer,
            newest_seen: self.newest_seen,
            stats: self.stats,
        }
    }

    /// Replace the assignment strategy
    pub fn with_associator(mut self, associator: Box<dyn Associator>) -> Self {
        self.associator = associator;
        self
    }

    // ------------------------------------------------------------------------
    // Cycles
    // ------------------------------------------------------------------------

    /// Run one cycle on `batch`.
    ///
    /// A batch older than already-processed data is rejected with
    /// [`FusionError::TemporalOrder`]; equal timestamps are accepted. An
    /// association failure returns [`FusionError::Association`] and leaves
    /// the engine unchanged.
    pub fn process(&mut self, batch: ObservationBatch) -> Result<CycleOutput, FusionError> {
        self.check_order(&batch)?;
        self.run_cycle(batch)
    }

    /// Submit a batch under the configured late-data policy.
    ///
    /// With [`LateDataPolicy::Reject`] this is [`FusionEngine::process`].
    /// With [`LateDataPolicy::Buffer`] the batch is held and every buffered
    /// batch at least `window` seconds older than the newest submitted one
    /// is processed in timestamp order.
    ///
    /// The outer error means the submitted batch itself was refused. Each
    /// released cycle yields its own result, so a buffered batch whose cycle
    /// aborts reports the error here and is not retried.
    pub fn submit(&mut self, batch: ObservationBatch) -> Result<Vec<Result<CycleOutput, FusionError>>, FusionError> {
        self.check_order(&batch)?;
        let window = match self.config.late_data {
            LateDataPolicy::Reject => return Ok(vec![self.run_cycle(batch)]),
            LateDataPolicy::Buffer { window } => window,
        };

        let newest = self.newest_seen.map_or(batch.timestamp, |t| t.max(batch.timestamp));
        self.newest_seen = Some(newest);
        let index = self.buffer.partition_point(|b| b.timestamp <= batch.timestamp);
        self.buffer.insert(index, batch);
        trace!("buffered batch, {} pending", self.buffer.len());

        Ok(self.release(|t| t <= newest - window))
    }

    /// Process every buffered batch in timestamp order
    pub fn flush(&mut self) -> Vec<Result<CycleOutput, FusionError>> {
        self.release(|_| true)
    }

    fn release(&mut self, ready: impl Fn(f64) -> bool) -> Vec<Result<CycleOutput, FusionError>> {
        let mut outputs = Vec::new();
        while self.buffer.first().is_some_and(|b| ready(b.timestamp)) {
            let batch = self.buffer.remove(0);
            let (sensor, timestamp) = (batch.sensor_id, batch.timestamp);
            let result = self.run_cycle(batch);
            if let Err(err) = &result {
                warn!("buffered batch from sensor {} at t={:.3} failed: {}", sensor, timestamp, err);
            }
            outputs.push(result);
        }
        self.stats.batches_buffered = self.buffer.len() as u64;
        outputs
    }

    fn check_order(&mut self, batch: &ObservationBatch) -> Result<(), FusionError> {
        if !batch.timestamp.is_finite() {
            self.stats.batches_rejected += 1;
            warn!("batch from sensor {} has a non-finite timestamp", batch.sensor_id);
            return Err(NumericalError::NonFinite {
                context: "batch timestamp",
            }
            .into());
        }

        let last = self
            .last_timestamp
            .into_iter()
            .chain(self.sensor_timestamps.get(&batch.sensor_id).copied())
            .fold(f64::NEG_INFINITY, f64::max);
        if batch.timestamp < last {
            let err = TemporalOrderError {
                sensor: batch.sensor_id,
                timestamp: batch.timestamp,
                last_timestamp: last,
            };
            self.stats.batches_rejected += 1;
            warn!("{}", err);
            self.reporter.on_batch_rejected(&err);
            return Err(err.into());
        }
        Ok(())
    }

    fn align(&self, batch: &ObservationBatch) -> (Vec<AlignedDetection>, Vec<RejectedDetection>) {
        #[cfg(feature = "rayon")]
        let results: Vec<_> = batch
            .detections
            .par_iter()
            .map(|d| align_detection(d, &self.frames, self.fusion_frame))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let results: Vec<_> = batch
            .detections
            .iter()
            .map(|d| align_detection(d, &self.frames, self.fusion_frame))
            .collect();

        let mut seen = HashSet::with_capacity(batch.len());
        let mut aligned = Vec::with_capacity(batch.len());
        let mut rejected = Vec::new();
        for (detection, result) in batch.detections.iter().zip(results) {
            let result = if seen.insert(detection.id) {
                result
            } else {
                Err(DetectionError::Unsupported {
                    id: detection.id,
                    reason: "duplicate detection id in batch".to_string(),
                }
                .into())
            };
            match result {
                Ok(a) => aligned.push(a),
                Err(reason) => rejected.push(RejectedDetection {
                    detection_id: detection.id,
                    sensor_id: detection.sensor_id,
                    reason,
                }),
            }
        }
        aligned.sort_by_key(|a| a.id);
        (aligned, rejected)
    }

    fn run_cycle(&mut self, batch: ObservationBatch) -> Result<CycleOutput, FusionError> {
        let timestamp = batch.timestamp;
        let family = self.config.filter;
        let tolerance = self.config.psd_tolerance;
        self.reporter.on_cycle_start(batch.sensor_id, timestamp, batch.len());

        let (aligned, mut rejected) = self.align(&batch);
        // Alignment drops count even if the cycle aborts later
        let dropped_in_alignment = rejected.len();
        self.stats.detections_dropped += dropped_in_alignment as u64;
        for r in &rejected {
            warn!("detection {} from sensor {} dropped: {}", r.detection_id, r.sensor_id, r.reason);
            self.reporter.on_detection_rejected(r);
        }

        let mut report = CycleReport {
            sensor_id: Some(batch.sensor_id),
            detections_received: batch.len(),
            detections_aligned: aligned.len(),
            ..CycleReport::default()
        };

        // Plan: nothing below mutates the track set until commit
        let plan = {
            let (predicted, failures) = predict_tracks(self.manager.tracks(), timestamp, &family, tolerance);
            self.reporter.on_prediction(&predicted);

            let costs = self.builder.build(&predicted, &aligned);
            self.reporter.on_cost_matrix(&costs);

            let association = match self.associator.associate(&costs, self.config.gate_threshold) {
                Ok(association) => association,
                Err(err) => {
                    self.stats.cycles_aborted += 1;
                    warn!("cycle at t={:.3} aborted by {}: {}", timestamp, self.associator.name(), err);
                    self.reporter.on_cycle_aborted(&err);
                    return Err(err.into());
                }
            };

            let mut outcomes: Vec<(TrackId, TrackOutcome)> = failures
                .into_iter()
                .map(|(id, error)| (id, TrackOutcome::Failed { error }))
                .collect();

            let mut assigned = vec![None; predicted.len()];
            for m in &association.matches {
                assigned[m.track_index] = Some(m.detection_index);
            }

            for (i, p) in predicted.iter().enumerate() {
                let outcome = match assigned[i] {
                    Some(j) => {
                        let detection = &aligned[j];
                        let updated = match costs.pair(i, j) {
                            Some(pair) => apply_innovation(&p.state, &pair.innovation, tolerance)
                                .map(|state| (state, pair.innovation.mahalanobis_squared, pair.innovation.covariance.clone())),
                            None => update(&p.state, detection, &family, tolerance).map(|out| {
                                let d2 = out.mahalanobis_squared();
                                (out.state, d2, out.innovation.covariance)
                            }),
                        };
                        match updated {
                            Ok((state, mahalanobis_squared, innovation_covariance)) => {
                                report.matches.push(MatchRecord {
                                    track_id: p.track.id,
                                    detection_id: detection.id,
                                    cost: costs.costs[(i, j)],
                                });
                                TrackOutcome::Hit {
                                    state,
                                    detection_id: detection.id,
                                    mahalanobis_squared,
                                    innovation_covariance,
                                    shape: detection.shape,
                                    embedding: detection.embedding.clone(),
                                }
                            }
                            Err(error) => TrackOutcome::Failed { error },
                        }
                    }
                    None => {
                        report.unmatched_tracks.push(p.track.id);
                        TrackOutcome::Miss { state: p.state.clone() }
                    }
                };
                outcomes.push((p.track.id, outcome));
            }
            self.reporter.on_association(&report.matches);

            let mut births = Vec::with_capacity(association.unmatched_detections.len());
            for &j in &association.unmatched_detections {
                let detection = &aligned[j];
                report.unmatched_detections.push(detection.id);
                match self.manager.prepare_birth(detection, timestamp, self.fusion_frame) {
                    Ok(candidate) => births.push(candidate),
                    Err(error) => {
                        let r = RejectedDetection {
                            detection_id: detection.id,
                            sensor_id: detection.sensor_id,
                            reason: error.into(),
                        };
                        warn!("detection {} cannot spawn a track: {}", r.detection_id, r.reason);
                        self.reporter.on_detection_rejected(&r);
                        rejected.push(r);
                    }
                }
            }

            CyclePlan {
                timestamp,
                outcomes,
                births,
            }
        };

        let summary = self.manager.commit(plan);

        for (id, error) in &summary.failures {
            warn!("track {} deleted after numerical failure: {}", id, error);
            self.reporter.on_numerical_failure(*id, error);
        }
        let born: Vec<TrackSnapshot> = summary
            .born
            .iter()
            .filter_map(|id| self.manager.get(*id))
            .map(Track::snapshot)
            .collect();
        let deleted: Vec<TrackSnapshot> = summary.deleted.iter().map(Track::snapshot).collect();
        if !born.is_empty() {
            self.reporter.on_birth(&born);
        }
        if !deleted.is_empty() {
            self.reporter.on_deletion(&deleted);
        }

        self.last_timestamp = Some(self.last_timestamp.map_or(timestamp, |t| t.max(timestamp)));
        let sensor_last = self.sensor_timestamps.entry(batch.sensor_id).or_insert(timestamp);
        *sensor_last = sensor_last.max(timestamp);

        self.stats.cycles += 1;
        self.stats.detections_dropped += (rejected.len() - dropped_in_alignment) as u64;
        self.stats.numerical_failures += summary.failures.len() as u64;
        self.stats.tracks_born += summary.born.len() as u64;
        self.stats.tracks_deleted += deleted.len() as u64;

        report.rejected = rejected;
        report.born = summary.born;
        report.numerical_failures = summary.failures;

        let output = CycleOutput {
            timestamp,
            tracks: self.manager.tracks().iter().map(Track::snapshot).collect(),
            deleted,
            report,
        };
        debug!(
            "cycle t={:.3} sensor {}: {} matched, {} born, {} deleted, {} live",
            timestamp,
            batch.sensor_id,
            output.report.matches.len(),
            output.report.born.len(),
            output.deleted.len(),
            output.tracks.len()
        );
        self.reporter.on_cycle_complete(&output);
        Ok(output)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Live tracks, ascending id
    pub fn tracks(&self) -> &[Track] {
        self.manager.tracks()
    }

    /// Live track by id
    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.manager.get(id)
    }

    /// Snapshots of the live tracks
    pub fn snapshot(&self) -> Vec<TrackSnapshot> {
        self.manager.tracks().iter().map(Track::snapshot).collect()
    }

    /// Live track estimates re-expressed in `frame`
    pub fn estimates_in(&self, frame: FrameId) -> Result<Vec<ObjectEstimate>, FrameError> {
        let kinematics = self.frames.kinematics(self.fusion_frame, frame)?;
        Ok(self
            .manager
            .tracks()
            .iter()
            .map(|t| t.snapshot().estimate().transformed(&kinematics, frame))
            .collect())
    }

    /// Running counters
    pub fn stats(&self) -> FusionStats {
        self.stats
    }

    /// Timestamp of the latest processed batch
    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    /// Batches waiting in the reorder buffer
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Frame tree
    pub fn frames(&self) -> &FrameTree {
        &self.frames
    }

    /// Frame tree, for calibration and ego-motion updates
    pub fn frames_mut(&mut self) -> &mut FrameTree {
        &mut self.frames
    }

    /// Frame tracks are estimated in
    pub fn fusion_frame(&self) -> FrameId {
        self.fusion_frame
    }

    /// Configuration
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Assignment strategy
    pub fn associator(&self) -> &dyn Associator {
        self.associator.as_ref()
    }

    /// Reporter
    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Reporter, mutably
    pub fn reporter_mut(&mut self) -> &mut R {
        &mut self.reporter
    }
}
