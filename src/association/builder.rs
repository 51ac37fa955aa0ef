//! Cost matrix construction
//!
//! Evaluates every (track, detection) pair once. Pairs outside the gate, of
//! incompatible classes, or whose innovation fails numerically get an
//! infinite cost. The innovations of admissible pairs are kept so the update
//! of the selected pair reuses them.
//!
//! Rows follow the order of the predicted tracks and columns the order of the
//! detections; callers pass both sorted by id so the matrix is deterministic.

use log::trace;
use nalgebra::DMatrix;
use smallvec::SmallVec;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use super::likelihood::{compute_likelihood, PairLikelihood};
use crate::components::PredictedTrack;
use crate::config::{CostFunction, FilterFamily, TrackerConfig};
use crate::geometry::AlignedDetection;
use crate::types::{DetectionId, TrackId};

/// Gated costs of all (track, detection) pairs.
#[derive(Debug, Clone)]
pub struct CostMatrix {
    /// Row labels
    pub track_ids: Vec<TrackId>,
    /// Column labels
    pub detection_ids: Vec<DetectionId>,
    /// Assignment cost, `f64::INFINITY` for inadmissible pairs
    pub costs: DMatrix<f64>,
    /// Squared Mahalanobis distance, `f64::INFINITY` where not evaluated
    pub mahalanobis: DMatrix<f64>,
    /// Admissible columns per row
    pub gated: Vec<SmallVec<[usize; 8]>>,
    pairs: Vec<Vec<Option<PairLikelihood>>>,
}

impl CostMatrix {
    /// Matrix from raw costs with no innovations attached.
    ///
    /// Finite entries are admissible.
    pub fn from_costs(track_ids: Vec<TrackId>, detection_ids: Vec<DetectionId>, costs: DMatrix<f64>) -> Self {
        let gated = (0..costs.nrows())
            .map(|i| (0..costs.ncols()).filter(|&j| costs[(i, j)].is_finite()).collect())
            .collect();
        let pairs = vec![vec![None; costs.ncols()]; costs.nrows()];
        Self {
            track_ids,
            detection_ids,
            mahalanobis: costs.clone(),
            costs,
            gated,
            pairs,
        }
    }

    /// Number of rows
    #[inline]
    pub fn num_tracks(&self) -> usize {
        self.costs.nrows()
    }

    /// Number of columns
    #[inline]
    pub fn num_detections(&self) -> usize {
        self.costs.ncols()
    }

    /// True if the pair survived gating
    #[inline]
    pub fn is_admissible(&self, row: usize, col: usize) -> bool {
        self.costs[(row, col)].is_finite()
    }

    /// Evaluation of an admissible pair
    pub fn pair(&self, row: usize, col: usize) -> Option<&PairLikelihood> {
        self.pairs.get(row)?.get(col)?.as_ref()
    }

    /// Number of admissible pairs
    pub fn num_admissible(&self) -> usize {
        self.gated.iter().map(|g| g.len()).sum()
    }
}

/// Builds a [`CostMatrix`] from predicted tracks and aligned detections.
#[derive(Debug, Clone)]
pub struct CostMatrixBuilder {
    family: FilterFamily,
    cost_function: CostFunction,
    gate_threshold: f64,
    class_gating: bool,
}

impl CostMatrixBuilder {
    /// Builder with explicit parameters
    pub fn new(family: FilterFamily, cost_function: CostFunction, gate_threshold: f64, class_gating: bool) -> Self {
        Self {
            family,
            cost_function,
            gate_threshold,
            class_gating,
        }
    }

    /// Builder configured from a tracker configuration
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(
            config.filter,
            config.cost_function,
            config.gate_threshold,
            config.class_gating,
        )
    }

    fn classes_compatible(&self, track: &PredictedTrack<'_>, detection: &AlignedDetection) -> bool {
        if !self.class_gating {
            return true;
        }
        match (&track.track.class_label, &detection.class_label) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }

    fn evaluate_row(
        &self,
        track: &PredictedTrack<'_>,
        detections: &[AlignedDetection],
    ) -> Vec<Option<PairLikelihood>> {
        detections
            .iter()
            .map(|detection| {
                if !self.classes_compatible(track, detection) {
                    return None;
                }
                match compute_likelihood(track, detection, &self.family, &self.cost_function) {
                    Ok(pair) if pair.mahalanobis_squared() <= self.gate_threshold => Some(pair),
                    Ok(_) => None,
                    Err(err) => {
                        trace!(
                            "pair (track {}, detection {}) not evaluable: {}",
                            track.track.id,
                            detection.id,
                            err
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Evaluate all pairs
    pub fn build(&self, tracks: &[PredictedTrack<'_>], detections: &[AlignedDetection]) -> CostMatrix {
        let n = tracks.len();
        let m = detections.len();

        #[cfg(feature = "rayon")]
        let pairs: Vec<Vec<Option<PairLikelihood>>> =
            tracks.par_iter().map(|t| self.evaluate_row(t, detections)).collect();
        #[cfg(not(feature = "rayon"))]
        let pairs: Vec<Vec<Option<PairLikelihood>>> =
            tracks.iter().map(|t| self.evaluate_row(t, detections)).collect();

        let mut costs = DMatrix::from_element(n, m, f64::INFINITY);
        let mut mahalanobis = DMatrix::from_element(n, m, f64::INFINITY);
        let mut gated = Vec::with_capacity(n);
        for (i, row) in pairs.iter().enumerate() {
            let mut admissible = SmallVec::new();
            for (j, pair) in row.iter().enumerate() {
                if let Some(pair) = pair {
                    costs[(i, j)] = pair.cost;
                    mahalanobis[(i, j)] = pair.mahalanobis_squared();
                    admissible.push(j);
                }
            }
            gated.push(admissible);
        }

        CostMatrix {
            track_ids: tracks.iter().map(|t| t.track.id).collect(),
            detection_ids: detections.iter().map(|d| d.id).collect(),
            costs,
            mahalanobis,
            gated,
            pairs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::FrameId;
    use crate::models::{Layout, MeasurementModel, MotionModel};
    use crate::types::{SensorId, Track, TrackHistory, TrackState, TrackStatus};
    use nalgebra::{DVector, Matrix3, Vector3};

    fn track(id: u64, x: f64, class_label: Option<&str>) -> Track {
        let state = TrackState::new(
            DVector::from_vec(vec![x, 0.0, 0.0, 0.0]),
            DMatrix::identity(4, 4),
            MotionModel::constant_velocity(Layout::Planar, 1.0),
            FrameId(0),
            0.0,
        )
        .unwrap();
        Track {
            id: TrackId(id),
            state,
            status: TrackStatus::Confirmed,
            hits: 3,
            consecutive_hits: 3,
            misses: 0,
            history: TrackHistory::new(0),
            created_at: 0.0,
            last_update: 0.0,
            score: -10.0,
            class_label: class_label.map(String::from),
            shape: None,
            extent_variance: Vector3::zeros(),
            embedding: None,
        }
    }

    fn detection(id: u64, x: f64, class_label: Option<&str>) -> AlignedDetection {
        AlignedDetection {
            id: DetectionId(id),
            sensor_id: SensorId(0),
            timestamp: 0.0,
            model: MeasurementModel::Position,
            z: DVector::from_vec(vec![x, 0.0, 0.0]),
            noise: DMatrix::identity(3, 3),
            position: Vector3::new(x, 0.0, 0.0),
            position_covariance: Matrix3::identity(),
            shape: None,
            class_label: class_label.map(String::from),
            confidence: None,
            embedding: None,
        }
    }

    fn predicted(tracks: &[Track]) -> Vec<PredictedTrack<'_>> {
        tracks
            .iter()
            .map(|t| PredictedTrack {
                track: t,
                state: t.state.clone(),
            })
            .collect()
    }

    #[test]
    fn test_gating() {
        let tracks = vec![track(1, 0.0, None), track(2, 100.0, None)];
        let detections = vec![detection(10, 1.0, None), detection(11, 99.0, None)];
        let builder = CostMatrixBuilder::from_config(&TrackerConfig::default());
        let m = builder.build(&predicted(&tracks), &detections);

        // S = I + I, d² = 1 / 2
        assert!((m.costs[(0, 0)] - 0.5).abs() < 1e-12);
        assert!(m.costs[(0, 1)].is_infinite());
        assert!(m.costs[(1, 0)].is_infinite());
        assert_eq!(m.gated[0].as_slice(), &[0]);
        assert_eq!(m.num_admissible(), 2);
        assert!(m.pair(0, 0).is_some());
        assert!(m.pair(0, 1).is_none());
        assert_eq!(m.track_ids, vec![TrackId(1), TrackId(2)]);
    }

    #[test]
    fn test_class_gating() {
        let tracks = vec![track(1, 0.0, Some("car"))];
        let detections = vec![detection(10, 0.5, Some("pedestrian")), detection(11, 0.5, None)];
        let config = TrackerConfig::builder().class_gating(true).build().unwrap();
        let m = CostMatrixBuilder::from_config(&config).build(&predicted(&tracks), &detections);
        assert!(!m.is_admissible(0, 0));
        assert!(m.is_admissible(0, 1));
    }

    #[test]
    fn test_empty_inputs() {
        let builder = CostMatrixBuilder::from_config(&TrackerConfig::default());
        let m = builder.build(&[], &[detection(1, 0.0, None)]);
        assert_eq!(m.num_tracks(), 0);
        assert_eq!(m.num_detections(), 1);
    }
}
