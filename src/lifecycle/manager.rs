//! Track lifecycle manager
//!
//! Owns the track set and applies the outcome of a cycle to it. A cycle is
//! planned without touching the tracks (predicted states, update results,
//! birth candidates) and then committed in one step, so an aborted cycle
//! leaves the set exactly as it was.
//!
//! ```text
//!             hit × N                 miss
//!  Tentative ─────────▶ Confirmed ◀──────────▶ Coasting
//!      │ miss (strict)      │ miss × M             │ miss × M
//!      ▼                    ▼                      ▼
//!   Deleted ◀───────────────┴──────────────────────┘
//! ```

use std::collections::{BTreeMap, HashMap};

use log::{debug, trace};
use nalgebra::{DMatrix, Vector3};

use super::score::ScoreConfig;
use crate::common::linalg::ensure_covariance;
use crate::config::{ExtentNoise, InitialUncertainty, TrackerConfig};
use crate::errors::NumericalError;
use crate::geometry::{AlignedDetection, FrameId};
use crate::models::MotionModel;
use crate::types::{
    BoxShape, DetectionId, Track, TrackHistory, TrackId, TrackState, TrackStatus,
};

/// Lifecycle parameters taken from a [`TrackerConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleRules {
    /// Consecutive hits to confirm (spawn included)
    pub confirm_hits: u32,
    /// Consecutive misses to delete
    pub coast_misses: u32,
    /// Tentative tracks die on their first miss
    pub strict_birth: bool,
    /// Maximum unobserved time
    pub max_coast_duration: Option<f64>,
    /// Past means kept per track
    pub history_capacity: usize,
    /// Embedding smoothing factor
    pub appearance_momentum: f64,
    /// Box extent filter noise
    pub extent: ExtentNoise,
    /// Score parameters
    pub score: ScoreConfig,
    /// Newborn uncertainty
    pub initial_uncertainty: InitialUncertainty,
    /// Motion model of unclassified newborns
    pub default_motion: MotionModel,
    /// Per-class motion models
    pub class_motion: BTreeMap<String, MotionModel>,
    /// PSD tolerance for newborn covariances
    pub psd_tolerance: f64,
}

impl From<&TrackerConfig> for LifecycleRules {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            confirm_hits: config.confirm_hits,
            coast_misses: config.coast_misses,
            strict_birth: config.strict_birth,
            max_coast_duration: config.max_coast_duration,
            history_capacity: config.history_capacity,
            appearance_momentum: config.appearance_momentum,
            extent: config.extent,
            score: config.score,
            initial_uncertainty: config.initial_uncertainty,
            default_motion: config.default_motion,
            class_motion: config.class_motion.clone(),
            psd_tolerance: config.psd_tolerance,
        }
    }
}

impl LifecycleRules {
    fn motion_for(&self, class_label: Option<&str>) -> MotionModel {
        class_label
            .and_then(|label| self.class_motion.get(label))
            .copied()
            .unwrap_or(self.default_motion)
    }
}

/// A track to be spawned from an unassigned detection
#[derive(Debug, Clone, PartialEq)]
pub struct BirthCandidate {
    /// Spawning detection
    pub detection_id: DetectionId,
    /// Initial state
    pub state: TrackState,
    /// Class of the detection
    pub class_label: Option<String>,
    /// Observed shape
    pub shape: Option<BoxShape>,
    /// Appearance embedding
    pub embedding: Option<Vec<f64>>,
}

/// What happened to one live track during a cycle
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    /// Associated and updated
    Hit {
        /// Posterior state
        state: TrackState,
        /// Associated detection
        detection_id: DetectionId,
        /// Squared Mahalanobis distance of the innovation
        mahalanobis_squared: f64,
        /// Innovation covariance
        innovation_covariance: DMatrix<f64>,
        /// Observed shape
        shape: Option<BoxShape>,
        /// Observed embedding
        embedding: Option<Vec<f64>>,
    },
    /// Not associated; carries the predicted state
    Miss {
        /// Predicted state
        state: TrackState,
    },
    /// Prediction or update failed
    Failed {
        /// Cause
        error: NumericalError,
    },
}

/// Everything a cycle will change, computed before any mutation
#[derive(Debug, Clone, Default)]
pub struct CyclePlan {
    /// Cycle time
    pub timestamp: f64,
    /// Outcome per live track
    pub outcomes: Vec<(TrackId, TrackOutcome)>,
    /// Tracks to spawn, in detection order
    pub births: Vec<BirthCandidate>,
}

/// Result of [`TrackManager::commit`]
#[derive(Debug, Clone, Default)]
pub struct CommitSummary {
    /// Ids assigned to newborn tracks
    pub born: Vec<TrackId>,
    /// Tracks removed this cycle, status `Deleted`
    pub deleted: Vec<Track>,
    /// Tracks removed by numerical failure
    pub failures: Vec<(TrackId, NumericalError)>,
}

/// Owner of the live track set.
#[derive(Debug, Clone)]
pub struct TrackManager {
    tracks: Vec<Track>,
    next_id: u64,
    rules: LifecycleRules,
}

impl TrackManager {
    /// Empty manager
    pub fn new(rules: LifecycleRules) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            rules,
        }
    }

    /// Live tracks, ascending id
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Live track by id
    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks
            .binary_search_by_key(&id, |t| t.id)
            .ok()
            .map(|i| &self.tracks[i])
    }

    /// Number of live tracks
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// True if no track is live
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Id the next newborn will receive
    pub fn next_id(&self) -> TrackId {
        TrackId(self.next_id)
    }

    /// Lifecycle parameters
    pub fn rules(&self) -> &LifecycleRules {
        &self.rules
    }

    /// Initial state for a track spawned from `detection`.
    ///
    /// Does not modify the manager; the candidate only becomes a track
    /// through [`TrackManager::commit`].
    pub fn prepare_birth(
        &self,
        detection: &AlignedDetection,
        timestamp: f64,
        frame_id: FrameId,
    ) -> Result<BirthCandidate, NumericalError> {
        let motion = self.rules.motion_for(detection.class_label.as_deref());
        let mean = motion.initial_state(&detection.position, None);
        let measured = DMatrix::from_iterator(3, 3, detection.position_covariance.iter().copied());
        let covariance = motion.initial_covariance(&self.rules.initial_uncertainty, &measured);
        let covariance = ensure_covariance(&covariance, self.rules.psd_tolerance, "birth")?;
        let state = TrackState::new(mean, covariance, motion, frame_id, timestamp)?;

        Ok(BirthCandidate {
            detection_id: detection.id,
            state,
            class_label: detection.class_label.clone(),
            shape: detection.shape,
            embedding: detection.embedding.clone(),
        })
    }

    /// Apply a planned cycle.
    ///
    /// Tracks without an outcome in the plan are left untouched. Deleted
    /// tracks are removed from the set and returned.
    pub fn commit(&mut self, plan: CyclePlan) -> CommitSummary {
        let CyclePlan {
            timestamp,
            outcomes,
            births,
        } = plan;
        let mut outcomes: HashMap<TrackId, TrackOutcome> = outcomes.into_iter().collect();
        let mut summary = CommitSummary::default();

        for track in &mut self.tracks {
            match outcomes.remove(&track.id) {
                Some(TrackOutcome::Hit {
                    state,
                    mahalanobis_squared,
                    innovation_covariance,
                    shape,
                    embedding,
                    ..
                }) => {
                    track.state = state;
                    track.score += self
                        .rules
                        .score
                        .hit_increment(mahalanobis_squared, &innovation_covariance);
                    apply_hit(track, &self.rules, timestamp, shape, embedding);
                }
                Some(TrackOutcome::Miss { state }) => {
                    track.state = state;
                    track.score += self.rules.score.miss_increment();
                    apply_miss(track, &self.rules);
                }
                Some(TrackOutcome::Failed { error }) => {
                    debug!("track {} failed numerically: {}", track.id, error);
                    track.status = TrackStatus::Deleted;
                    summary.failures.push((track.id, error));
                    continue;
                }
                None => continue,
            }

            // Confirmed and coasting tracks are governed by the miss count
            if track.status == TrackStatus::Tentative && self.rules.score.is_collapsed(track.score) {
                trace!("track {} score collapsed ({:.3})", track.id, track.score);
                track.status = TrackStatus::Deleted;
            }
            if let Some(max) = self.rules.max_coast_duration {
                if track.is_live() && track.coast_duration() > max {
                    trace!("track {} unobserved for {:.3}s", track.id, track.coast_duration());
                    track.status = TrackStatus::Deleted;
                }
            }
            let mean = track.state.mean.clone();
            track.history.push(track.state.timestamp, mean);
        }

        let (live, deleted): (Vec<Track>, Vec<Track>) =
            std::mem::take(&mut self.tracks).into_iter().partition(Track::is_live);
        self.tracks = live;
        summary.deleted = deleted;

        for candidate in births {
            let id = TrackId(self.next_id);
            self.next_id += 1;
            self.tracks.push(self.spawn(id, candidate, timestamp));
            summary.born.push(id);
        }

        if !summary.born.is_empty() || !summary.deleted.is_empty() {
            debug!(
                "t={:.3}: {} born, {} deleted, {} live",
                timestamp,
                summary.born.len(),
                summary.deleted.len(),
                self.tracks.len()
            );
        }
        summary
    }

    fn spawn(&self, id: TrackId, candidate: BirthCandidate, timestamp: f64) -> Track {
        let status = if self.rules.confirm_hits <= 1 {
            TrackStatus::Confirmed
        } else {
            TrackStatus::Tentative
        };
        let mut history = TrackHistory::new(self.rules.history_capacity);
        history.push(candidate.state.timestamp, candidate.state.mean.clone());

        Track {
            id,
            state: candidate.state,
            status,
            hits: 1,
            consecutive_hits: 1,
            misses: 0,
            history,
            created_at: timestamp,
            last_update: timestamp,
            score: self.rules.score.initial(),
            class_label: candidate.class_label,
            extent_variance: match candidate.shape {
                Some(_) => Vector3::repeat(self.rules.extent.measurement_std.powi(2)),
                None => Vector3::zeros(),
            },
            shape: candidate.shape,
            embedding: candidate.embedding,
        }
    }
}

fn apply_hit(
    track: &mut Track,
    rules: &LifecycleRules,
    timestamp: f64,
    shape: Option<BoxShape>,
    embedding: Option<Vec<f64>>,
) {
    track.hits += 1;
    track.consecutive_hits += 1;
    track.misses = 0;
    track.last_update = timestamp;

    track.status = match track.status {
        TrackStatus::Tentative if track.consecutive_hits >= rules.confirm_hits => TrackStatus::Confirmed,
        TrackStatus::Coasting => TrackStatus::Confirmed,
        status => status,
    };

    if let Some(observed) = shape {
        filter_extent(track, &rules.extent, observed);
    }
    if let Some(observed) = embedding {
        track.embedding = Some(match track.embedding.take() {
            Some(current) if current.len() == observed.len() => {
                let m = rules.appearance_momentum;
                current
                    .iter()
                    .zip(&observed)
                    .map(|(c, o)| m * c + (1.0 - m) * o)
                    .collect()
            }
            _ => observed,
        });
    }
}

/// Per-axis random-walk Kalman filter on the box extent; orientation follows
/// the latest observation
fn filter_extent(track: &mut Track, noise: &ExtentNoise, observed: BoxShape) {
    let r = noise.measurement_std.powi(2);
    let Some(current) = track.shape else {
        track.shape = Some(observed);
        track.extent_variance = Vector3::repeat(r);
        return;
    };

    let mut size = current.size;
    for i in 0..3 {
        let prior = track.extent_variance[i] + noise.process_std.powi(2);
        let gain = prior / (prior + r);
        size[i] += gain * (observed.size[i] - size[i]);
        track.extent_variance[i] = (1.0 - gain) * prior;
    }
    track.shape = Some(BoxShape {
        size,
        orientation: observed.orientation,
    });
}

fn apply_miss(track: &mut Track, rules: &LifecycleRules) {
    track.misses += 1;
    track.consecutive_hits = 0;
    let exhausted = track.misses >= rules.coast_misses;

    track.status = match track.status {
        TrackStatus::Tentative if rules.strict_birth || exhausted => TrackStatus::Deleted,
        TrackStatus::Confirmed | TrackStatus::Coasting if exhausted => TrackStatus::Deleted,
        TrackStatus::Confirmed => TrackStatus::Coasting,
        status => status,
    };
}
