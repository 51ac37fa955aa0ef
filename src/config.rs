//! Tracker configuration
//!
//! [`TrackerConfig`] gathers every tunable of the fusion engine. It has
//! sensible defaults, a builder, validation and JSON (de)serialization.
//!
//! # Example
//!
//! ```
//! use sensor_fusion_tracker::config::{FilterFamily, TrackerConfig};
//! use sensor_fusion_tracker::models::MotionModel;
//!
//! let config = TrackerConfig::builder()
//!     .filter(FilterFamily::unscented())
//!     .class_motion("pedestrian", MotionModel::default())
//!     .confirm_hits(2)
//!     .build()
//!     .unwrap();
//!
//! let json = config.to_json_pretty().unwrap();
//! let back = TrackerConfig::from_json(&json).unwrap();
//! assert_eq!(back.confirm_hits, 2);
//! ```

use std::collections::BTreeMap;
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::common::constants::{
    DEFAULT_APPEARANCE_MOMENTUM, DEFAULT_COAST_MISSES, DEFAULT_CONFIRM_HITS,
    DEFAULT_EXTENT_MEASUREMENT_STD, DEFAULT_EXTENT_PROCESS_STD, DEFAULT_GATE_THRESHOLD, DEFAULT_HISTORY_CAPACITY, DEFAULT_INIT_ACCELERATION_STD,
    DEFAULT_INIT_POSITION_STD, DEFAULT_INIT_VELOCITY_STD, DEFAULT_INIT_YAW_RATE_STD,
    DEFAULT_PSD_TOLERANCE,
};
use crate::errors::ConfigError;
use crate::lifecycle::ScoreConfig;
use crate::models::MotionModel;

// ============================================================================
// Filter family
// ============================================================================

/// Estimation algorithm used by the filter bank
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterFamily {
    /// Kalman filter; extended through Jacobians for nonlinear models
    Kalman,
    /// Unscented Kalman filter
    Unscented {
        /// Sigma-point spread
        alpha: f64,
        /// Prior knowledge of the distribution (2 is optimal for Gaussians)
        beta: f64,
        /// Secondary scaling
        kappa: f64,
    },
}

impl Default for FilterFamily {
    fn default() -> Self {
        FilterFamily::Kalman
    }
}

impl FilterFamily {
    /// Unscented filter with `alpha = 1`, `beta = 2`, `kappa = 0`.
    ///
    /// `alpha = 1` keeps every sigma-point weight non-negative.
    pub fn unscented() -> Self {
        FilterFamily::Unscented {
            alpha: 1.0,
            beta: 2.0,
            kappa: 0.0,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let FilterFamily::Unscented { alpha, beta, kappa } = *self {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(ConfigError::invalid("filter.alpha", format!("must be in (0, 1], got {alpha}")));
            }
            if !beta.is_finite() || beta < 0.0 {
                return Err(ConfigError::invalid("filter.beta", format!("must be non-negative, got {beta}")));
            }
            if !kappa.is_finite() {
                return Err(ConfigError::invalid("filter.kappa", "must be finite"));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Association cost
// ============================================================================

/// Cost of assigning a detection to a track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CostFunction {
    /// Squared Mahalanobis distance
    Kinematic,
    /// Squared Mahalanobis distance plus weighted cosine distance of
    /// appearance embeddings
    KinematicAppearance {
        /// Weight of the appearance term
        weight: f64,
    },
}

impl Default for CostFunction {
    fn default() -> Self {
        CostFunction::Kinematic
    }
}

// ============================================================================
// Late data
// ============================================================================

/// Handling of batches that arrive out of timestamp order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LateDataPolicy {
    /// Batches older than processed data are rejected
    Reject,
    /// Batches are held and released in timestamp order once the newest
    /// seen timestamp is `window` seconds past them
    Buffer {
        /// Reorder window (s)
        window: f64,
    },
}

impl Default for LateDataPolicy {
    fn default() -> Self {
        LateDataPolicy::Reject
    }
}

// ============================================================================
// Initial uncertainty
// ============================================================================

/// 1σ uncertainties of a newborn track's unobserved state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialUncertainty {
    /// Added to the measured position variance (m)
    pub position_std: f64,
    /// Velocity or speed (m/s)
    pub velocity_std: f64,
    /// Acceleration (m/s²)
    pub acceleration_std: f64,
    /// Heading (rad)
    pub heading_std: f64,
    /// Yaw rate (rad/s)
    pub yaw_rate_std: f64,
}

impl Default for InitialUncertainty {
    fn default() -> Self {
        Self {
            position_std: DEFAULT_INIT_POSITION_STD,
            velocity_std: DEFAULT_INIT_VELOCITY_STD,
            acceleration_std: DEFAULT_INIT_ACCELERATION_STD,
            heading_std: PI,
            yaw_rate_std: DEFAULT_INIT_YAW_RATE_STD,
        }
    }
}

impl InitialUncertainty {
    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("initial_uncertainty.position_std", self.position_std, false),
            ("initial_uncertainty.velocity_std", self.velocity_std, true),
            ("initial_uncertainty.acceleration_std", self.acceleration_std, true),
            ("initial_uncertainty.heading_std", self.heading_std, true),
            ("initial_uncertainty.yaw_rate_std", self.yaw_rate_std, true),
        ];
        for (field, value, strictly_positive) in fields {
            let ok = value.is_finite() && if strictly_positive { value > 0.0 } else { value >= 0.0 };
            if !ok {
                return Err(ConfigError::invalid(field, format!("got {value}")));
            }
        }
        Ok(())
    }
}

/// Noise of the per-axis box extent filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtentNoise {
    /// Random walk added to each extent per update (m)
    pub process_std: f64,
    /// Noise of an observed extent (m)
    pub measurement_std: f64,
}

impl Default for ExtentNoise {
    fn default() -> Self {
        Self {
            process_std: DEFAULT_EXTENT_PROCESS_STD,
            measurement_std: DEFAULT_EXTENT_MEASUREMENT_STD,
        }
    }
}

impl ExtentNoise {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.process_std.is_finite() && self.process_std >= 0.0) {
            return Err(ConfigError::invalid(
                "extent.process_std",
                format!("must be non-negative, got {}", self.process_std),
            ));
        }
        if !(self.measurement_std.is_finite() && self.measurement_std > 0.0) {
            return Err(ConfigError::invalid(
                "extent.measurement_std",
                format!("must be positive, got {}", self.measurement_std),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// TrackerConfig
// ============================================================================

/// Complete configuration of a fusion engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Motion model for newborn tracks
    pub default_motion: MotionModel,
    /// Per-class motion model overrides
    pub class_motion: BTreeMap<String, MotionModel>,
    /// Filter family
    pub filter: FilterFamily,
    /// Gate on the squared Mahalanobis distance
    pub gate_threshold: f64,
    /// Consecutive hits to confirm a tentative track (spawn included)
    pub confirm_hits: u32,
    /// Consecutive misses after which a track is deleted
    pub coast_misses: u32,
    /// Delete tentative tracks on their first miss
    pub strict_birth: bool,
    /// Association cost
    pub cost_function: CostFunction,
    /// Late-data handling
    pub late_data: LateDataPolicy,
    /// Newborn track uncertainty
    pub initial_uncertainty: InitialUncertainty,
    /// Track score parameters
    pub score: ScoreConfig,
    /// Delete a track unobserved for longer than this (s)
    pub max_coast_duration: Option<f64>,
    /// Relative tolerance of the covariance PSD check
    pub psd_tolerance: f64,
    /// Past means kept per track
    pub history_capacity: usize,
    /// Never associate detections and tracks of different classes
    pub class_gating: bool,
    /// Smoothing factor of track appearance embeddings
    pub appearance_momentum: f64,
    /// Box extent filter noise
    pub extent: ExtentNoise,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            default_motion: MotionModel::default(),
            class_motion: BTreeMap::new(),
            filter: FilterFamily::default(),
            gate_threshold: DEFAULT_GATE_THRESHOLD,
            confirm_hits: DEFAULT_CONFIRM_HITS,
            coast_misses: DEFAULT_COAST_MISSES,
            strict_birth: true,
            cost_function: CostFunction::default(),
            late_data: LateDataPolicy::default(),
            initial_uncertainty: InitialUncertainty::default(),
            score: ScoreConfig::default(),
            max_coast_duration: None,
            psd_tolerance: DEFAULT_PSD_TOLERANCE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            class_gating: false,
            appearance_momentum: DEFAULT_APPEARANCE_MOMENTUM,
            extent: ExtentNoise::default(),
        }
    }
}

impl TrackerConfig {
    /// Create with builder pattern.
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::default()
    }

    /// Motion model for a newborn track of the given class
    pub fn motion_for(&self, class_label: Option<&str>) -> MotionModel {
        class_label
            .and_then(|label| self.class_motion.get(label))
            .copied()
            .unwrap_or(self.default_motion)
    }

    /// Check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default_motion
            .validate()
            .map_err(|reason| ConfigError::invalid("default_motion", reason))?;
        for model in self.class_motion.values() {
            model
                .validate()
                .map_err(|reason| ConfigError::invalid("class_motion", reason))?;
        }
        self.filter.validate()?;

        if !(self.gate_threshold.is_finite() && self.gate_threshold > 0.0) {
            return Err(ConfigError::invalid(
                "gate_threshold",
                format!("must be positive and finite, got {}", self.gate_threshold),
            ));
        }
        if self.coast_misses == 0 {
            return Err(ConfigError::invalid("coast_misses", "must be at least 1"));
        }
        if let CostFunction::KinematicAppearance { weight } = self.cost_function {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::invalid(
                    "cost_function.weight",
                    format!("must be non-negative, got {weight}"),
                ));
            }
        }
        if let LateDataPolicy::Buffer { window } = self.late_data {
            if !window.is_finite() || window < 0.0 {
                return Err(ConfigError::invalid(
                    "late_data.window",
                    format!("must be non-negative, got {window}"),
                ));
            }
        }
        self.initial_uncertainty.validate()?;
        self.score.validate()?;
        if let Some(max) = self.max_coast_duration {
            if !(max > 0.0) {
                return Err(ConfigError::invalid(
                    "max_coast_duration",
                    format!("must be positive, got {max}"),
                ));
            }
        }
        if !self.psd_tolerance.is_finite() || self.psd_tolerance < 0.0 {
            return Err(ConfigError::invalid("psd_tolerance", "must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.appearance_momentum) {
            return Err(ConfigError::invalid(
                "appearance_momentum",
                format!("must be in [0, 1], got {}", self.appearance_momentum),
            ));
        }
        self.extent.validate()?;
        Ok(())
    }

    /// Serialize to compact JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize to indented JSON
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Builder for [`TrackerConfig`].
#[derive(Debug, Default)]
pub struct TrackerConfigBuilder {
    config: TrackerConfig,
}

impl TrackerConfigBuilder {
    /// Motion model for newborn tracks
    pub fn default_motion(mut self, model: MotionModel) -> Self {
        self.config.default_motion = model;
        self
    }

    /// Motion model override for one class
    pub fn class_motion(mut self, class_label: impl Into<String>, model: MotionModel) -> Self {
        self.config.class_motion.insert(class_label.into(), model);
        self
    }

    /// Filter family
    pub fn filter(mut self, filter: FilterFamily) -> Self {
        self.config.filter = filter;
        self
    }

    /// Gate on the squared Mahalanobis distance
    pub fn gate_threshold(mut self, threshold: f64) -> Self {
        self.config.gate_threshold = threshold;
        self
    }

    /// Consecutive hits to confirm
    pub fn confirm_hits(mut self, hits: u32) -> Self {
        self.config.confirm_hits = hits;
        self
    }

    /// Consecutive misses to delete
    pub fn coast_misses(mut self, misses: u32) -> Self {
        self.config.coast_misses = misses;
        self
    }

    /// Tentative tracks die on their first miss
    pub fn strict_birth(mut self, strict: bool) -> Self {
        self.config.strict_birth = strict;
        self
    }

    /// Association cost
    pub fn cost_function(mut self, cost: CostFunction) -> Self {
        self.config.cost_function = cost;
        self
    }

    /// Late-data handling
    pub fn late_data(mut self, policy: LateDataPolicy) -> Self {
        self.config.late_data = policy;
        self
    }

    /// Newborn track uncertainty
    pub fn initial_uncertainty(mut self, uncertainty: InitialUncertainty) -> Self {
        self.config.initial_uncertainty = uncertainty;
        self
    }

    /// Track score parameters
    pub fn score(mut self, score: ScoreConfig) -> Self {
        self.config.score = score;
        self
    }

    /// Maximum unobserved time (s)
    pub fn max_coast_duration(mut self, seconds: f64) -> Self {
        self.config.max_coast_duration = Some(seconds);
        self
    }

    /// Relative PSD tolerance
    pub fn psd_tolerance(mut self, tolerance: f64) -> Self {
        self.config.psd_tolerance = tolerance;
        self
    }

    /// Past means kept per track
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.config.history_capacity = capacity;
        self
    }

    /// Class gating
    pub fn class_gating(mut self, enabled: bool) -> Self {
        self.config.class_gating = enabled;
        self
    }

    /// Embedding smoothing factor
    pub fn appearance_momentum(mut self, momentum: f64) -> Self {
        self.config.appearance_momentum = momentum;
        self
    }

    /// Box extent filter noise
    pub fn extent(mut self, extent: ExtentNoise) -> Self {
        self.config.extent = extent;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<TrackerConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
