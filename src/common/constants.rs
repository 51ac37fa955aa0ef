//! Numerical constants and configuration defaults
//!
//! Tolerances are kept separate from [`TrackerConfig`](crate::config::TrackerConfig)
//! fields; the `DEFAULT_*` values are what the config falls back to.

/// Chi-square 99% quantile for 2 degrees of freedom.
///
/// Default gate on the squared Mahalanobis distance of a planar position
/// measurement.
pub const DEFAULT_GATE_THRESHOLD: f64 = 9.21;

/// Consecutive hits needed to confirm a tentative track
pub const DEFAULT_CONFIRM_HITS: u32 = 3;

/// Consecutive misses after which a coasting track is deleted
pub const DEFAULT_COAST_MISSES: u32 = 5;

/// Number of past means retained per track
pub const DEFAULT_HISTORY_CAPACITY: usize = 32;

/// Relative tolerance for the positive semi-definite check.
///
/// An eigenvalue `λ` passes when `λ >= -PSD_TOLERANCE * max(1, max|λ|)`.
pub const DEFAULT_PSD_TOLERANCE: f64 = 1e-9;

/// Below this yaw rate (rad/s) the CTRV model uses its straight-line limit
pub const YAW_RATE_EPSILON: f64 = 1e-6;

/// Absolute tolerance for transform and quaternion comparisons
pub const FRAME_TOLERANCE: f64 = 1e-9;

/// Default 1σ position uncertainty for newborn tracks (m)
pub const DEFAULT_INIT_POSITION_STD: f64 = 5.0;

/// Default 1σ velocity uncertainty for newborn tracks (m/s)
pub const DEFAULT_INIT_VELOCITY_STD: f64 = 30.0;

/// Default 1σ acceleration uncertainty for newborn tracks (m/s²)
pub const DEFAULT_INIT_ACCELERATION_STD: f64 = 10.0;

/// Default 1σ yaw-rate uncertainty for newborn CTRV tracks (rad/s)
pub const DEFAULT_INIT_YAW_RATE_STD: f64 = 1.0;

/// Initial track score: `-ln(15)`, a negative log-likelihood ratio
pub const SCORE_INIT: f64 = -2.708_050_201_1;

/// Default probability of detection used by the track score
pub const DEFAULT_SCORE_DETECTION_PROBABILITY: f64 = 0.9;

/// Default false-target density used by the track score
pub const DEFAULT_SCORE_FALSE_TARGET_DENSITY: f64 = 1e-7;

/// Ratio of false confirmations to false alarms
pub const SCORE_ALPHA: f64 = 1e-4;

/// True-track deletion probability
pub const SCORE_BETA: f64 = 1e-2;

/// Per-update random walk 1σ of a box extent (m)
pub const DEFAULT_EXTENT_PROCESS_STD: f64 = 0.05;

/// Measurement 1σ of an observed box extent (m)
pub const DEFAULT_EXTENT_MEASUREMENT_STD: f64 = 0.3;

/// Embedding smoothing factor for the appearance feature of a track
pub const DEFAULT_APPEARANCE_MOMENTUM: f64 = 0.9;

/// Default white-noise acceleration spectral density for constant velocity (m²/s³)
pub const DEFAULT_ACCELERATION_PSD: f64 = 1.0;

/// Default white-noise jerk spectral density for constant acceleration (m²/s⁵)
pub const DEFAULT_JERK_PSD: f64 = 1.0;

/// Default longitudinal acceleration 1σ for CTRV (m/s²)
pub const DEFAULT_CTRV_ACCELERATION_STD: f64 = 1.0;

/// Default yaw acceleration 1σ for CTRV (rad/s²)
pub const DEFAULT_CTRV_YAW_ACCELERATION_STD: f64 = 0.5;
