//! Error types for the fusion core
//!
//! Each error kind maps to one isolation level of a fusion cycle:
//!
//! | Error | Scope | Effect |
//! |---|---|---|
//! | [`FrameError`] | one detection | detection dropped, cycle continues |
//! | [`DetectionError`] | one detection | detection dropped, cycle continues |
//! | [`NumericalError`] | one track | track deleted, other tracks unaffected |
//! | [`AssociationError`] | whole cycle | cycle aborted, track set unchanged |
//! | [`TemporalOrderError`] | whole batch | batch rejected, no state mutation |
//!
//! Dropped detections are reported with a [`RejectionReason`].
//!
//! [`FusionError`] wraps all of them for the cycle-level API.

use thiserror::Error;

use crate::geometry::FrameId;
use crate::types::{DetectionId, SensorId};

/// Errors raised by the frame tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    /// Frame id is not present in the arena
    #[error("frame {0:?} is not registered")]
    UnknownFrame(FrameId),

    /// Frame name lookup failed
    #[error("no frame named '{0}'")]
    UnknownName(String),

    /// Frame name already taken
    #[error("a frame named '{0}' is already registered")]
    DuplicateName(String),

    /// The two frames live in different trees
    #[error("frames {from:?} and {to:?} have no common ancestor")]
    Disconnected {
        /// Source frame
        from: FrameId,
        /// Target frame
        to: FrameId,
    },

    /// A calibration update older than the stored one
    #[error("transform update for {frame:?} at t={timestamp} is older than t={valid_at}")]
    StaleTransform {
        /// Frame being updated
        frame: FrameId,
        /// Timestamp of the rejected update
        timestamp: f64,
        /// Timestamp of the transform currently stored
        valid_at: f64,
    },

    /// Transform contains NaN or infinite values
    #[error("transform for '{0}' is not finite")]
    NonFiniteTransform(String),

    /// Deserialized frame arena is not a forest in registration order
    #[error("frame {frame:?} is malformed: {reason}")]
    MalformedTree {
        /// First offending frame
        frame: FrameId,
        /// What is wrong with it
        reason: String,
    },
}

/// Numerical failures inside the filter bank.
///
/// A track whose prediction or update produces one of these is flagged for
/// deletion rather than propagated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericalError {
    /// Prediction requested backwards in time
    #[error("negative time step dt={dt}")]
    NegativeTimeStep {
        /// Offending time step
        dt: f64,
    },

    /// Covariance lost positive semi-definiteness
    #[error("{context} covariance is not positive semi-definite (min eigenvalue {min_eigenvalue:.3e})")]
    NotPositiveSemiDefinite {
        /// Which covariance failed the check
        context: &'static str,
        /// Smallest eigenvalue found
        min_eigenvalue: f64,
    },

    /// Innovation covariance could not be inverted
    #[error("innovation covariance is singular")]
    SingularInnovation,

    /// Vector or matrix contains NaN or infinite values
    #[error("{context} contains non-finite values")]
    NonFinite {
        /// Which quantity was non-finite
        context: &'static str,
    },

    /// Dimension mismatch between state and model
    #[error("dimension mismatch for {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// What was expected
        expected: usize,
        /// What was received
        actual: usize,
        /// Which quantity mismatched
        context: &'static str,
    },
}

/// Errors raised by the association engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssociationError {
    /// Cost matrix contains NaN or negative infinity
    #[error("malformed cost at (track row {row}, detection column {col}): {value}")]
    MalformedCost {
        /// Row (track index)
        row: usize,
        /// Column (detection index)
        col: usize,
        /// Offending value
        value: f64,
    },

    /// Cost matrix shape does not match the inputs
    #[error("cost matrix is {rows}x{cols}, expected {expected_rows}x{expected_cols}")]
    ShapeMismatch {
        /// Actual rows
        rows: usize,
        /// Actual columns
        cols: usize,
        /// Expected rows
        expected_rows: usize,
        /// Expected columns
        expected_cols: usize,
    },

    /// The solver found no complete assignment of the extended matrix
    #[error("no feasible assignment exists")]
    Infeasible,
}

/// A batch older than already-processed data.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("batch from sensor {sensor} at t={timestamp} is older than last processed t={last_timestamp}")]
pub struct TemporalOrderError {
    /// Sensor that produced the batch
    pub sensor: SensorId,
    /// Batch timestamp
    pub timestamp: f64,
    /// Latest timestamp already processed
    pub last_timestamp: f64,
}

/// Malformed detection payloads.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    /// Noise covariance has the wrong shape for the measurement
    #[error("detection {id}: noise covariance is {rows}x{cols}, expected {expected}x{expected}")]
    NoiseShape {
        /// Detection id
        id: DetectionId,
        /// Required dimension
        expected: usize,
        /// Actual rows
        rows: usize,
        /// Actual columns
        cols: usize,
    },

    /// Geometry or noise has NaN/infinite entries
    #[error("detection {id}: {context} is not finite")]
    NonFinite {
        /// Detection id
        id: DetectionId,
        /// Offending field
        context: &'static str,
    },

    /// Noise covariance is not positive definite
    #[error("detection {id}: noise covariance is not positive definite")]
    NoiseNotPositiveDefinite {
        /// Detection id
        id: DetectionId,
    },

    /// Measurement cannot be expressed in the configured state layout
    #[error("detection {id}: {reason}")]
    Unsupported {
        /// Detection id
        id: DetectionId,
        /// Explanation
        reason: String,
    },
}

/// Why a detection was dropped from a cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectionReason {
    /// Its frame could not be related to the fusion frame
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Its payload is malformed
    #[error(transparent)]
    Detection(#[from] DetectionError),

    /// A track could not be initialized from it
    #[error(transparent)]
    Numerical(#[from] NumericalError),
}

/// Invalid tracker configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field failed validation
    #[error("invalid configuration for `{field}`: {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// Explanation
        reason: String,
    },

    /// JSON (de)serialization failure
    #[error("configuration json: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Top-level error returned by the fusion engine.
#[derive(Debug, Error)]
pub enum FusionError {
    /// Frame tree failure
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Filter bank failure
    #[error(transparent)]
    Numerical(#[from] NumericalError),

    /// Association failure (cycle aborted)
    #[error("cycle aborted: {0}")]
    Association(#[from] AssociationError),

    /// Out-of-order batch
    #[error(transparent)]
    TemporalOrder(#[from] TemporalOrderError),

    /// Malformed detection
    #[error(transparent)]
    Detection(#[from] DetectionError),

    /// Bad configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}
