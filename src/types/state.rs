//! Gaussian track state

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::errors::NumericalError;
use crate::geometry::FrameId;
use crate::models::MotionModel;

/// Mean and covariance of a track under a motion model.
///
/// The covariance is kept symmetric positive semi-definite; the filter bank
/// checks this after every predict and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackState {
    /// State mean
    pub mean: DVector<f64>,
    /// State covariance
    pub covariance: DMatrix<f64>,
    /// Motion model the state layout follows
    pub motion: MotionModel,
    /// Frame the state is expressed in
    pub frame_id: FrameId,
    /// Time the mean refers to
    pub timestamp: f64,
}

impl TrackState {
    /// Create a state, checking dimensions against the motion model
    pub fn new(
        mean: DVector<f64>,
        covariance: DMatrix<f64>,
        motion: MotionModel,
        frame_id: FrameId,
        timestamp: f64,
    ) -> Result<Self, NumericalError> {
        let n = motion.state_dim();
        if mean.len() != n {
            return Err(NumericalError::DimensionMismatch {
                expected: n,
                actual: mean.len(),
                context: "state mean",
            });
        }
        if covariance.nrows() != n || covariance.ncols() != n {
            return Err(NumericalError::DimensionMismatch {
                expected: n,
                actual: covariance.nrows().max(covariance.ncols()),
                context: "state covariance",
            });
        }
        if mean.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
            return Err(NumericalError::NonFinite {
                context: "track state",
            });
        }
        Ok(Self {
            mean,
            covariance,
            motion,
            frame_id,
            timestamp,
        })
    }

    /// State dimension
    #[inline]
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Position, zero-padded to three axes
    pub fn position(&self) -> Vector3<f64> {
        self.motion.position(&self.mean)
    }

    /// Cartesian velocity, zero-padded to three axes
    pub fn velocity(&self) -> Vector3<f64> {
        self.motion.velocity(&self.mean)
    }

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
}
