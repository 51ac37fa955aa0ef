//! Pairwise association cost
//!
//! Evaluates one (track, detection) pair:
//!
//! 1. **Innovation**: residual and innovation covariance from the filter bank
//! 2. **Mahalanobis distance**: `d² = yᵀ S⁻¹ y`, the gating statistic
//! 3. **Cost**: `d²`, optionally plus a weighted appearance distance
//!
//! The innovation is kept so the update of the selected pair does not
//! recompute it.

use std::f64::consts::PI;

use crate::components::{innovation, Innovation, PredictedTrack};
use crate::config::{CostFunction, FilterFamily};
use crate::errors::NumericalError;
use crate::geometry::AlignedDetection;

/// Evaluation of one (track, detection) pair
#[derive(Debug, Clone, PartialEq)]
pub struct PairLikelihood {
    /// Innovation of the detection against the predicted track
    pub innovation: Innovation,
    /// Assignment cost
    pub cost: f64,
    /// `ln N(y; 0, S)`
    pub log_likelihood: f64,
}

impl PairLikelihood {
    /// Squared Mahalanobis distance
    #[inline]
    pub fn mahalanobis_squared(&self) -> f64 {
        self.innovation.mahalanobis_squared
    }
}

/// Cosine distance `1 - cos θ` in `[0, 2]`.
///
/// `None` if the lengths differ or either vector is zero.
pub fn appearance_distance(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some((1.0 - dot / (na * nb)).clamp(0.0, 2.0))
}

/// Evaluate a (track, detection) pair
pub fn compute_likelihood(
    predicted: &PredictedTrack<'_>,
    detection: &AlignedDetection,
    family: &FilterFamily,
    cost_function: &CostFunction,
) -> Result<PairLikelihood, NumericalError> {
    let innovation = innovation(&predicted.state, detection, family)?;
    let d2 = innovation.mahalanobis_squared;

    let appearance = match cost_function {
        CostFunction::Kinematic => 0.0,
        CostFunction::KinematicAppearance { weight } => {
            match (&predicted.track.embedding, &detection.embedding) {
                (Some(a), Some(b)) => weight * appearance_distance(a, b).unwrap_or(0.0),
                _ => 0.0,
            }
        }
    };

    let m = innovation.residual.len() as f64;
    let log_det: f64 = innovation
        .covariance
        .clone()
        .cholesky()
        .map(|chol| chol.l_dirty().diagonal().iter().map(|d| 2.0 * d.ln()).sum::<f64>())
        .ok_or(NumericalError::SingularInnovation)?;
    let log_likelihood = -0.5 * (m * (2.0 * PI).ln() + log_det + d2);

    Ok(PairLikelihood {
        innovation,
        cost: d2 + appearance,
        log_likelihood,
    })
}
