//! Measurement update
//!
//! Folds an aligned detection into a predicted state.
//!
//! Kalman family (extended for nonlinear `h`):
//! ```text
//! y = z ⊖ h(x),   S = H P Hᵀ + R,   K = P Hᵀ S⁻¹
//! x' = x + K y,   P' = (I - K H) P (I - K H)ᵀ + K R Kᵀ     (Joseph form)
//! ```
//!
//! Unscented family:
//! ```text
//! Zᵢ = h(χᵢ),  ẑ = Σ Wmᵢ Zᵢ,  S = Σ Wcᵢ ΔZ ΔZᵀ + R,  Pxz = Σ Wcᵢ ΔX ΔZᵀ
//! K = Pxz S⁻¹,  x' = x + K y,  P' = P - K S Kᵀ
//! ```
//!
//! `⊖` wraps angular residuals. The innovation is computed once and reused
//! for gating, scoring and the update.

use nalgebra::{DMatrix, DVector};

use super::unscented::{weighted_cross_covariance, weighted_covariance, weighted_mean, SigmaPoints, UnscentedParams};
use crate::common::linalg::{ensure_covariance, symmetrize, wrap_angle};
use crate::config::FilterFamily;
use crate::errors::NumericalError;
use crate::geometry::AlignedDetection;
use crate::types::TrackState;

/// Innovation of a detection against a predicted state
#[derive(Debug, Clone, PartialEq)]
pub struct Innovation {
    /// `z ⊖ h(x)`
    pub residual: DVector<f64>,
    /// Innovation covariance `S`
    pub covariance: DMatrix<f64>,
    /// `yᵀ S⁻¹ y`
    pub mahalanobis_squared: f64,
    /// State-measurement cross-covariance `Pxz`
    pub cross_covariance: DMatrix<f64>,
    /// Measurement noise `R`
    pub noise: DMatrix<f64>,
    /// Measurement Jacobian, present for the Kalman family
    pub jacobian: Option<DMatrix<f64>>,
}

/// Posterior of an update
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// Posterior state
    pub state: TrackState,
    /// Innovation used
    pub innovation: Innovation,
}

impl UpdateOutcome {
    /// `yᵀ S⁻¹ y` of the update
    #[inline]
    pub fn mahalanobis_squared(&self) -> f64 {
        self.innovation.mahalanobis_squared
    }

    /// `S` of the update
    #[inline]
    pub fn innovation_covariance(&self) -> &DMatrix<f64> {
        &self.innovation.covariance
    }
}

/// Compute the innovation of `detection` against `predicted`.
///
/// Fails with [`NumericalError::SingularInnovation`] if `S` is not positive
/// definite.
pub fn innovation(
    predicted: &TrackState,
    detection: &AlignedDetection,
    family: &FilterFamily,
) -> Result<Innovation, NumericalError> {
    let motion = &predicted.motion;
    let model = &detection.model;
    let (z, noise) = detection.measurement(motion);
    if z.len() != model.dim(motion) {
        return Err(NumericalError::DimensionMismatch {
            expected: model.dim(motion),
            actual: z.len(),
            context: "measurement",
        });
    }

    let (residual, covariance, cross_covariance, jacobian) = match UnscentedParams::from_family(family) {
        None => {
            let h = model.jacobian(motion, &predicted.mean)?;
            let hx = model.predict(motion, &predicted.mean);
            let residual = model.residual(&z, &hx);
            let pht = &predicted.covariance * h.transpose();
            let s = &h * &pht + &noise;
            (residual, s, pht, Some(h))
        }
        Some(params) => {
            let sigma = SigmaPoints::new(
                &predicted.mean,
                &predicted.covariance,
                &params,
                motion.angle_indices(),
            )?;
            let projected = sigma.map(|x| model.predict(motion, x));
            let z_hat = weighted_mean(&projected, &sigma.wm, model.angle_indices());
            let s = weighted_covariance(&projected, &z_hat, &sigma.wc, model.angle_indices()) + &noise;
            let pxz = weighted_cross_covariance(
                &sigma.points,
                &predicted.mean,
                motion.angle_indices(),
                &projected,
                &z_hat,
                model.angle_indices(),
                &sigma.wc,
            );
            (model.residual(&z, &z_hat), s, pxz, None)
        }
    };

    let covariance = symmetrize(&covariance);
    if residual.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
        return Err(NumericalError::NonFinite { context: "innovation" });
    }
    let chol = covariance
        .clone()
        .cholesky()
        .ok_or(NumericalError::SingularInnovation)?;
    let mahalanobis_squared = residual.dot(&chol.solve(&residual));

    Ok(Innovation {
        residual,
        covariance,
        mahalanobis_squared,
        cross_covariance,
        noise,
        jacobian,
    })
}

/// Apply a precomputed innovation to `predicted`
pub fn apply_innovation(
    predicted: &TrackState,
    innovation: &Innovation,
    tolerance: f64,
) -> Result<TrackState, NumericalError> {
    let chol = innovation
        .covariance
        .clone()
        .cholesky()
        .ok_or(NumericalError::SingularInnovation)?;

    // K = Pxz S⁻¹  ⇔  Kᵀ = S⁻¹ Pxzᵀ
    let gain = chol.solve(&innovation.cross_covariance.transpose()).transpose();

    let mut mean = &predicted.mean + &gain * &innovation.residual;
    for &a in predicted.motion.angle_indices() {
        mean[a] = wrap_angle(mean[a]);
    }

    let covariance = match &innovation.jacobian {
        Some(h) => {
            let n = predicted.dim();
            let i_kh = DMatrix::identity(n, n) - &gain * h;
            &i_kh * &predicted.covariance * i_kh.transpose() + &gain * &innovation.noise * gain.transpose()
        }
        None => &predicted.covariance - &gain * &innovation.covariance * gain.transpose(),
    };
    if mean.iter().any(|v| !v.is_finite()) {
        return Err(NumericalError::NonFinite { context: "updated mean" });
    }
    let covariance = ensure_covariance(&covariance, tolerance, "updated")?;

    Ok(TrackState {
        mean,
        covariance,
        ..predicted.clone()
    })
}

/// Update `predicted` with `detection`
pub fn update(
    predicted: &TrackState,
    detection: &AlignedDetection,
    family: &FilterFamily,
    tolerance: f64,
) -> Result<UpdateOutcome, NumericalError> {
    let innovation = innovation(predicted, detection, family)?;
    let state = apply_innovation(predicted, &innovation, tolerance)?;
    Ok(UpdateOutcome { state, innovation })
}
