//! Track prediction
//!
//! Propagates a Gaussian state to a target time under its motion model:
//!
//! - Kalman: `x' = f(x)`, `P' = F P Fᵀ + Q` (F is the Jacobian for CTRV)
//! - Unscented: sigma points pushed through `f`, moments recovered, `+ Q`
//!
//! Every predicted covariance is symmetrized and checked positive
//! semi-definite. A failure is reported for that track only.

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use super::unscented::{weighted_covariance, weighted_mean, SigmaPoints, UnscentedParams};
use crate::common::linalg::{ensure_covariance, wrap_angle};
use crate::config::FilterFamily;
use crate::errors::NumericalError;
use crate::types::{Track, TrackId, TrackState};

/// A track with its state predicted to the cycle time
#[derive(Debug, Clone)]
pub struct PredictedTrack<'a> {
    /// Track before prediction
    pub track: &'a Track,
    /// Predicted state
    pub state: TrackState,
}

/// Predict a state `dt` seconds ahead
pub fn predict(
    state: &TrackState,
    dt: f64,
    family: &FilterFamily,
    tolerance: f64,
) -> Result<TrackState, NumericalError> {
    let motion = state.motion;
    let prediction = motion.predict(&state.mean, dt)?;
    if dt == 0.0 {
        return Ok(state.clone());
    }

    let (mut mean, covariance) = match UnscentedParams::from_family(family) {
        None => {
            let f = &prediction.jacobian;
            let p = f * &state.covariance * f.transpose() + &prediction.process_noise;
            (prediction.mean, p)
        }
        Some(params) => {
            let angles = motion.angle_indices();
            let sigma = SigmaPoints::new(&state.mean, &state.covariance, &params, angles)?;
            let propagated = sigma.map(|x| motion.transition(x, dt));
            if propagated.iter().any(|p| p.iter().any(|v| !v.is_finite())) {
                return Err(NumericalError::NonFinite {
                    context: "propagated sigma points",
                });
            }
            let mean = weighted_mean(&propagated, &sigma.wm, angles);
            let p = weighted_covariance(&propagated, &mean, &sigma.wc, angles) + &prediction.process_noise;
            (mean, p)
        }
    };

    for &a in motion.angle_indices() {
        mean[a] = wrap_angle(mean[a]);
    }
    let covariance = ensure_covariance(&covariance, tolerance, "predicted")?;

    Ok(TrackState {
        mean,
        covariance,
        motion,
        frame_id: state.frame_id,
        timestamp: state.timestamp + dt,
    })
}

/// Predict a state to an absolute time.
///
/// The returned state's timestamp is exactly `timestamp`.
pub fn predict_to(
    state: &TrackState,
    timestamp: f64,
    family: &FilterFamily,
    tolerance: f64,
) -> Result<TrackState, NumericalError> {
    let mut predicted = predict(state, timestamp - state.timestamp, family, tolerance)?;
    predicted.timestamp = timestamp;
    Ok(predicted)
}

/// Predict every track to `timestamp`.
///
/// Returns the successful predictions in input order and the failures.
pub fn predict_tracks<'a>(
    tracks: &'a [Track],
    timestamp: f64,
    family: &FilterFamily,
    tolerance: f64,
) -> (Vec<PredictedTrack<'a>>, Vec<(TrackId, NumericalError)>) {
    let run = |track: &'a Track| {
        predict_to(&track.state, timestamp, family, tolerance)
            .map(|state| PredictedTrack { track, state })
            .map_err(|e| (track.id, e))
    };

    #[cfg(feature = "rayon")]
    let results: Vec<_> = tracks.par_iter().map(run).collect();
    #[cfg(not(feature = "rayon"))]
    let results: Vec<_> = tracks.iter().map(run).collect();

    let mut predicted = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(p) => predicted.push(p),
            Err(f) => failures.push(f),
        }
    }
    (predicted, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::FrameId;
    use crate::models::{Layout, MotionModel};
    use nalgebra::{DMatrix, DVector};

    fn cv_state() -> TrackState {
        let motion = MotionModel::constant_velocity(Layout::Planar, 1.0);
        TrackState::new(
            DVector::from_vec(vec![0.0, 0.0, 1.0, 2.0]),
            DMatrix::identity(4, 4),
            motion,
            FrameId(0),
            0.0,
        )
        .unwrap()
    }

    fn ctrv_state() -> TrackState {
        TrackState::new(
            DVector::from_vec(vec![0.0, 0.0, 5.0, 0.3, 0.2]),
            DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 1.0, 0.5, 0.1, 0.05])),
            MotionModel::ctrv(),
            FrameId(0),
            0.0,
        )
        .unwrap()
    }

    #[test]
    fn test_cv_prediction() {
        let state = predict(&cv_state(), 1.0, &FilterFamily::Kalman, 1e-9).unwrap();
        assert!((state.mean[0] - 1.0).abs() < 1e-12);
        assert!((state.mean[1] - 2.0).abs() < 1e-12);
        // P00 = 1 + dt² · 1 + q dt³/3
        assert!((state.covariance[(0, 0)] - (2.0 + 1.0 / 3.0)).abs() < 1e-12);
        assert_eq!(state.timestamp, 1.0);
    }

    #[test]
    fn test_zero_dt_is_identity() {
        let state = cv_state();
        let out = predict(&state, 0.0, &FilterFamily::unscented(), 1e-9).unwrap();
        assert_eq!(out, state);
    }

    #[test]
    fn test_negative_dt_rejected() {
        let err = predict(&cv_state(), -0.1, &FilterFamily::Kalman, 1e-9).unwrap_err();
        assert!(matches!(err, NumericalError::NegativeTimeStep { .. }));
    }

    #[test]
    fn test_unscented_matches_kalman_for_linear_model() {
        let kf = predict(&cv_state(), 0.5, &FilterFamily::Kalman, 1e-9).unwrap();
        let ukf = predict(&cv_state(), 0.5, &FilterFamily::unscented(), 1e-9).unwrap();
        assert!((&kf.mean - &ukf.mean).norm() < 1e-9);
        assert!((&kf.covariance - &ukf.covariance).abs().max() < 1e-9);
    }

    #[test]
    fn test_ctrv_ekf_and_ukf_agree_roughly() {
        let ekf = predict(&ctrv_state(), 0.1, &FilterFamily::Kalman, 1e-9).unwrap();
        let ukf = predict(&ctrv_state(), 0.1, &FilterFamily::unscented(), 1e-9).unwrap();
        assert!((&ekf.mean - &ukf.mean).norm() < 0.1);
        assert!(ekf.covariance.symmetric_eigenvalues().iter().all(|&v| v >= -1e-12));
        assert!(ukf.covariance.symmetric_eigenvalues().iter().all(|&v| v >= -1e-12));
    }

    #[test]
    fn test_predict_to_sets_timestamp() {
        let state = predict_to(&cv_state(), 0.3, &FilterFamily::Kalman, 1e-9).unwrap();
        assert_eq!(state.timestamp, 0.3);
    }
}
