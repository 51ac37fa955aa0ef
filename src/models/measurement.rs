//! Measurement models
//!
//! Maps a track state to the space a detection was measured in. Cartesian
//! detections are aligned into the fusion frame up front, so their model is
//! a linear selection of the position entries. Range/bearing detections stay
//! in the sensor's native space and are compared through the sensor pose,
//! which keeps their noise model exact. Doppler detections add the range
//! rate, the projection of the target velocity relative to the sensor onto
//! the line of sight.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::common::linalg::wrap_angle;
use crate::errors::NumericalError;
use crate::geometry::RigidTransform;
use crate::models::MotionModel;

const MIN_RANGE: f64 = 1e-9;

/// How a detection relates to the track state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeasurementModel {
    /// Fusion-frame position, `h(x) = x[0..d]`
    Position,
    /// Planar range and azimuth seen from a sensor
    Polar {
        /// Fusion frame → sensor frame
        to_sensor: RigidTransform,
    },
    /// Planar range, azimuth and range rate seen from a moving sensor
    PolarDoppler {
        /// Fusion frame → sensor frame
        to_sensor: RigidTransform,
        /// Velocity of the sensor origin in the fusion frame
        sensor_velocity: Vector3<f64>,
    },
    /// Range, azimuth and elevation seen from a sensor
    Spherical {
        /// Fusion frame → sensor frame
        to_sensor: RigidTransform,
    },
}

impl MeasurementModel {
    /// Measurement dimension for a track with the given motion model
    pub fn dim(&self, motion: &MotionModel) -> usize {
        match self {
            MeasurementModel::Position => motion.position_dim(),
            MeasurementModel::Polar { .. } => 2,
            MeasurementModel::PolarDoppler { .. } | MeasurementModel::Spherical { .. } => 3,
        }
    }

    /// Indices of angular measurement components
    pub fn angle_indices(&self) -> &'static [usize] {
        match self {
            MeasurementModel::Position => &[],
            MeasurementModel::Polar { .. }
            | MeasurementModel::PolarDoppler { .. }
            | MeasurementModel::Spherical { .. } => &[1],
        }
    }

    /// True if `h` is linear in the state
    pub fn is_linear(&self) -> bool {
        matches!(self, MeasurementModel::Position)
    }

    /// Expected measurement `h(x)`
    pub fn predict(&self, motion: &MotionModel, x: &DVector<f64>) -> DVector<f64> {
        match self {
            MeasurementModel::Position => x.rows(0, motion.position_dim()).into_owned(),
            MeasurementModel::Polar { to_sensor } => {
                let q = to_sensor.transform_point(&motion.position(x));
                DVector::from_vec(vec![q.x.hypot(q.y), q.y.atan2(q.x)])
            }
            MeasurementModel::PolarDoppler {
                to_sensor,
                sensor_velocity,
            } => {
                let q = to_sensor.transform_point(&motion.position(x));
                let w = to_sensor.transform_vector(&(motion.velocity(x) - sensor_velocity));
                let rho = q.x.hypot(q.y).max(MIN_RANGE);
                DVector::from_vec(vec![rho, q.y.atan2(q.x), (q.x * w.x + q.y * w.y) / rho])
            }
            MeasurementModel::Spherical { to_sensor } => {
                let q = to_sensor.transform_point(&motion.position(x));
                let planar = q.x.hypot(q.y);
                DVector::from_vec(vec![q.norm(), q.y.atan2(q.x), q.z.atan2(planar)])
            }
        }
    }

    /// Jacobian `∂h/∂x` at `x`.
    ///
    /// Fails when the state sits on the sensor axis, where bearings are
    /// undefined.
    pub fn jacobian(&self, motion: &MotionModel, x: &DVector<f64>) -> Result<DMatrix<f64>, NumericalError> {
        let n = motion.state_dim();
        let d = motion.position_dim();
        let m = self.dim(motion);

        let (to_sensor, dh_dq) = match self {
            MeasurementModel::Position => {
                let mut h = DMatrix::zeros(m, n);
                for i in 0..d {
                    h[(i, i)] = 1.0;
                }
                return Ok(h);
            }
            MeasurementModel::Polar { to_sensor } => {
                let q = to_sensor.transform_point(&motion.position(x));
                let r2 = q.x * q.x + q.y * q.y;
                if r2.sqrt() < MIN_RANGE {
                    return Err(NumericalError::NonFinite {
                        context: "measurement jacobian",
                    });
                }
                let r = r2.sqrt();
                #[rustfmt::skip]
                let dh = DMatrix::from_row_slice(2, 3, &[
                    q.x / r,   q.y / r,  0.0,
                    -q.y / r2, q.x / r2, 0.0,
                ]);
                (to_sensor, dh)
            }
            MeasurementModel::PolarDoppler {
                to_sensor,
                sensor_velocity,
            } => return doppler_jacobian(to_sensor, sensor_velocity, motion, x),
            MeasurementModel::Spherical { to_sensor } => {
                let q = to_sensor.transform_point(&motion.position(x));
                let rho2 = q.x * q.x + q.y * q.y;
                let rho = rho2.sqrt();
                let r2 = rho2 + q.z * q.z;
                if rho < MIN_RANGE {
                    return Err(NumericalError::NonFinite {
                        context: "measurement jacobian",
                    });
                }
                let r = r2.sqrt();
                #[rustfmt::skip]
                let dh = DMatrix::from_row_slice(3, 3, &[
                    q.x / r,                   q.y / r,                   q.z / r,
                    -q.y / rho2,               q.x / rho2,                0.0,
                    -q.x * q.z / (r2 * rho),   -q.y * q.z / (r2 * rho),   rho / r2,
                ]);
                (to_sensor, dh)
            }
        };

        Ok(dh_dq * position_to_sensor(to_sensor, n, d))
    }

    /// Residual `z - h(x)` with angular components wrapped to `(-π, π]`
    pub fn residual(&self, z: &DVector<f64>, predicted: &DVector<f64>) -> DVector<f64> {
        let mut y = z - predicted;
        for &i in self.angle_indices() {
            y[i] = wrap_angle(y[i]);
        }
        y
    }

    /// Fusion-frame position and 3×3 position covariance of a native
    /// measurement `z` with noise `noise`.
    ///
    /// For [`MeasurementModel::Position`] the measurement already is the
    /// position and is zero-padded to three axes.
    pub fn inverse(&self, z: &DVector<f64>, noise: &DMatrix<f64>) -> (Vector3<f64>, Matrix3<f64>) {
        match self {
            MeasurementModel::Position => {
                let mut p = Vector3::zeros();
                let mut cov = Matrix3::zeros();
                let k = z.len().min(3);
                for i in 0..k {
                    p[i] = z[i];
                    for j in 0..k {
                        cov[(i, j)] = noise[(i, j)];
                    }
                }
                (p, cov)
            }
            MeasurementModel::Polar { to_sensor } => {
                let (r, az) = (z[0], z[1]);
                let (s, c) = az.sin_cos();
                let q = Vector3::new(r * c, r * s, 0.0);
                #[rustfmt::skip]
                let jac = DMatrix::from_row_slice(3, 2, &[
                    c,   -r * s,
                    s,   r * c,
                    0.0, 0.0,
                ]);
                to_fusion(to_sensor, &q, &(&jac * noise * jac.transpose()))
            }
            MeasurementModel::PolarDoppler { to_sensor, .. } => {
                // Range rate carries no position information
                let polar = MeasurementModel::Polar { to_sensor: *to_sensor };
                polar.inverse(&z.rows(0, 2).into_owned(), &noise.view((0, 0), (2, 2)).into_owned())
            }
            MeasurementModel::Spherical { to_sensor } => {
                let (r, az, el) = (z[0], z[1], z[2]);
                let (sa, ca) = az.sin_cos();
                let (se, ce) = el.sin_cos();
                let q = Vector3::new(r * ce * ca, r * ce * sa, r * se);
                #[rustfmt::skip]
                let jac = DMatrix::from_row_slice(3, 3, &[
                    ce * ca, -r * ce * sa, -r * se * ca,
                    ce * sa, r * ce * ca,  -r * se * sa,
                    se,      0.0,          r * ce,
                ]);
                to_fusion(to_sensor, &q, &(&jac * noise * jac.transpose()))
            }
        }
    }
}

/// `∂q/∂x` for the sensor-frame position `q`: the rotation into the sensor
/// frame applied to the first `d` states
fn position_to_sensor(to_sensor: &RigidTransform, n: usize, d: usize) -> DMatrix<f64> {
    let rot = to_sensor.rotation_matrix();
    let mut dq_dx = DMatrix::zeros(3, n);
    for i in 0..3 {
        for j in 0..d {
            dq_dx[(i, j)] = rot[(i, j)];
        }
    }
    dq_dx
}

fn doppler_jacobian(
    to_sensor: &RigidTransform,
    sensor_velocity: &Vector3<f64>,
    motion: &MotionModel,
    x: &DVector<f64>,
) -> Result<DMatrix<f64>, NumericalError> {
    let n = motion.state_dim();
    let q = to_sensor.transform_point(&motion.position(x));
    let w = to_sensor.transform_vector(&(motion.velocity(x) - sensor_velocity));
    let r2 = q.x * q.x + q.y * q.y;
    let r = r2.sqrt();
    if r < MIN_RANGE {
        return Err(NumericalError::NonFinite {
            context: "measurement jacobian",
        });
    }
    let rate = (q.x * w.x + q.y * w.y) / r;

    #[rustfmt::skip]
    let dh_dq = DMatrix::from_row_slice(3, 3, &[
        q.x / r,                     q.y / r,                     0.0,
        -q.y / r2,                   q.x / r2,                    0.0,
        (w.x - rate * q.x / r) / r,  (w.y - rate * q.y / r) / r,  0.0,
    ]);
    #[rustfmt::skip]
    let dh_dw = DMatrix::from_row_slice(3, 3, &[
        0.0,     0.0,     0.0,
        0.0,     0.0,     0.0,
        q.x / r, q.y / r, 0.0,
    ]);

    let rot = to_sensor.rotation_matrix();
    let rot = DMatrix::from_fn(3, 3, |i, j| rot[(i, j)]);
    let dw_dx = rot * motion.velocity_jacobian(x);
    Ok(dh_dq * position_to_sensor(to_sensor, n, motion.position_dim()) + dh_dw * dw_dx)
}

fn to_fusion(
    to_sensor: &RigidTransform,
    q: &Vector3<f64>,
    covariance: &DMatrix<f64>,
) -> (Vector3<f64>, Matrix3<f64>) {
    let to_fusion = to_sensor.inverse();
    let cov = Matrix3::from_fn(|i, j| covariance[(i, j)]);
    (
        to_fusion.transform_point(q),
        to_fusion.transform_covariance(&cov),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Layout;
    use nalgebra::UnitQuaternion;
    use std::f64::consts::PI;

    fn sensor_pose() -> RigidTransform {
        // sensor → fusion; the model stores the inverse
        RigidTransform::new(
            UnitQuaternion::from_euler_angles(0.0, 0.1, 0.6),
            Vector3::new(2.0, -1.0, 1.5),
        )
    }

    fn finite_difference(model: &MeasurementModel, motion: &MotionModel, x: &DVector<f64>) -> DMatrix<f64> {
        let h = 1e-6;
        let m = model.dim(motion);
        let n = x.len();
        let mut jac = DMatrix::zeros(m, n);
        for j in 0..n {
            let mut plus = x.clone();
            let mut minus = x.clone();
            plus[j] += h;
            minus[j] -= h;
            let diff = model.residual(&model.predict(motion, &plus), &model.predict(motion, &minus));
            for i in 0..m {
                jac[(i, j)] = diff[i] / (2.0 * h);
            }
        }
        jac
    }

    #[test]
    fn test_position_model_is_selection() {
        let motion = MotionModel::constant_velocity(Layout::Spatial, 1.0);
        let x = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let model = MeasurementModel::Position;
        assert_eq!(model.predict(&motion, &x).as_slice(), &[1.0, 2.0, 3.0]);
        let h = model.jacobian(&motion, &x).unwrap();
        assert_eq!(h.shape(), (3, 6));
        assert_eq!(h[(2, 2)], 1.0);
        assert_eq!(h[(0, 3)], 0.0);
    }

    #[test]
    fn test_polar_jacobian_matches_finite_difference() {
        let motion = MotionModel::default();
        let model = MeasurementModel::Polar {
            to_sensor: sensor_pose().inverse(),
        };
        let x = DVector::from_vec(vec![20.0, 15.0, 1.0, -2.0]);
        let analytic = model.jacobian(&motion, &x).unwrap();
        let numeric = finite_difference(&model, &motion, &x);
        assert!((analytic - numeric).abs().max() < 1e-6);
    }

    #[test]
    fn test_doppler_jacobian_matches_finite_difference() {
        let model = MeasurementModel::PolarDoppler {
            to_sensor: sensor_pose().inverse(),
            sensor_velocity: Vector3::new(3.0, -1.0, 0.0),
        };
        let cases = [
            (MotionModel::default(), DVector::from_vec(vec![20.0, 15.0, 1.0, -2.0])),
            (MotionModel::ctrv(), DVector::from_vec(vec![20.0, 15.0, 6.0, 0.4, 0.1])),
        ];
        for (motion, x) in cases {
            let analytic = model.jacobian(&motion, &x).unwrap();
            let numeric = finite_difference(&model, &motion, &x);
            assert!((analytic - numeric).abs().max() < 1e-6, "{}", motion.name());
        }
    }

    #[test]
    fn test_doppler_range_rate_of_receding_target() {
        let model = MeasurementModel::PolarDoppler {
            to_sensor: RigidTransform::identity(),
            sensor_velocity: Vector3::new(1.0, 0.0, 0.0),
        };
        let motion = MotionModel::default();
        // On the x-axis, moving away at 5 m/s while the sensor follows at 1 m/s
        let x = DVector::from_vec(vec![10.0, 0.0, 5.0, 2.0]);
        let z = model.predict(&motion, &x);
        assert!((z[0] - 10.0).abs() < 1e-12);
        assert!(z[1].abs() < 1e-12);
        assert!((z[2] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_spherical_jacobian_matches_finite_difference() {
        let motion = MotionModel::constant_velocity(Layout::Spatial, 1.0);
        let model = MeasurementModel::Spherical {
            to_sensor: sensor_pose().inverse(),
        };
        let x = DVector::from_vec(vec![30.0, -10.0, 4.0, 0.0, 0.0, 0.0]);
        let analytic = model.jacobian(&motion, &x).unwrap();
        let numeric = finite_difference(&model, &motion, &x);
        assert!((analytic - numeric).abs().max() < 1e-6);
    }

    #[test]
    fn test_inverse_round_trip() {
        let motion = MotionModel::constant_velocity(Layout::Spatial, 1.0);
        let model = MeasurementModel::Spherical {
            to_sensor: sensor_pose().inverse(),
        };
        let z = DVector::from_vec(vec![25.0, 0.4, 0.05]);
        let noise = DMatrix::from_diagonal(&DVector::from_vec(vec![0.25, 1e-4, 1e-4]));
        let (p, cov) = model.inverse(&z, &noise);

        let x = motion.initial_state(&p, None);
        let back = model.predict(&motion, &x);
        assert!((back - z).norm() < 1e-9);
        assert!((cov - cov.transpose()).norm() < 1e-12);
        assert!(cov.symmetric_eigenvalues().min() > 0.0);
    }

    #[test]
    fn test_polar_residual_wraps_azimuth() {
        let model = MeasurementModel::Polar {
            to_sensor: RigidTransform::identity(),
        };
        let z = DVector::from_vec(vec![10.0, PI - 0.01]);
        let hx = DVector::from_vec(vec![10.0, -PI + 0.01]);
        let y = model.residual(&z, &hx);
        assert!((y[1] + 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_polar_jacobian_singular_at_sensor() {
        let motion = MotionModel::default();
        let model = MeasurementModel::Polar {
            to_sensor: RigidTransform::identity(),
        };
        let x = DVector::zeros(4);
        assert!(model.jacobian(&motion, &x).is_err());
    }
}
