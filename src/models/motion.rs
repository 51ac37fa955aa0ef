//! Motion models
//!
//! A closed set of kinematic models, each carrying its own process-noise
//! parameters. State layouts (position always first):
//!
//! | Model | Planar state | Spatial state |
//! |---|---|---|
//! | `ConstantVelocity` | `[x, y, vx, vy]` | `[x, y, z, vx, vy, vz]` |
//! | `ConstantAcceleration` | `[x, y, vx, vy, ax, ay]` | `[x, y, z, vx, vy, vz, ax, ay, az]` |
//! | `ConstantTurnRate` | `[x, y, v, yaw, yaw_rate]` | - |
//!
//! Linear models use the continuous white-noise discretization: white
//! acceleration for constant velocity and white jerk for constant
//! acceleration. CTRV propagates along an arc and falls back to a straight
//! line when the yaw rate is below [`YAW_RATE_EPSILON`].

use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::common::constants::{
    DEFAULT_ACCELERATION_PSD, DEFAULT_CTRV_ACCELERATION_STD, DEFAULT_CTRV_YAW_ACCELERATION_STD,
    DEFAULT_JERK_PSD, YAW_RATE_EPSILON,
};
use crate::common::linalg::{block_diagonal, wrap_angle};
use crate::config::InitialUncertainty;
use crate::errors::NumericalError;

/// Number of position axes carried by a linear model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// `x, y`
    Planar,
    /// `x, y, z`
    Spatial,
}

impl Layout {
    /// Number of position axes
    #[inline]
    pub fn dims(self) -> usize {
        match self {
            Layout::Planar => 2,
            Layout::Spatial => 3,
        }
    }
}

/// Kinematic model of a track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MotionModel {
    /// Constant velocity driven by white acceleration noise
    ConstantVelocity {
        /// Position axes
        layout: Layout,
        /// Acceleration spectral density `q` (m²/s³)
        acceleration_psd: f64,
    },
    /// Constant acceleration driven by white jerk noise
    ConstantAcceleration {
        /// Position axes
        layout: Layout,
        /// Jerk spectral density `q` (m²/s⁵)
        jerk_psd: f64,
    },
    /// Constant turn rate and velocity (planar)
    ConstantTurnRate {
        /// Longitudinal acceleration 1σ (m/s²)
        acceleration_std: f64,
        /// Yaw acceleration 1σ (rad/s²)
        yaw_acceleration_std: f64,
    },
}

impl Default for MotionModel {
    fn default() -> Self {
        MotionModel::constant_velocity(Layout::Planar, DEFAULT_ACCELERATION_PSD)
    }
}

/// Result of propagating a mean through a motion model
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Propagated mean
    pub mean: DVector<f64>,
    /// Jacobian of the transition at the prior mean
    pub jacobian: DMatrix<f64>,
    /// Process noise for the interval
    pub process_noise: DMatrix<f64>,
}

impl MotionModel {
    /// Constant velocity model
    pub fn constant_velocity(layout: Layout, acceleration_psd: f64) -> Self {
        MotionModel::ConstantVelocity {
            layout,
            acceleration_psd,
        }
    }

    /// Constant acceleration model
    pub fn constant_acceleration(layout: Layout, jerk_psd: f64) -> Self {
        MotionModel::ConstantAcceleration { layout, jerk_psd }
    }

    /// CTRV model
    pub fn constant_turn_rate(acceleration_std: f64, yaw_acceleration_std: f64) -> Self {
        MotionModel::ConstantTurnRate {
            acceleration_std,
            yaw_acceleration_std,
        }
    }

    /// CTRV with default noise
    pub fn ctrv() -> Self {
        Self::constant_turn_rate(
            DEFAULT_CTRV_ACCELERATION_STD,
            DEFAULT_CTRV_YAW_ACCELERATION_STD,
        )
    }

    /// Constant acceleration with default noise
    pub fn ca(layout: Layout) -> Self {
        Self::constant_acceleration(layout, DEFAULT_JERK_PSD)
    }

    /// Short model name for logs
    pub fn name(&self) -> &'static str {
        match self {
            MotionModel::ConstantVelocity { .. } => "cv",
            MotionModel::ConstantAcceleration { .. } => "ca",
            MotionModel::ConstantTurnRate { .. } => "ctrv",
        }
    }

    /// State dimension
    pub fn state_dim(&self) -> usize {
        match self {
            MotionModel::ConstantVelocity { layout, .. } => 2 * layout.dims(),
            MotionModel::ConstantAcceleration { layout, .. } => 3 * layout.dims(),
            MotionModel::ConstantTurnRate { .. } => 5,
        }
    }

    /// Number of position axes (positions occupy the first entries of the state)
    pub fn position_dim(&self) -> usize {
        match self {
            MotionModel::ConstantVelocity { layout, .. }
            | MotionModel::ConstantAcceleration { layout, .. } => layout.dims(),
            MotionModel::ConstantTurnRate { .. } => 2,
        }
    }

    /// Indices of angular state components
    pub fn angle_indices(&self) -> &'static [usize] {
        match self {
            MotionModel::ConstantTurnRate { .. } => &[3],
            _ => &[],
        }
    }

    /// True if the transition is linear in the state
    pub fn is_linear(&self) -> bool {
        !matches!(self, MotionModel::ConstantTurnRate { .. })
    }

    /// Check the noise parameters
    pub fn validate(&self) -> Result<(), String> {
        let params: Vec<(&str, f64)> = match *self {
            MotionModel::ConstantVelocity {
                acceleration_psd, ..
            } => vec![("acceleration_psd", acceleration_psd)],
            MotionModel::ConstantAcceleration { jerk_psd, .. } => vec![("jerk_psd", jerk_psd)],
            MotionModel::ConstantTurnRate {
                acceleration_std,
                yaw_acceleration_std,
            } => vec![
                ("acceleration_std", acceleration_std),
                ("yaw_acceleration_std", yaw_acceleration_std),
            ],
        };
        for (name, value) in params {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{name} must be finite and non-negative, got {value}"));
            }
        }
        Ok(())
    }

    /// Position of a mean, zero-padded to three axes
    pub fn position(&self, mean: &DVector<f64>) -> Vector3<f64> {
        let mut p = Vector3::zeros();
        for i in 0..self.position_dim().min(mean.len()) {
            p[i] = mean[i];
        }
        p
    }

    /// Velocity of a mean, zero-padded to three axes
    pub fn velocity(&self, mean: &DVector<f64>) -> Vector3<f64> {
        match self {
            MotionModel::ConstantTurnRate { .. } => {
                let (v, yaw) = (mean[2], mean[3]);
                Vector3::new(v * yaw.cos(), v * yaw.sin(), 0.0)
            }
            _ => {
                let d = self.position_dim();
                let mut out = Vector3::zeros();
                for i in 0..d {
                    out[i] = mean[d + i];
                }
                out
            }
        }
    }

    /// Jacobian of [`MotionModel::velocity`] with respect to the state (3 × n)
    pub fn velocity_jacobian(&self, mean: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(3, self.state_dim());
        match self {
            MotionModel::ConstantTurnRate { .. } => {
                let (v, yaw) = (mean[2], mean[3]);
                let (s, c) = yaw.sin_cos();
                jac[(0, 2)] = c;
                jac[(1, 2)] = s;
                jac[(0, 3)] = -v * s;
                jac[(1, 3)] = v * c;
            }
            _ => {
                let d = self.position_dim();
                for i in 0..d {
                    jac[(i, d + i)] = 1.0;
                }
            }
        }
        jac
    }

    /// Mean of a newborn track at `position`, optionally moving at `velocity`
    pub fn initial_state(&self, position: &Vector3<f64>, velocity: Option<&Vector3<f64>>) -> DVector<f64> {
        let mut mean = DVector::zeros(self.state_dim());
        let d = self.position_dim();
        for i in 0..d {
            mean[i] = position[i];
        }
        if let Some(v) = velocity {
            match self {
                MotionModel::ConstantTurnRate { .. } => {
                    mean[2] = v.x.hypot(v.y);
                    mean[3] = v.y.atan2(v.x);
                }
                _ => {
                    for i in 0..d {
                        mean[d + i] = v[i];
                    }
                }
            }
        }
        mean
    }

    /// Covariance of a newborn track.
    ///
    /// The position block is the measured position covariance inflated by
    /// `position_std²`; the remaining blocks come from `uncertainty`.
    pub fn initial_covariance(
        &self,
        uncertainty: &InitialUncertainty,
        position_covariance: &DMatrix<f64>,
    ) -> DMatrix<f64> {
        let d = self.position_dim();
        let mut pos = DMatrix::identity(d, d) * uncertainty.position_std.powi(2);
        if position_covariance.nrows() >= d && position_covariance.ncols() >= d {
            pos += position_covariance.view((0, 0), (d, d));
        }

        let diag = |values: &[f64]| DMatrix::from_diagonal(&DVector::from_iterator(values.len(), values.iter().map(|s| s * s)));

        match self {
            MotionModel::ConstantVelocity { .. } => {
                let vel = diag(&vec![uncertainty.velocity_std; d]);
                block_diagonal(&[&pos, &vel])
            }
            MotionModel::ConstantAcceleration { .. } => {
                let vel = diag(&vec![uncertainty.velocity_std; d]);
                let acc = diag(&vec![uncertainty.acceleration_std; d]);
                block_diagonal(&[&pos, &vel, &acc])
            }
            MotionModel::ConstantTurnRate { .. } => {
                let rest = diag(&[
                    uncertainty.velocity_std,
                    uncertainty.heading_std,
                    uncertainty.yaw_rate_std,
                ]);
                block_diagonal(&[&pos, &rest])
            }
        }
    }

    /// Nonlinear transition `f(x, dt)`
    pub fn transition(&self, mean: &DVector<f64>, dt: f64) -> DVector<f64> {
        match self {
            MotionModel::ConstantTurnRate { .. } => ctrv_transition(mean, dt),
            _ => self.linear_transition_matrix(dt) * mean,
        }
    }

    /// Jacobian `∂f/∂x` at `mean`
    pub fn jacobian(&self, mean: &DVector<f64>, dt: f64) -> DMatrix<f64> {
        match self {
            MotionModel::ConstantTurnRate { .. } => ctrv_jacobian(mean, dt),
            _ => self.linear_transition_matrix(dt),
        }
    }

    /// Process noise `Q(dt)`, evaluated at `mean` for CTRV
    pub fn process_noise(&self, mean: &DVector<f64>, dt: f64) -> DMatrix<f64> {
        match *self {
            MotionModel::ConstantVelocity {
                layout,
                acceleration_psd,
            } => {
                let (dt2, dt3) = (dt * dt, dt * dt * dt);
                #[rustfmt::skip]
                let block = [
                    dt3 / 3.0, dt2 / 2.0,
                    dt2 / 2.0, dt,
                ];
                kron_identity(&block, 2, layout.dims(), acceleration_psd)
            }
            MotionModel::ConstantAcceleration { layout, jerk_psd } => {
                let (dt2, dt3, dt4, dt5) = (dt.powi(2), dt.powi(3), dt.powi(4), dt.powi(5));
                #[rustfmt::skip]
                let block = [
                    dt5 / 20.0, dt4 / 8.0, dt3 / 6.0,
                    dt4 / 8.0,  dt3 / 3.0, dt2 / 2.0,
                    dt3 / 6.0,  dt2 / 2.0, dt,
                ];
                kron_identity(&block, 3, layout.dims(), jerk_psd)
            }
            MotionModel::ConstantTurnRate {
                acceleration_std,
                yaw_acceleration_std,
            } => {
                let yaw = mean[3];
                let half = 0.5 * dt * dt;
                #[rustfmt::skip]
                let g = DMatrix::from_row_slice(5, 2, &[
                    half * yaw.cos(), 0.0,
                    half * yaw.sin(), 0.0,
                    dt,               0.0,
                    0.0,              half,
                    0.0,              dt,
                ]);
                let noise = DMatrix::from_diagonal(&DVector::from_vec(vec![
                    acceleration_std.powi(2),
                    yaw_acceleration_std.powi(2),
                ]));
                &g * noise * g.transpose()
            }
        }
    }

    /// Propagate a mean over `dt` seconds.
    ///
    /// `dt == 0` returns the input with an identity Jacobian and zero noise.
    pub fn predict(&self, mean: &DVector<f64>, dt: f64) -> Result<Prediction, NumericalError> {
        let n = self.state_dim();
        if mean.len() != n {
            return Err(NumericalError::DimensionMismatch {
                expected: n,
                actual: mean.len(),
                context: "state mean",
            });
        }
        if !dt.is_finite() {
            return Err(NumericalError::NonFinite {
                context: "time step",
            });
        }
        if dt < 0.0 {
            return Err(NumericalError::NegativeTimeStep { dt });
        }
        if dt == 0.0 {
            return Ok(Prediction {
                mean: mean.clone(),
                jacobian: DMatrix::identity(n, n),
                process_noise: DMatrix::zeros(n, n),
            });
        }

        let predicted = self.transition(mean, dt);
        if predicted.iter().any(|v| !v.is_finite()) {
            return Err(NumericalError::NonFinite {
                context: "predicted mean",
            });
        }

        Ok(Prediction {
            mean: predicted,
            jacobian: self.jacobian(mean, dt),
            process_noise: self.process_noise(mean, dt),
        })
    }

    fn linear_transition_matrix(&self, dt: f64) -> DMatrix<f64> {
        let (order, d) = match self {
            MotionModel::ConstantVelocity { layout, .. } => (2, layout.dims()),
            MotionModel::ConstantAcceleration { layout, .. } => (3, layout.dims()),
            MotionModel::ConstantTurnRate { .. } => return DMatrix::identity(5, 5),
        };
        let mut f = DMatrix::identity(order * d, order * d);
        for i in 0..d {
            f[(i, d + i)] = dt;
            if order == 3 {
                f[(i, 2 * d + i)] = 0.5 * dt * dt;
                f[(d + i, 2 * d + i)] = dt;
            }
        }
        f
    }
}

/// `q · (block ⊗ I_d)` with a row-major `order × order` block
fn kron_identity(block: &[f64], order: usize, d: usize, q: f64) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(order * d, order * d);
    for r in 0..order {
        for c in 0..order {
            for i in 0..d {
                out[(r * d + i, c * d + i)] = q * block[r * order + c];
            }
        }
    }
    out
}

fn ctrv_transition(x: &DVector<f64>, dt: f64) -> DVector<f64> {
    let (px, py, v, yaw, rate) = (x[0], x[1], x[2], x[3], x[4]);
    let mut out = x.clone();
    if rate.abs() > YAW_RATE_EPSILON {
        let yaw_next = yaw + rate * dt;
        out[0] = px + v / rate * (yaw_next.sin() - yaw.sin());
        out[1] = py + v / rate * (yaw.cos() - yaw_next.cos());
        out[3] = wrap_angle(yaw_next);
    } else {
        out[0] = px + v * yaw.cos() * dt;
        out[1] = py + v * yaw.sin() * dt;
        out[3] = wrap_angle(yaw);
    }
    out
}

fn ctrv_jacobian(x: &DVector<f64>, dt: f64) -> DMatrix<f64> {
    let (v, yaw, rate) = (x[2], x[3], x[4]);
    let (s0, c0) = yaw.sin_cos();
    let mut f = DMatrix::identity(5, 5);

    if rate.abs() > YAW_RATE_EPSILON {
        let (s1, c1) = (yaw + rate * dt).sin_cos();
        f[(0, 2)] = (s1 - s0) / rate;
        f[(0, 3)] = v / rate * (c1 - c0);
        f[(0, 4)] = v * dt * c1 / rate - v * (s1 - s0) / (rate * rate);
        f[(1, 2)] = (c0 - c1) / rate;
        f[(1, 3)] = v / rate * (s1 - s0);
        f[(1, 4)] = v * dt * s1 / rate - v * (c0 - c1) / (rate * rate);
    } else {
        f[(0, 2)] = c0 * dt;
        f[(0, 3)] = -v * s0 * dt;
        f[(0, 4)] = -0.5 * v * dt * dt * s0;
        f[(1, 2)] = s0 * dt;
        f[(1, 3)] = v * c0 * dt;
        f[(1, 4)] = 0.5 * v * dt * dt * c0;
    }
    f[(3, 4)] = dt;
    f
}
