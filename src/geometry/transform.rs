//! Rigid transforms and frame kinematics
//!
//! A [`RigidTransform`] maps coordinates expressed in a source frame into a
//! target frame: `p_target = R · p_source + t`. Rotation is a unit quaternion;
//! every composition re-normalizes it so the unit-norm invariant survives
//! long transform chains.
//!
//! [`FrameKinematics`] adds the motion of the source frame relative to the
//! target (linear velocity of its origin and angular velocity, both expressed
//! in the target frame). It is needed to transform velocities between frames
//! that are non-inertial relative to each other.

use nalgebra::{Matrix3, Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::common::constants::FRAME_TOLERANCE;

/// Rotation followed by translation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    /// Rotation from source axes to target axes
    pub rotation: UnitQuaternion<f64>,
    /// Source origin expressed in the target frame
    pub translation: Vector3<f64>,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    /// Create a transform, normalizing the rotation
    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation: renormalize(rotation),
            translation,
        }
    }

    /// Identity transform
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Pure translation
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self::new(UnitQuaternion::identity(), translation)
    }

    /// Rotation about +z (yaw) followed by a translation
    pub fn from_yaw(yaw: f64, translation: Vector3<f64>) -> Self {
        Self::new(
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw),
            translation,
        )
    }

    /// Build from raw quaternion components `(w, x, y, z)`; the quaternion
    /// is normalized. Returns `None` for a zero-norm quaternion.
    pub fn from_parts(w: f64, x: f64, y: f64, z: f64, translation: Vector3<f64>) -> Option<Self> {
        let q = Quaternion::new(w, x, y, z);
        if q.norm() <= f64::EPSILON {
            return None;
        }
        Some(Self::new(UnitQuaternion::from_quaternion(q), translation))
    }

    /// Rotation matrix `R`
    #[inline]
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// `self` applied after `first`: maps `first`'s source into `self`'s target.
    ///
    /// If `first: A → B` and `self: B → C`, the result is `A → C`.
    pub fn compose(&self, first: &RigidTransform) -> RigidTransform {
        RigidTransform {
            rotation: renormalize(self.rotation * first.rotation),
            translation: self.rotation * first.translation + self.translation,
        }
    }

    /// Inverse transform: target → source
    pub fn inverse(&self) -> RigidTransform {
        let inv = self.rotation.inverse();
        RigidTransform {
            rotation: renormalize(inv),
            translation: -(inv * self.translation),
        }
    }

    /// Transform a point
    #[inline]
    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }

    /// Rotate a free vector (direction, displacement, velocity of an inertial pair)
    #[inline]
    pub fn transform_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * vector
    }

    /// Rotate a 3×3 covariance: `R Σ Rᵀ`
    pub fn transform_covariance(&self, covariance: &Matrix3<f64>) -> Matrix3<f64> {
        let r = self.rotation_matrix();
        r * covariance * r.transpose()
    }

    /// Rotate an orientation expressed in the source frame
    #[inline]
    pub fn transform_orientation(&self, orientation: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
        renormalize(self.rotation * orientation)
    }

    /// Approximate equality within `tolerance` on translation and rotation angle
    pub fn approx_eq(&self, other: &RigidTransform, tolerance: f64) -> bool {
        (self.translation - other.translation).norm() <= tolerance
            && self.rotation.angle_to(&other.rotation) <= tolerance
    }

    /// True if the transform is the identity within [`FRAME_TOLERANCE`]
    pub fn is_identity(&self) -> bool {
        self.approx_eq(&RigidTransform::identity(), FRAME_TOLERANCE)
    }

    /// True if every component is finite
    pub fn is_finite(&self) -> bool {
        self.translation.iter().all(|v| v.is_finite())
            && self.rotation.coords.iter().all(|v| v.is_finite())
    }
}

/// Motion of one frame relative to another.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameMotion {
    /// Velocity of the frame origin, expressed in the reference frame
    pub linear_velocity: Vector3<f64>,
    /// Angular velocity of the frame, expressed in the reference frame
    pub angular_velocity: Vector3<f64>,
}

impl FrameMotion {
    /// Static (inertial) relation
    pub fn stationary() -> Self {
        Self::default()
    }

    /// Motion from linear and angular velocity
    pub fn new(linear_velocity: Vector3<f64>, angular_velocity: Vector3<f64>) -> Self {
        Self {
            linear_velocity,
            angular_velocity,
        }
    }

    /// True if both velocities are zero
    pub fn is_stationary(&self) -> bool {
        self.linear_velocity.norm() <= FRAME_TOLERANCE
            && self.angular_velocity.norm() <= FRAME_TOLERANCE
    }
}

/// Pose and motion of a source frame relative to a target frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameKinematics {
    /// Source → target transform
    pub transform: RigidTransform,
    /// Motion of the source frame, expressed in the target frame
    pub motion: FrameMotion,
}

impl FrameKinematics {
    /// Identity kinematics
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create kinematics from a transform and a motion
    pub fn new(transform: RigidTransform, motion: FrameMotion) -> Self {
        Self { transform, motion }
    }

    /// `self` applied after `first` (`first: A → B`, `self: B → C`, result `A → C`).
    ///
    /// `ω_AC = ω_BC + R_BC ω_AB`,
    /// `v_AC = v_BC + ω_BC × (R_BC t_AB) + R_BC v_AB`.
    pub fn compose(&self, first: &FrameKinematics) -> FrameKinematics {
        let transform = self.transform.compose(&first.transform);
        let offset = self.transform.transform_vector(&first.transform.translation);
        let angular_velocity =
            self.motion.angular_velocity + self.transform.transform_vector(&first.motion.angular_velocity);
        let linear_velocity = self.motion.linear_velocity
            + self.motion.angular_velocity.cross(&offset)
            + self.transform.transform_vector(&first.motion.linear_velocity);

        FrameKinematics {
            transform,
            motion: FrameMotion::new(linear_velocity, angular_velocity),
        }
    }

    /// Inverse kinematics: motion of the target frame seen from the source.
    ///
    /// With `T = (R, t)`: `ω' = -Rᵀ ω`, `v' = Rᵀ (ω × t - v)`.
    pub fn inverse(&self) -> FrameKinematics {
        let inv = self.transform.inverse();
        let w = self.motion.angular_velocity;
        let t = self.transform.translation;
        FrameKinematics {
            transform: inv,
            motion: FrameMotion::new(
                inv.transform_vector(&(w.cross(&t) - self.motion.linear_velocity)),
                -inv.transform_vector(&w),
            ),
        }
    }

    /// Transform a point with its velocity from source to target.
    ///
    /// `u_target = R u_source + ω × (R p_source) + v`.
    pub fn transform_velocity(
        &self,
        point: &Vector3<f64>,
        velocity: &Vector3<f64>,
    ) -> (Vector3<f64>, Vector3<f64>) {
        let lever = self.transform.transform_vector(point);
        let position = lever + self.transform.translation;
        let velocity = self.transform.transform_vector(velocity)
            + self.motion.angular_velocity.cross(&lever)
            + self.motion.linear_velocity;
        (position, velocity)
    }
}

fn renormalize(q: UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::new_normalize(q.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn sample(yaw: f64, x: f64, y: f64, z: f64) -> RigidTransform {
        let q = UnitQuaternion::from_euler_angles(0.1, -0.2, yaw);
        RigidTransform::new(q, Vector3::new(x, y, z))
    }

    #[test]
    fn test_yaw_transform_point() {
        let t = RigidTransform::from_yaw(FRAC_PI_2, Vector3::new(1.0, 0.0, 0.0));
        let p = t.transform_point(&Vector3::new(1.0, 0.0, 0.0));
        assert!((p - Vector3::new(1.0, 1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_compose_associative() {
        let a = sample(0.3, 1.0, 2.0, 3.0);
        let b = sample(-1.2, -4.0, 0.5, 0.0);
        let c = sample(2.5, 0.0, 0.0, 9.0);

        let left = c.compose(&b).compose(&a);
        let right = c.compose(&b.compose(&a));
        assert!(left.approx_eq(&right, 1e-12));
    }

    #[test]
    fn test_inverse_is_identity() {
        let t = sample(0.7, 3.0, -1.0, 2.0);
        assert!(t.compose(&t.inverse()).is_identity());
        assert!(t.inverse().compose(&t).is_identity());
    }

    #[test]
    fn test_compose_keeps_unit_norm() {
        let step = sample(0.01, 0.1, 0.0, 0.0);
        let mut acc = RigidTransform::identity();
        for _ in 0..10_000 {
            acc = step.compose(&acc);
        }
        assert!((acc.rotation.into_inner().norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_transform_covariance_preserves_trace() {
        let t = sample(1.0, 0.0, 0.0, 0.0);
        let cov = Matrix3::from_diagonal(&Vector3::new(1.0, 4.0, 9.0));
        let rotated = t.transform_covariance(&cov);
        assert!((rotated.trace() - 14.0).abs() < 1e-12);
        assert!((rotated - rotated.transpose()).norm() < 1e-12);
    }

    #[test]
    fn test_from_parts_rejects_zero_quaternion() {
        assert!(RigidTransform::from_parts(0.0, 0.0, 0.0, 0.0, Vector3::zeros()).is_none());
        let t = RigidTransform::from_parts(2.0, 0.0, 0.0, 0.0, Vector3::zeros()).unwrap();
        assert!(t.is_identity());
    }

    #[test]
    fn test_rotating_frame_velocity() {
        // Source frame spins at 1 rad/s about z; a point fixed at (1, 0, 0)
        // in the source moves with velocity (0, 1, 0) in the target.
        let k = FrameKinematics::new(
            RigidTransform::identity(),
            FrameMotion::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 1.0)),
        );
        let (p, v) = k.transform_velocity(&Vector3::new(1.0, 0.0, 0.0), &Vector3::zeros());
        assert!((p - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
        assert!((v - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_kinematics_inverse_round_trip() {
        let k = FrameKinematics::new(
            sample(0.4, 2.0, -1.0, 0.5),
            FrameMotion::new(Vector3::new(1.0, 2.0, 0.0), Vector3::new(0.0, 0.1, 0.3)),
        );
        let id = k.compose(&k.inverse());
        assert!(id.transform.is_identity());
        assert!(id.motion.is_stationary());
    }

    #[test]
    fn test_kinematics_velocity_round_trip() {
        let k = FrameKinematics::new(
            sample(-0.8, 1.0, 1.0, 0.0),
            FrameMotion::new(Vector3::new(-3.0, 0.5, 0.0), Vector3::new(0.0, 0.0, 0.2)),
        );
        let p = Vector3::new(4.0, -2.0, 1.0);
        let u = Vector3::new(0.3, 0.7, -0.1);
        let (p_t, u_t) = k.transform_velocity(&p, &u);
        let (p_back, u_back) = k.inverse().transform_velocity(&p_t, &u_t);
        assert!((p_back - p).norm() < 1e-10);
        assert!((u_back - u).norm() < 1e-10);
    }
}
