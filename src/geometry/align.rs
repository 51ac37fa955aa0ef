//! Detection alignment into the fusion frame
//!
//! Cartesian detections (points and boxes) are transformed into the fusion
//! frame together with their noise (`R Σ Rᵀ`). Range/bearing detections keep
//! their native measurement and carry the fusion → sensor transform in their
//! [`MeasurementModel`]; a fusion-frame position is still derived for track
//! birth. Doppler detections also record the sensor's velocity in the fusion
//! frame so range rates stay relative to the sensor.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use super::frames::{FrameId, FrameTree};
use super::transform::RigidTransform;
use crate::errors::RejectionReason;
use crate::models::{MeasurementModel, MotionModel};
use crate::types::{BoxShape, Detection, DetectionId, Geometry, SensorId};

/// A validated detection expressed relative to the fusion frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedDetection {
    /// Source detection id
    pub id: DetectionId,
    /// Producing sensor
    pub sensor_id: SensorId,
    /// Measurement time
    pub timestamp: f64,
    /// Measurement model relating `z` to a track state
    pub model: MeasurementModel,
    /// Measurement vector: fusion-frame position for Cartesian detections,
    /// native values otherwise
    pub z: DVector<f64>,
    /// Noise covariance of `z`
    pub noise: DMatrix<f64>,
    /// Fusion-frame position
    pub position: Vector3<f64>,
    /// Fusion-frame position covariance
    pub position_covariance: Matrix3<f64>,
    /// Box extent and fusion-frame orientation
    pub shape: Option<BoxShape>,
    /// Object class
    pub class_label: Option<String>,
    /// Detector confidence
    pub confidence: Option<f64>,
    /// Appearance embedding
    pub embedding: Option<Vec<f64>>,
}

impl AlignedDetection {
    /// Measurement and noise as seen by a track with the given motion model
    pub fn measurement(&self, motion: &MotionModel) -> (DVector<f64>, DMatrix<f64>) {
        match self.model {
            MeasurementModel::Position => {
                let d = motion.position_dim();
                (
                    self.z.rows(0, d).into_owned(),
                    self.noise.view((0, 0), (d, d)).into_owned(),
                )
            }
            _ => (self.z.clone(), self.noise.clone()),
        }
    }
}

/// Transform a box center and shape
pub fn transform_box(
    transform: &RigidTransform,
    center: &Vector3<f64>,
    shape: &BoxShape,
) -> (Vector3<f64>, BoxShape) {
    (
        transform.transform_point(center),
        BoxShape {
            size: shape.size,
            orientation: transform.transform_orientation(&shape.orientation),
        },
    )
}

/// Validate a detection and express it relative to `fusion_frame`.
pub fn align_detection(
    detection: &Detection,
    frames: &FrameTree,
    fusion_frame: FrameId,
) -> Result<AlignedDetection, RejectionReason> {
    detection.validate()?;
    let kinematics = frames.kinematics(detection.frame_id, fusion_frame)?;
    let to_fusion = kinematics.transform;

    let mut aligned = AlignedDetection {
        id: detection.id,
        sensor_id: detection.sensor_id,
        timestamp: detection.timestamp,
        model: MeasurementModel::Position,
        z: DVector::zeros(0),
        noise: DMatrix::zeros(0, 0),
        position: Vector3::zeros(),
        position_covariance: Matrix3::zeros(),
        shape: None,
        class_label: detection.class_label.clone(),
        confidence: detection.confidence,
        embedding: detection.embedding.clone(),
    };

    match &detection.geometry {
        Geometry::Point { position } => {
            aligned.position = to_fusion.transform_point(position);
        }
        Geometry::Box { center, size } => {
            let (position, shape) = transform_box(&to_fusion, center, &BoxShape::axis_aligned(*size));
            aligned.position = position;
            aligned.shape = Some(shape);
        }
        Geometry::OrientedBox {
            center,
            size,
            orientation,
        } => {
            let shape = BoxShape {
                size: *size,
                orientation: *orientation,
            };
            let (position, shape) = transform_box(&to_fusion, center, &shape);
            aligned.position = position;
            aligned.shape = Some(shape);
        }
        Geometry::Polar { range, azimuth } => {
            aligned.model = MeasurementModel::Polar {
                to_sensor: to_fusion.inverse(),
            };
            aligned.z = DVector::from_vec(vec![*range, *azimuth]);
        }
        Geometry::PolarDoppler {
            range,
            azimuth,
            range_rate,
        } => {
            aligned.model = MeasurementModel::PolarDoppler {
                to_sensor: to_fusion.inverse(),
                sensor_velocity: kinematics.motion.linear_velocity,
            };
            aligned.z = DVector::from_vec(vec![*range, *azimuth, *range_rate]);
        }
        Geometry::Spherical {
            range,
            azimuth,
            elevation,
        } => {
            aligned.model = MeasurementModel::Spherical {
                to_sensor: to_fusion.inverse(),
            };
            aligned.z = DVector::from_vec(vec![*range, *azimuth, *elevation]);
        }
    }

    if aligned.model.is_linear() {
        let noise = Matrix3::from_fn(|i, j| detection.noise[(i, j)]);
        aligned.position_covariance = to_fusion.transform_covariance(&noise);
        aligned.z = DVector::from_column_slice(aligned.position.as_slice());
        aligned.noise = DMatrix::from_column_slice(3, 3, aligned.position_covariance.as_slice());
    } else {
        aligned.noise = detection.noise.clone();
        let (position, covariance) = aligned.model.inverse(&aligned.z, &aligned.noise);
        aligned.position = position;
        aligned.position_covariance = covariance;
    }

    Ok(aligned)
}
