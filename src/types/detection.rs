//! Sensor detections and observation batches
//!
//! Detections arrive already decoded. Each carries its geometric measurement
//! in the native frame of the sensor together with the measurement-noise
//! covariance in the measurement's own space:
//!
//! | Geometry | Measurement | Noise |
//! |---|---|---|
//! | `Point` | position `(x, y, z)` | 3×3 |
//! | `Box` / `OrientedBox` | box center `(x, y, z)` | 3×3 |
//! | `Polar` | `(range, azimuth)` | 2×2 |
//! | `Spherical` | `(range, azimuth, elevation)` | 3×3 |

use std::fmt;

use nalgebra::{DMatrix, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::errors::DetectionError;
use crate::geometry::FrameId;

/// Sensor identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorId(pub u32);

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Detection identifier, unique per engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DetectionId(pub u64);

impl fmt::Display for DetectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Extent and orientation of a box-shaped object
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxShape {
    /// Length, width, height along the box axes
    pub size: Vector3<f64>,
    /// Box axes relative to the frame the shape is expressed in
    pub orientation: UnitQuaternion<f64>,
}

impl BoxShape {
    /// Axis-aligned box
    pub fn axis_aligned(size: Vector3<f64>) -> Self {
        Self {
            size,
            orientation: UnitQuaternion::identity(),
        }
    }

    /// Heading (yaw) of the box x-axis
    pub fn yaw(&self) -> f64 {
        self.orientation.euler_angles().2
    }
}

/// Geometric measurement of a detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    /// Point position
    Point {
        /// Position in the sensor frame
        position: Vector3<f64>,
    },
    /// Box aligned with the sensor axes
    Box {
        /// Box center in the sensor frame
        center: Vector3<f64>,
        /// Length, width, height
        size: Vector3<f64>,
    },
    /// Box with its own orientation
    OrientedBox {
        /// Box center in the sensor frame
        center: Vector3<f64>,
        /// Length, width, height
        size: Vector3<f64>,
        /// Box axes relative to the sensor frame
        orientation: UnitQuaternion<f64>,
    },
    /// Planar range and azimuth
    Polar {
        /// Range in the sensor xy-plane (m)
        range: f64,
        /// Azimuth from the sensor x-axis (rad)
        azimuth: f64,
    },
    /// Planar range, azimuth and range rate of a Doppler radar
    PolarDoppler {
        /// Range in the sensor xy-plane (m)
        range: f64,
        /// Azimuth from the sensor x-axis (rad)
        azimuth: f64,
        /// Radial velocity relative to the sensor, positive receding (m/s)
        range_rate: f64,
    },
    /// Range, azimuth and elevation
    Spherical {
        /// Slant range (m)
        range: f64,
        /// Azimuth from the sensor x-axis (rad)
        azimuth: f64,
        /// Elevation above the sensor xy-plane (rad)
        elevation: f64,
    },
}

impl Geometry {
    /// Dimension of the native measurement vector
    pub fn native_dim(&self) -> usize {
        match self {
            Geometry::Polar { .. } => 2,
            _ => 3,
        }
    }

    /// Box shape in the sensor frame, if the geometry has one
    pub fn shape(&self) -> Option<BoxShape> {
        match *self {
            Geometry::Box { size, .. } => Some(BoxShape::axis_aligned(size)),
            Geometry::OrientedBox {
                size, orientation, ..
            } => Some(BoxShape { size, orientation }),
            _ => None,
        }
    }

    /// True for range/bearing style measurements
    pub fn is_angular(&self) -> bool {
        matches!(
            self,
            Geometry::Polar { .. } | Geometry::PolarDoppler { .. } | Geometry::Spherical { .. }
        )
    }

    fn is_finite(&self) -> bool {
        match self {
            Geometry::Point { position } => position.iter().all(|v| v.is_finite()),
            Geometry::Box { center, size } => center.iter().chain(size.iter()).all(|v| v.is_finite()),
            Geometry::OrientedBox {
                center,
                size,
                orientation,
            } => center
                .iter()
                .chain(size.iter())
                .chain(orientation.coords.iter())
                .all(|v| v.is_finite()),
            Geometry::Polar { range, azimuth } => range.is_finite() && azimuth.is_finite(),
            Geometry::PolarDoppler {
                range,
                azimuth,
                range_rate,
            } => range.is_finite() && azimuth.is_finite() && range_rate.is_finite(),
            Geometry::Spherical {
                range,
                azimuth,
                elevation,
            } => range.is_finite() && azimuth.is_finite() && elevation.is_finite(),
        }
    }
}

/// A single detection from one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Unique detection id
    pub id: DetectionId,
    /// Producing sensor
    pub sensor_id: SensorId,
    /// Measurement time (s)
    pub timestamp: f64,
    /// Frame the geometry is expressed in
    pub frame_id: FrameId,
    /// Geometric measurement
    pub geometry: Geometry,
    /// Noise covariance in the native measurement space
    pub noise: DMatrix<f64>,
    /// Optional object class
    pub class_label: Option<String>,
    /// Optional detector confidence in `[0, 1]`
    pub confidence: Option<f64>,
    /// Optional appearance embedding
    pub embedding: Option<Vec<f64>>,
}

impl Detection {
    /// Create a detection without class, confidence or embedding
    pub fn new(
        id: DetectionId,
        sensor_id: SensorId,
        timestamp: f64,
        frame_id: FrameId,
        geometry: Geometry,
        noise: DMatrix<f64>,
    ) -> Self {
        Self {
            id,
            sensor_id,
            timestamp,
            frame_id,
            geometry,
            noise,
            class_label: None,
            confidence: None,
            embedding: None,
        }
    }

    /// Point detection with isotropic position noise `std`
    pub fn point(
        id: u64,
        sensor_id: SensorId,
        timestamp: f64,
        frame_id: FrameId,
        position: Vector3<f64>,
        std: f64,
    ) -> Self {
        Self::new(
            DetectionId(id),
            sensor_id,
            timestamp,
            frame_id,
            Geometry::Point { position },
            DMatrix::identity(3, 3) * (std * std),
        )
    }

    /// Attach a class label
    pub fn with_class(mut self, label: impl Into<String>) -> Self {
        self.class_label = Some(label.into());
        self
    }

    /// Attach a detector confidence
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Attach an appearance embedding
    pub fn with_embedding(mut self, embedding: Vec<f64>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Check shapes and finiteness of the payload.
    pub fn validate(&self) -> Result<(), DetectionError> {
        let id = self.id;
        if !self.timestamp.is_finite() {
            return Err(DetectionError::NonFinite {
                id,
                context: "timestamp",
            });
        }
        if !self.geometry.is_finite() {
            return Err(DetectionError::NonFinite {
                id,
                context: "geometry",
            });
        }

        let expected = self.geometry.native_dim();
        if self.noise.nrows() != expected || self.noise.ncols() != expected {
            return Err(DetectionError::NoiseShape {
                id,
                expected,
                rows: self.noise.nrows(),
                cols: self.noise.ncols(),
            });
        }
        if self.noise.iter().any(|v| !v.is_finite()) {
            return Err(DetectionError::NonFinite {
                id,
                context: "noise covariance",
            });
        }
        let symmetric = 0.5 * (&self.noise + self.noise.transpose());
        if symmetric.cholesky().is_none() {
            return Err(DetectionError::NoiseNotPositiveDefinite { id });
        }

        match self.geometry {
            Geometry::Polar { range, .. } | Geometry::PolarDoppler { range, .. } | Geometry::Spherical { range, .. }
                if range <= 0.0 =>
            {
                return Err(DetectionError::Unsupported {
                    id,
                    reason: format!("range must be positive, got {range}"),
                });
            }
            _ => {}
        }

        if let Some(embedding) = &self.embedding {
            if embedding.iter().any(|v| !v.is_finite()) {
                return Err(DetectionError::NonFinite {
                    id,
                    context: "embedding",
                });
            }
        }
        if let Some(confidence) = self.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(DetectionError::Unsupported {
                    id,
                    reason: format!("confidence {confidence} outside [0, 1]"),
                });
            }
        }
        Ok(())
    }
}

/// All detections of one sensor at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationBatch {
    /// Producing sensor
    pub sensor_id: SensorId,
    /// Batch time (s)
    pub timestamp: f64,
    /// Sensor frame
    pub frame_id: FrameId,
    /// Detections in this batch
    pub detections: Vec<Detection>,
}

impl ObservationBatch {
    /// Create a batch
    pub fn new(
        sensor_id: SensorId,
        timestamp: f64,
        frame_id: FrameId,
        detections: Vec<Detection>,
    ) -> Self {
        Self {
            sensor_id,
            timestamp,
            frame_id,
            detections,
        }
    }

    /// Empty batch (a scan with no detections still advances time)
    pub fn empty(sensor_id: SensorId, timestamp: f64, frame_id: FrameId) -> Self {
        Self::new(sensor_id, timestamp, frame_id, Vec::new())
    }

    /// Number of detections
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// True if the batch carries no detection
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
