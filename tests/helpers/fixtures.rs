//! Frame rigs, engines and seeded target scenarios
//!
//! Scenarios are deterministic: every random draw goes through a seeded
//! [`StdRng`].

use std::f64::consts::FRAC_PI_2;

use nalgebra::{DMatrix, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;

use sensor_fusion_tracker::{
    Detection, DetectionId, FrameId, FrameTree, FusionEngine, Geometry, ObservationBatch,
    RigidTransform, SensorId, TrackerConfig,
};

pub const LIDAR: SensorId = SensorId(0);
pub const RADAR: SensorId = SensorId(1);

/// Seeded RNG
pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

//=============================================================================
// Frames and engines
//=============================================================================

/// World, a vehicle and two sensors.
///
/// - `ego`: 10 m along world x, rotated 90° (x-axis pointing along world y)
/// - `lidar`: 1 m ahead of the ego origin
/// - `radar`: at the world origin, aligned with world
#[derive(Debug, Clone)]
pub struct Rig {
    pub frames: FrameTree,
    pub world: FrameId,
    pub ego: FrameId,
    pub lidar: FrameId,
    pub radar: FrameId,
}

pub fn sensor_rig() -> Rig {
    let (mut frames, world) = FrameTree::with_root("world");
    let ego = frames
        .add_frame("ego", world, RigidTransform::from_yaw(FRAC_PI_2, Vector3::new(10.0, 0.0, 0.0)), 0.0)
        .unwrap();
    let lidar = frames
        .add_frame("lidar", ego, RigidTransform::from_translation(Vector3::new(1.0, 0.0, 0.0)), 0.0)
        .unwrap();
    let radar = frames.add_frame("radar", world, RigidTransform::identity(), 0.0).unwrap();
    Rig {
        frames,
        world,
        ego,
        lidar,
        radar,
    }
}

/// Engine tracking in a bare world frame
pub fn world_engine(config: TrackerConfig) -> (FusionEngine, FrameId) {
    let (frames, world) = FrameTree::with_root("world");
    let engine = FusionEngine::new(config, frames, world).unwrap();
    (engine, world)
}

//=============================================================================
// Targets
//=============================================================================

/// Constant-velocity ground truth
#[derive(Debug, Clone, Copy)]
pub struct Target {
    pub start: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

impl Target {
    pub fn new(x: f64, y: f64, vx: f64, vy: f64) -> Self {
        Self {
            start: Vector3::new(x, y, 0.0),
            velocity: Vector3::new(vx, vy, 0.0),
        }
    }

    pub fn at(&self, t: f64) -> Vector3<f64> {
        self.start + self.velocity * t
    }
}

/// Two targets on opposite lanes 2 m apart, passing each other at t = 2 s
pub fn passing_targets() -> [Target; 2] {
    [Target::new(-20.0, 1.0, 10.0, 0.0), Target::new(20.0, -1.0, -10.0, 0.0)]
}

/// Two targets on diagonal courses through the origin, crossing at t = 2 s
pub fn crossing_targets() -> [Target; 2] {
    [Target::new(-20.0, -10.0, 10.0, 5.0), Target::new(-20.0, 10.0, 10.0, -5.0)]
}

//=============================================================================
// Detections
//=============================================================================

/// Hands out unique detection ids
#[derive(Debug, Default)]
pub struct Ids(u64);

impl Ids {
    pub fn next(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

/// Truth plus isotropic Gaussian noise
pub fn noisy(rng: &mut StdRng, truth: &Vector3<f64>, std: f64) -> Vector3<f64> {
    let normal = Normal::new(0.0, std).unwrap();
    Vector3::new(truth.x + rng.sample(normal), truth.y + rng.sample(normal), truth.z)
}

/// Batch of point detections at the given positions
pub fn point_batch(
    ids: &mut Ids,
    sensor: SensorId,
    t: f64,
    frame: FrameId,
    positions: &[Vector3<f64>],
    std: f64,
) -> ObservationBatch {
    let detections = positions
        .iter()
        .map(|p| Detection::point(ids.next(), sensor, t, frame, *p, std))
        .collect();
    ObservationBatch::new(sensor, t, frame, detections)
}

/// Range/azimuth detection of a sensor-frame position
pub fn polar_detection(
    id: u64,
    sensor: SensorId,
    t: f64,
    frame: FrameId,
    position: &Vector3<f64>,
    range_std: f64,
    azimuth_std: f64,
) -> Detection {
    Detection::new(
        DetectionId(id),
        sensor,
        t,
        frame,
        Geometry::Polar {
            range: position.x.hypot(position.y),
            azimuth: position.y.atan2(position.x),
        },
        DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![
            range_std * range_std,
            azimuth_std * azimuth_std,
        ])),
    )
}

/// Noisy range/azimuth detection of a sensor-frame position
pub fn noisy_polar_detection(
    rng: &mut StdRng,
    id: u64,
    sensor: SensorId,
    t: f64,
    frame: FrameId,
    position: &Vector3<f64>,
    range_std: f64,
    azimuth_std: f64,
) -> Detection {
    let mut detection = polar_detection(id, sensor, t, frame, position, range_std, azimuth_std);
    if let Geometry::Polar { range, azimuth } = &mut detection.geometry {
        *range += rng.sample(Normal::new(0.0, range_std).unwrap());
        *azimuth += rng.sample(Normal::new(0.0, azimuth_std).unwrap());
    }
    detection
}

/// Noisy range/azimuth/range-rate detection of a target seen from a static sensor
pub fn noisy_doppler_detection(
    rng: &mut StdRng,
    id: u64,
    sensor: SensorId,
    t: f64,
    frame: FrameId,
    target: &Target,
    stds: [f64; 3],
) -> Detection {
    let p = target.at(t);
    let range = p.x.hypot(p.y);
    let range_rate = (p.x * target.velocity.x + p.y * target.velocity.y) / range;
    let [range_std, azimuth_std, rate_std] = stds;
    Detection::new(
        DetectionId(id),
        sensor,
        t,
        frame,
        Geometry::PolarDoppler {
            range: range + rng.sample(Normal::new(0.0, range_std).unwrap()),
            azimuth: p.y.atan2(p.x) + rng.sample(Normal::new(0.0, azimuth_std).unwrap()),
            range_rate: range_rate + rng.sample(Normal::new(0.0, rate_std).unwrap()),
        },
        DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![
            range_std * range_std,
            azimuth_std * azimuth_std,
            rate_std * rate_std,
        ])),
    )
}
