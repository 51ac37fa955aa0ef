//! End-to-end fusion cycles

mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::Vector3;

use helpers::assertions::assert_vec3_close;
use helpers::fixtures::{
    crossing_targets, noisy, noisy_polar_detection, passing_targets, point_batch, rng, sensor_rig, world_engine, Ids, LIDAR, RADAR,
};
use sensor_fusion_tracker::association::{Association, CostMatrix};
use sensor_fusion_tracker::{
    AssociationError, Associator, CompositeReporter, CostFunction, DebugReporter, Detection, FusionEngine,
    FusionError, GlobalNearestNeighbor, LateDataPolicy, LoggingReporter, ObservationBatch, SensorId, TrackId,
    TrackStatus, TrackerConfig,
};

/// Delegates to GNN but fails the `n`-th call
#[derive(Debug)]
struct FailOn {
    call: usize,
    calls: AtomicUsize,
}

impl FailOn {
    fn new(call: usize) -> Self {
        Self {
            call,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Associator for FailOn {
    fn name(&self) -> &'static str {
        "fail-on"
    }

    fn associate(&self, costs: &CostMatrix, gate: f64) -> Result<Association, AssociationError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.call {
            return Err(AssociationError::Infeasible);
        }
        GlobalNearestNeighbor.associate(costs, gate)
    }
}

fn wide_gate() -> TrackerConfig {
    TrackerConfig::builder().gate_threshold(25.0).build().unwrap()
}

#[test]
fn test_passing_targets_keep_their_ids() {
    helpers::init_logging();
    let (mut engine, world) = world_engine(wide_gate());
    let targets = passing_targets();
    let mut rng = rng(41);
    let mut ids = Ids::default();

    for step in 0..=40 {
        let t = step as f64 * 0.1;
        let positions: Vec<Vector3<f64>> = targets.iter().map(|g| noisy(&mut rng, &g.at(t), 0.1)).collect();
        let output = engine.process(point_batch(&mut ids, LIDAR, t, world, &positions, 0.1)).unwrap();
        assert_eq!(output.tracks.len(), 2, "t={t}");
    }

    let first = engine.track(TrackId(1)).unwrap();
    let second = engine.track(TrackId(2)).unwrap();
    assert_eq!(first.status, TrackStatus::Confirmed);
    assert_eq!(second.status, TrackStatus::Confirmed);
    assert_vec3_close(&first.state.position(), &targets[0].at(4.0), 0.5, "first target");
    assert_vec3_close(&second.state.position(), &targets[1].at(4.0), 0.5, "second target");
    assert_eq!(first.hits, 41);
    assert_eq!(engine.stats().tracks_born, 2);
}

#[test]
fn test_crossing_targets_keep_their_ids() {
    let (mut engine, world) = world_engine(TrackerConfig::default());
    let targets = crossing_targets();
    let mut rng = rng(47);
    let mut ids = Ids::default();

    for step in 0..=40 {
        let t = step as f64 * 0.1;
        let mut positions: Vec<Vector3<f64>> = targets.iter().map(|g| noisy(&mut rng, &g.at(t), 0.05)).collect();
        // Detection order flips around the crossing
        if (15..=25).contains(&step) {
            positions.reverse();
        }
        let output = engine.process(point_batch(&mut ids, LIDAR, t, world, &positions, 0.1)).unwrap();

        let first = output.track(TrackId(1)).expect("first track alive");
        let second = output.track(TrackId(2)).expect("second track alive");
        if step <= 18 {
            assert!(first.position.y < second.position.y, "t={t}: tracks swapped before crossing");
        }
        if step >= 22 {
            assert!(first.position.y > second.position.y, "t={t}: tracks swapped after crossing");
        }
    }

    assert_eq!(engine.stats().tracks_born, 2);
    let first = engine.track(TrackId(1)).unwrap();
    let second = engine.track(TrackId(2)).unwrap();
    assert_vec3_close(&first.state.position(), &targets[0].at(4.0), 0.5, "first target");
    assert_vec3_close(&second.state.position(), &targets[1].at(4.0), 0.5, "second target");
    assert!(first.status.is_confirmed() && second.status.is_confirmed());
}

#[test]
fn test_lidar_and_radar_fuse_into_one_track() {
    let rig = sensor_rig();
    let truth = Vector3::new(30.0, 10.0, 0.0);
    let in_lidar = rig.frames.transform(rig.world, rig.lidar).unwrap().transform_point(&truth);
    let in_radar = rig.frames.transform(rig.world, rig.radar).unwrap().transform_point(&truth);
    let mut engine = FusionEngine::new(wide_gate(), rig.frames.clone(), rig.world).unwrap();

    let mut rng = rng(43);
    let mut ids = Ids::default();
    for step in 0..20 {
        let t = step as f64 * 0.05;
        let batch = if step % 2 == 0 {
            let z = noisy(&mut rng, &in_lidar, 0.1);
            point_batch(&mut ids, LIDAR, t, rig.lidar, &[z], 0.1)
        } else {
            let det = noisy_polar_detection(&mut rng, ids.next(), RADAR, t, rig.radar, &in_radar, 0.2, 0.005);
            ObservationBatch::new(RADAR, t, rig.radar, vec![det])
        };
        let output = engine.process(batch).unwrap();
        assert_eq!(output.tracks.len(), 1);
        assert_eq!(output.tracks[0].track_id, TrackId(1));
    }

    let track = &engine.tracks()[0];
    assert_eq!(track.hits, 20);
    assert!(track.status.is_confirmed());
    assert_vec3_close(&track.state.position(), &truth, 0.5, "fused position");
}

#[test]
fn test_out_of_order_batches() {
    let (mut engine, world) = world_engine(TrackerConfig::default());
    let mut ids = Ids::default();
    let p = [Vector3::new(1.0, 1.0, 0.0)];
    engine.process(point_batch(&mut ids, LIDAR, 1.0, world, &p, 0.2)).unwrap();

    // Older than anything processed, from another sensor
    let err = engine.process(point_batch(&mut ids, RADAR, 0.9, world, &p, 0.2)).unwrap_err();
    match err {
        FusionError::TemporalOrder(e) => {
            assert_eq!(e.sensor, RADAR);
            assert_eq!(e.last_timestamp, 1.0);
        }
        other => panic!("unexpected error {other}"),
    }

    // Same instant from a second sensor is fine
    let output = engine.process(point_batch(&mut ids, RADAR, 1.0, world, &p, 0.2)).unwrap();
    assert_eq!(output.tracks[0].hits, 2);
    assert_eq!(engine.stats().batches_rejected, 1);
    assert_eq!(engine.stats().cycles, 2);
}

#[test]
fn test_aborted_cycle_is_atomic() {
    let (engine, world) = world_engine(TrackerConfig::default());
    let mut engine = engine.with_associator(Box::new(FailOn::new(2)));
    let mut ids = Ids::default();
    let positions = [Vector3::new(0.0, 0.0, 0.0), Vector3::new(50.0, 0.0, 0.0)];

    engine.process(point_batch(&mut ids, LIDAR, 0.0, world, &positions, 0.2)).unwrap();
    let before = engine.snapshot();
    let stats = engine.stats();

    let batch = point_batch(&mut ids, LIDAR, 0.1, world, &[positions[0], Vector3::new(-50.0, 0.0, 0.0)], 0.2);
    let err = engine.process(batch.clone()).unwrap_err();
    assert!(matches!(err, FusionError::Association(AssociationError::Infeasible)));
    assert_eq!(engine.snapshot(), before);
    assert_eq!(engine.stats().cycles, stats.cycles);
    assert_eq!(engine.stats().cycles_aborted, 1);
    assert_eq!(engine.last_timestamp(), Some(0.0));

    // Retrying succeeds as if the aborted attempt never happened
    let output = engine.process(batch).unwrap();
    assert_eq!(output.report.born, vec![TrackId(3)]);
    assert_eq!(output.deleted.len(), 1);
}

#[test]
fn test_late_batches_are_reordered_in_buffer() {
    let config = TrackerConfig::builder()
        .late_data(LateDataPolicy::Buffer { window: 0.15 })
        .build()
        .unwrap();
    let (mut engine, world) = world_engine(config);
    let mut ids = Ids::default();
    let p = [Vector3::new(3.0, 3.0, 0.0)];

    let mut released = Vec::new();
    for (sensor, t) in [(LIDAR, 0.0), (LIDAR, 0.2), (RADAR, 0.1), (LIDAR, 0.4), (RADAR, 0.3)] {
        released.extend(engine.submit(point_batch(&mut ids, sensor, t, world, &p, 0.2)).unwrap());
    }
    released.extend(engine.flush());

    let times: Vec<f64> = released.into_iter().map(|o| o.unwrap().timestamp).collect();
    assert_eq!(times, vec![0.0, 0.1, 0.2, 0.3, 0.4]);
    assert_eq!(engine.tracks()[0].hits, 5);
    assert_eq!(engine.stats().batches_rejected, 0);

    // Older than processed data is still rejected
    assert!(matches!(
        engine.submit(point_batch(&mut ids, RADAR, 0.35, world, &p, 0.2)),
        Err(FusionError::TemporalOrder(_))
    ));
}

#[test]
fn test_class_gating_separates_objects() {
    let config = TrackerConfig::builder().class_gating(true).build().unwrap();
    let (mut engine, world) = world_engine(config);
    let car = Detection::point(1, LIDAR, 0.0, world, Vector3::new(5.0, 0.0, 0.0), 0.2).with_class("car");
    engine.process(ObservationBatch::new(LIDAR, 0.0, world, vec![car])).unwrap();

    let walker = Detection::point(2, LIDAR, 0.1, world, Vector3::new(5.1, 0.0, 0.0), 0.2).with_class("pedestrian");
    let output = engine.process(ObservationBatch::new(LIDAR, 0.1, world, vec![walker])).unwrap();
    assert_eq!(output.report.born, vec![TrackId(2)]);
    assert_eq!(output.track(TrackId(2)).unwrap().class_label.as_deref(), Some("pedestrian"));
}

fn appearance_winner(cost_function: CostFunction) -> TrackId {
    let config = TrackerConfig::builder()
        .confirm_hits(1)
        .cost_function(cost_function)
        .build()
        .unwrap();
    let (mut engine, world) = world_engine(config);
    let a = Detection::point(1, LIDAR, 0.0, world, Vector3::new(0.0, 0.0, 0.0), 0.2).with_embedding(vec![1.0, 0.0]);
    let b = Detection::point(2, LIDAR, 0.0, world, Vector3::new(1.0, 0.0, 0.0), 0.2).with_embedding(vec![0.0, 1.0]);
    engine.process(ObservationBatch::new(LIDAR, 0.0, world, vec![a, b])).unwrap();

    let query = Detection::point(3, LIDAR, 0.1, world, Vector3::new(0.45, 0.0, 0.0), 0.2).with_embedding(vec![0.0, 1.0]);
    let output = engine.process(ObservationBatch::new(LIDAR, 0.1, world, vec![query])).unwrap();
    assert_eq!(output.report.matches.len(), 1);
    output.report.matches[0].track_id
}

#[test]
fn test_appearance_breaks_kinematic_ambiguity() {
    assert_eq!(appearance_winner(CostFunction::Kinematic), TrackId(1));
    assert_eq!(appearance_winner(CostFunction::KinematicAppearance { weight: 5.0 }), TrackId(2));
}

#[test]
fn test_reporters_observe_every_cycle() {
    let (engine, world) = world_engine(TrackerConfig::default());
    let mut engine = engine.with_reporter(CompositeReporter::new(DebugReporter::new(), LoggingReporter::new()));
    let mut ids = Ids::default();
    let p = [Vector3::new(2.0, 2.0, 0.0)];

    engine.process(point_batch(&mut ids, LIDAR, 0.0, world, &p, 0.2)).unwrap();
    engine.process(point_batch(&mut ids, LIDAR, 0.1, world, &p, 0.2)).unwrap();
    engine.process(ObservationBatch::empty(LIDAR, 0.2, world)).unwrap();
    let _ = engine.process(ObservationBatch::empty(SensorId(5), 0.1, world));

    let debug = engine.reporter().first();
    assert_eq!(debug.cycle_starts().len(), 3);
    assert_eq!(debug.outputs().len(), 3);
    assert_eq!(debug.birth_events().len(), 1);
    // The tentative track misses at t=0.2 and is dropped
    assert_eq!(debug.deletion_events().len(), 1);
    assert_eq!(debug.association_events()[1].len(), 1);
    assert_eq!(debug.rejected_batches().len(), 1);
}

#[test]
fn test_config_round_trips_through_json() {
    let config = TrackerConfig::builder()
        .gate_threshold(16.0)
        .late_data(LateDataPolicy::Buffer { window: 0.2 })
        .cost_function(CostFunction::KinematicAppearance { weight: 2.0 })
        .build()
        .unwrap();
    let json = config.to_json().unwrap();
    assert_eq!(TrackerConfig::from_json(&json).unwrap(), config);

    let (frames, world) = sensor_fusion_tracker::FrameTree::with_root("world");
    let bad = TrackerConfig {
        gate_threshold: -1.0,
        ..TrackerConfig::default()
    };
    assert!(matches!(FusionEngine::new(bad, frames, world), Err(FusionError::Config(_))));
}
