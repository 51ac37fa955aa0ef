//! Performance benchmarks for fusion cycles
//!
//! Run with: cargo bench
//! Run specific benchmark: cargo bench -- hungarian
//! Compare against baseline: cargo bench -- --save-baseline main

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::{DMatrix, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;

use sensor_fusion_tracker::association::{extended_cost_matrix, hungarian};
use sensor_fusion_tracker::{
    Detection, FilterFamily, FrameId, FrameTree, FusionEngine, ObservationBatch, SensorId, TrackerConfig,
};

const SENSOR: SensorId = SensorId(0);

/// Targets on a grid, 20 m apart, drifting along x
fn grid(n: usize) -> Vec<Vector3<f64>> {
    let side = (n as f64).sqrt().ceil() as usize;
    (0..n)
        .map(|i| Vector3::new((i % side) as f64 * 20.0, (i / side) as f64 * 20.0, 0.0))
        .collect()
}

fn batch(rng: &mut StdRng, targets: &[Vector3<f64>], step: usize, frame: FrameId, next_id: &mut u64) -> ObservationBatch {
    let t = step as f64 * 0.1;
    let noise = Normal::new(0.0, 0.2).unwrap();
    let detections = targets
        .iter()
        .map(|p| {
            *next_id += 1;
            let z = Vector3::new(p.x + t + rng.sample(noise), p.y + rng.sample(noise), 0.0);
            Detection::point(*next_id, SENSOR, t, frame, z, 0.2)
        })
        .collect();
    ObservationBatch::new(SENSOR, t, frame, detections)
}

/// Engine holding `n` confirmed tracks
fn warmed_engine(n: usize, family: FilterFamily) -> (FusionEngine, FrameId, StdRng, u64) {
    let (frames, world) = FrameTree::with_root("world");
    let config = TrackerConfig::builder().filter(family).build().unwrap();
    let mut engine = FusionEngine::new(config, frames, world).unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let mut next_id = 0;
    let targets = grid(n);
    for step in 0..5 {
        engine.process(batch(&mut rng, &targets, step, world, &mut next_id)).unwrap();
    }
    (engine, world, rng, next_id)
}

// =============================================================================
// ASSIGNMENT BENCHMARKS
// =============================================================================

fn bench_hungarian(c: &mut Criterion) {
    let mut group = c.benchmark_group("hungarian");
    group.sample_size(20);

    for n in [10, 50, 100, 200] {
        let mut rng = StdRng::seed_from_u64(42);
        let costs = DMatrix::from_fn(n, n, |_, _| {
            if rng.gen_bool(0.8) {
                f64::INFINITY
            } else {
                rng.gen_range(0.0..9.21)
            }
        });
        let extended = extended_cost_matrix(&costs, 4.6);

        group.bench_with_input(BenchmarkId::from_parameter(n), &extended, |b, m| {
            b.iter(|| hungarian(black_box(m)).unwrap())
        });
    }
    group.finish();
}

// =============================================================================
// FULL CYCLE BENCHMARKS
// =============================================================================

fn bench_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("cycle");
    group.sample_size(20);

    for (name, family) in [("kalman", FilterFamily::Kalman), ("unscented", FilterFamily::unscented())] {
        for n in [10, 50, 100] {
            let targets = grid(n);
            group.bench_with_input(BenchmarkId::new(name, n), &n, |b, &n| {
                b.iter_batched(
                    || {
                        let (engine, world, mut rng, mut next_id) = warmed_engine(n, family);
                        let next = batch(&mut rng, &targets, 5, world, &mut next_id);
                        (engine, next)
                    },
                    |(mut engine, next)| engine.process(next).unwrap(),
                    criterion::BatchSize::LargeInput,
                )
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_hungarian, bench_cycle);
criterion_main!(benches);
