use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use perk::anatomy::{AnatomyBinding, AnatomyRole};
use perk::metrics::similarity::{DeviationFrechet, DeviationHausdorff, DeviationTimeWarp};
use perk::params::OutputParams;
use perk::{PoseSample, ReferenceTrajectory, Role, StreamingMetric};

fn random_walk(rng: &mut StdRng, len: usize) -> Vec<DVec3> {
    let mut point = DVec3::ZERO;
    (0..len)
        .map(|_| {
            point += DVec3::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0), 1.0);
            point
        })
        .collect()
}

fn replay<M: StreamingMetric + Default>(reference: &AnatomyBinding, samples: &[PoseSample]) -> f64 {
    let mut metric = M::default();
    metric.bind_anatomy(AnatomyRole::Trajectory, reference);
    let mut params = OutputParams::default();
    for sample in samples {
        metric.consume(sample, &mut params);
    }
    metric.result().as_scalar().unwrap_or_default()
}

fn bench_similarity(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let samples: Vec<PoseSample> = random_walk(&mut rng, 500)
        .into_iter()
        .enumerate()
        .map(|(i, point)| PoseSample::at_point(i as f64 * 0.02, point, Role::Needle))
        .collect();

    let mut group = c.benchmark_group("similarity");
    for reference_len in [50, 200] {
        let reference: AnatomyBinding = ReferenceTrajectory::from_points(random_walk(&mut rng, reference_len)).into();

        group.bench_with_input(BenchmarkId::new("frechet", reference_len), &reference, |b, reference| {
            b.iter(|| black_box(replay::<DeviationFrechet>(reference, &samples)))
        });
        group.bench_with_input(BenchmarkId::new("hausdorff", reference_len), &reference, |b, reference| {
            b.iter(|| black_box(replay::<DeviationHausdorff>(reference, &samples)))
        });
        group.bench_with_input(BenchmarkId::new("time_warp", reference_len), &reference, |b, reference| {
            b.iter(|| black_box(replay::<DeviationTimeWarp>(reference, &samples)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_similarity);
criterion_main!(benches);
