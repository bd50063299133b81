use aquifer::borehole;
use aquifer::sampler::{self, MhConfig};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ndarray::{Array2, ArrayView1};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;

fn bench_borehole_model(c: &mut Criterion) {
    let x = Array2::from_shape_fn((50, 2), |(i, j)| ((i * 2 + j) as f64 * 0.37) % 1.0);
    let theta = Array2::from_shape_fn((50, 4), |(i, j)| ((i * 4 + j) as f64 * 0.61) % 1.0);

    c.bench_function("borehole_model_50x50", |b| {
        b.iter(|| borehole::model(black_box(x.view()), black_box(theta.view())).unwrap())
    });
}

fn bench_sampler(c: &mut Criterion) {
    let logpost = |t: ArrayView1<f64>| -0.5 * t.dot(&t);
    let config = MhConfig {
        num_samples: 500,
        ..MhConfig::default()
    };

    c.bench_function("metropolis_hastings_500", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(1);
            sampler::sample(
                logpost,
                |n, rng: &mut StdRng| {
                    Array2::from_shape_fn((n, 2), |_| rng.sample(StandardNormal))
                },
                &config,
                &mut rng,
            )
            .unwrap()
        })
    });
}

criterion_group!(benches, bench_borehole_model, bench_sampler);
criterion_main!(benches);
