use aquifer::sampler::{self, BURN_IN, MhConfig, StepKind};
use ndarray::{Array2, ArrayView1, array};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;

fn standard_normal_draws<R: Rng>(n: usize, rng: &mut R) -> Array2<f64> {
    Array2::from_shape_fn((n, 1), |_| rng.sample(StandardNormal))
}

fn standard_normal_logpost(t: ArrayView1<f64>) -> f64 {
    -0.5 * t.dot(&t)
}

#[test]
fn chain_converges_to_standard_normal_mean() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut rng = StdRng::seed_from_u64(20260825);
    let config = MhConfig {
        num_samples: 2000,
        step_kind: StepKind::Normal,
        step_param: Some(array![2.4]),
        theta0: Some(array![3.0]),
    };

    let chain = sampler::sample(
        standard_normal_logpost,
        standard_normal_draws,
        &config,
        &mut rng,
    )
    .unwrap();

    let mean = chain.samples.column(0).mean().unwrap();
    assert!(
        mean.abs() < 0.3,
        "post-burn-in mean {mean} too far from 0"
    );
    assert!(chain.acceptance_rate > 0.0);
    assert!(chain.acceptance_rate < 1.0);

    // The burn-in is fixed; the starting point itself must not be retained.
    assert_eq!(chain.samples.nrows(), config.num_samples);
    assert!(BURN_IN >= 1000);
}

#[test]
fn defaults_are_derived_from_draw_func() {
    // No theta0, no step_param: both come from the prior draws.
    let mut rng = StdRng::seed_from_u64(99);
    let config = MhConfig {
        num_samples: 500,
        ..MhConfig::default()
    };

    let chain = sampler::sample(
        standard_normal_logpost,
        standard_normal_draws,
        &config,
        &mut rng,
    )
    .unwrap();

    assert_eq!(chain.samples.dim(), (500, 1));
    assert!(chain.acceptance_rate > 0.0);
    assert!(chain.acceptance_rate < 1.0);
    assert!(chain.log_posterior.iter().all(|v| v.is_finite()));
}

#[test]
fn impossible_posterior_never_moves() {
    let theta0 = array![1.5];
    let start = theta0.clone();
    let logpost = move |t: ArrayView1<f64>| {
        if t == start.view() {
            -1.0
        } else {
            f64::NEG_INFINITY
        }
    };

    let mut rng = StdRng::seed_from_u64(5);
    let config = MhConfig {
        num_samples: 300,
        step_kind: StepKind::Normal,
        step_param: Some(array![0.7]),
        theta0: Some(theta0.clone()),
    };

    let chain = sampler::sample(logpost, standard_normal_draws, &config, &mut rng).unwrap();

    assert_eq!(chain.acceptance_rate, 0.0);
    assert!(chain.samples.rows().into_iter().all(|r| r == theta0.view()));
    assert!(chain.log_posterior.iter().all(|&v| v == -1.0));
}

#[test]
fn multidimensional_chain_keeps_dimensions_independent_in_shape() {
    let mut rng = StdRng::seed_from_u64(7);
    let config = MhConfig {
        num_samples: 400,
        step_kind: StepKind::Normal,
        step_param: Some(array![2.0, 2.0, 2.0]),
        theta0: Some(array![0.0, 0.0, 0.0]),
    };

    let chain = sampler::sample(
        standard_normal_logpost,
        |n, rng: &mut StdRng| Array2::from_shape_fn((n, 3), |_| rng.sample(StandardNormal)),
        &config,
        &mut rng,
    )
    .unwrap();

    assert_eq!(chain.samples.dim(), (400, 3));
    assert!(chain.acceptance_rate > 0.0);
}
