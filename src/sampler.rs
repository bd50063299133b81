//! # Random-Walk Metropolis-Hastings
//!
//! A single-chain sampler with a fixed burn-in of [`BURN_IN`] iterations.
//! The caller supplies the log of the (possibly unnormalized) target
//! density and an initial-design draw function; the chain proposes
//! symmetric per-dimension steps (Gaussian or uniform), accepts with
//! probability min(1, exp(candidate - current)), and rejects non-finite
//! candidate log-posteriors unconditionally. The first [`BURN_IN`] rows are
//! discarded before reporting.
//!
//! Acceptance is counted over the retained (post-burn-in) portion of the
//! chain; the reported rate is that count divided by `num_samples`.

use ndarray::{Array1, Array2, ArrayView1, Axis, s};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chain iterations discarded before reporting.
pub const BURN_IN: usize = 1000;

/// Proposal noise family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    /// Gaussian N(0, 1) noise scaled per dimension.
    Normal,
    /// Uniform noise on [-0.5, 0.5) scaled per dimension.
    Uniform,
}

/// Sampler configuration. Absent fields are derived from `draw_func`:
/// `theta0` from a single draw, `step_param` from the per-dimension
/// standard deviation of 1000 draws.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MhConfig {
    pub num_samples: usize,
    pub step_kind: StepKind,
    pub step_param: Option<Array1<f64>>,
    pub theta0: Option<Array1<f64>>,
}

impl Default for MhConfig {
    fn default() -> Self {
        Self {
            num_samples: 2000,
            step_kind: StepKind::Normal,
            step_param: None,
            theta0: None,
        }
    }
}

/// The retained portion of the chain.
#[derive(Clone, Debug)]
pub struct McmcChain {
    /// Accepted positions, shape (num_samples, dim).
    pub samples: Array2<f64>,
    /// Log-posterior value at each retained position.
    pub log_posterior: Array1<f64>,
    /// Post-burn-in accepted transitions divided by `num_samples`.
    pub acceptance_rate: f64,
}

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("num_samples must be positive")]
    NoSamplesRequested,

    #[error("draw_func returned an empty draw; cannot determine the chain dimension")]
    EmptyDraw,

    #[error("{name} has length {found}, expected the chain dimension {expected}")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Draws `num_samples` rows from the posterior defined by `logpost_func`.
///
/// `draw_func(n, rng)` must return an n x dim matrix of initial-design
/// draws. A non-finite candidate log-posterior is a normal rejection event,
/// not an error.
pub fn sample<R, L, D>(
    logpost_func: L,
    mut draw_func: D,
    config: &MhConfig,
    rng: &mut R,
) -> Result<McmcChain, SamplerError>
where
    R: Rng,
    L: Fn(ArrayView1<f64>) -> f64,
    D: FnMut(usize, &mut R) -> Array2<f64>,
{
    if config.num_samples == 0 {
        return Err(SamplerError::NoSamplesRequested);
    }

    let theta0: Array1<f64> = match &config.theta0 {
        Some(t) => t.clone(),
        None => {
            let draw = draw_func(1, rng);
            if draw.nrows() == 0 {
                return Err(SamplerError::EmptyDraw);
            }
            draw.row(0).to_owned()
        }
    };
    let dim = theta0.len();
    if dim == 0 {
        return Err(SamplerError::EmptyDraw);
    }

    let step_param: Array1<f64> = match &config.step_param {
        Some(s) => {
            if s.len() != dim {
                return Err(SamplerError::LengthMismatch {
                    name: "step_param",
                    expected: dim,
                    found: s.len(),
                });
            }
            s.clone()
        }
        None => {
            let draws = draw_func(1000, rng);
            if draws.ncols() != dim {
                return Err(SamplerError::LengthMismatch {
                    name: "draw_func output",
                    expected: dim,
                    found: draws.ncols(),
                });
            }
            draws.std_axis(Axis(0), 0.0)
        }
    };

    let total = BURN_IN + config.num_samples;
    let mut theta = Array2::zeros((total, dim));
    let mut lpost = Array1::zeros(total);
    theta.row_mut(0).assign(&theta0);
    lpost[0] = logpost_func(theta0.view());

    let mut n_acc = 0usize;
    for i in 1..total {
        let mut candidate = theta.row(i - 1).to_owned();
        for k in 0..dim {
            let noise: f64 = match config.step_kind {
                StepKind::Normal => rng.sample(StandardNormal),
                StepKind::Uniform => rng.gen_range(-0.5..0.5),
            };
            candidate[k] += step_param[k] * noise;
        }

        let candidate_lpost = logpost_func(candidate.view());
        let accept = if candidate_lpost.is_finite() {
            let p_accept = (candidate_lpost - lpost[i - 1]).exp().min(1.0);
            rng.gen_range(0.0..1.0) < p_accept
        } else {
            false
        };

        if accept {
            theta.row_mut(i).assign(&candidate);
            lpost[i] = candidate_lpost;
            if i >= BURN_IN {
                n_acc += 1;
            }
        } else {
            let previous = theta.row(i - 1).to_owned();
            theta.row_mut(i).assign(&previous);
            lpost[i] = lpost[i - 1];
        }
    }

    let acceptance_rate = n_acc as f64 / config.num_samples as f64;
    log::info!(
        "Metropolis-Hastings complete: {} retained samples, acceptance rate {:.3}",
        config.num_samples,
        acceptance_rate
    );

    Ok(McmcChain {
        samples: theta.slice(s![BURN_IN.., ..]).to_owned(),
        log_posterior: lpost.slice(s![BURN_IN..]).to_owned(),
        acceptance_rate,
    })
}
