//! # Gaussian-Process Emulation
//!
//! Fits a surrogate model to expensive simulation outputs and predicts at
//! new inputs. The training contract follows the shared toolkit convention:
//! an output matrix `f` of shape (x rows) x (theta rows), flattened
//! column-major against the cross-product design matrix of every
//! (x row, theta row) pair with x varying fastest. When no design points are
//! supplied, `theta` is the sole regressor and `f` must be a single row.
//!
//! Hyperparameters (signal variance, lengthscale, noise variance) maximize
//! the log marginal likelihood via BFGS in log space with analytical
//! gradients. Optimizer non-convergence is not an error: the fit keeps the
//! best hyperparameters seen, warns, and records a [`ConvergenceStatus`]
//! the caller can inspect.

use crate::kernel::{Matern52, pairwise_distances};
use ndarray::{Array1, Array2, ArrayView2};
use ndarray_linalg::{Cholesky, Inverse, Solve, UPLO};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use thiserror::Error;
use wolfe_bfgs::{Bfgs, BfgsSolution};

#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error(
        "output matrix has shape {found_rows}x{found_cols}, expected {expected_rows}x{expected_cols} for the given inputs"
    )]
    OutputShapeMismatch {
        expected_rows: usize,
        expected_cols: usize,
        found_rows: usize,
        found_cols: usize,
    },

    #[error("prediction inputs have {found} columns, but the model was trained on {expected}")]
    InputDimensionMismatch { expected: usize, found: usize },

    #[error("every training row was dropped as missing; nothing to fit")]
    EmptyTrainingSet,

    #[error("a linear system solve failed; the covariance matrix may be singular: {0}")]
    LinearSystemSolveFailed(#[from] ndarray_linalg::error::LinalgError),
}

/// Options controlling the fit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FitOptions {
    /// Drop training rows whose output is NaN before fitting.
    pub ignore_nan: bool,
    /// BFGS iteration cap for the marginal-likelihood optimization.
    pub max_iterations: usize,
    /// BFGS gradient tolerance.
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            ignore_nan: true,
            max_iterations: 100,
            tolerance: 1e-5,
        }
    }
}

/// Outcome of the hyperparameter optimization. A `NotConverged` fit still
/// carries a usable model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ConvergenceStatus {
    Converged { iterations: usize, final_cost: f64 },
    NotConverged { reason: String, best_cost: f64 },
}

impl ConvergenceStatus {
    pub fn converged(&self) -> bool {
        matches!(self, ConvergenceStatus::Converged { .. })
    }
}

/// A trained Gaussian-process regression model.
#[derive(Clone, Debug)]
pub struct GpModel {
    train_inputs: Array2<f64>,
    /// K^{-1} y for the training targets.
    alpha: Array1<f64>,
    /// K^{-1}, kept for predictive variances.
    kinv: Array2<f64>,
    kernel: Matern52,
    noise_variance: f64,
}

impl GpModel {
    pub fn kernel(&self) -> Matern52 {
        self.kernel
    }

    pub fn noise_variance(&self) -> f64 {
        self.noise_variance
    }

    pub fn num_training_rows(&self) -> usize {
        self.train_inputs.nrows()
    }

    /// Predictive mean and standard deviation at each query row. The
    /// reported standard deviation includes the fitted noise variance.
    pub fn predict(
        &self,
        inputs: ArrayView2<f64>,
    ) -> Result<(Array1<f64>, Array1<f64>), EmulatorError> {
        if inputs.ncols() != self.train_inputs.ncols() {
            return Err(EmulatorError::InputDimensionMismatch {
                expected: self.train_inputs.ncols(),
                found: inputs.ncols(),
            });
        }

        let k_star = self.kernel.covariance(inputs, self.train_inputs.view());
        let mean = k_star.dot(&self.alpha);

        let prior = self.kernel.variance + self.noise_variance;
        let mut sd = Array1::zeros(inputs.nrows());
        for (i, row) in k_star.rows().into_iter().enumerate() {
            let reduction = row.dot(&self.kinv.dot(&row));
            sd[i] = (prior - reduction).max(0.0).sqrt();
        }
        Ok((mean, sd))
    }
}

/// A fitted emulator: the trained model plus the optimizer outcome.
#[derive(Clone, Debug)]
pub struct EmulatorFit {
    pub model: GpModel,
    pub status: ConvergenceStatus,
}

/// Prediction surfaces, shaped (x rows) x (theta rows). The variance is the
/// square of the model's reported standard deviation.
#[derive(Clone, Debug)]
pub struct Prediction {
    pub mean: Array2<f64>,
    pub var: Array2<f64>,
}

/// Cross-product design matrix: one row per (x row, theta row) pair, x
/// varying fastest, matching a column-major flatten of the output matrix.
fn cross_design(x: ArrayView2<f64>, theta: ArrayView2<f64>) -> Array2<f64> {
    let cols = x.ncols() + theta.ncols();
    let mut design = Array2::zeros((x.nrows() * theta.nrows(), cols));
    let mut row = 0;
    for trow in theta.rows() {
        for xrow in x.rows() {
            for (k, v) in xrow.iter().enumerate() {
                design[[row, k]] = *v;
            }
            for (k, v) in trow.iter().enumerate() {
                design[[row, x.ncols() + k]] = *v;
            }
            row += 1;
        }
    }
    design
}

fn training_set(
    x: Option<ArrayView2<f64>>,
    theta: ArrayView2<f64>,
    f: ArrayView2<f64>,
) -> Result<(Array2<f64>, Array1<f64>), EmulatorError> {
    match x {
        None => {
            // Theta is the sole regressor; one output per theta row.
            if f.nrows() != 1 || f.ncols() != theta.nrows() {
                return Err(EmulatorError::OutputShapeMismatch {
                    expected_rows: 1,
                    expected_cols: theta.nrows(),
                    found_rows: f.nrows(),
                    found_cols: f.ncols(),
                });
            }
            Ok((theta.to_owned(), f.row(0).to_owned()))
        }
        Some(x) => {
            if f.nrows() != x.nrows() || f.ncols() != theta.nrows() {
                return Err(EmulatorError::OutputShapeMismatch {
                    expected_rows: x.nrows(),
                    expected_cols: theta.nrows(),
                    found_rows: f.nrows(),
                    found_cols: f.ncols(),
                });
            }
            let design = cross_design(x, theta);
            // Column-major flatten of f: x index varies fastest.
            let mut targets = Array1::zeros(design.nrows());
            let mut row = 0;
            for j in 0..f.ncols() {
                for i in 0..f.nrows() {
                    targets[row] = f[[i, j]];
                    row += 1;
                }
            }
            Ok((design, targets))
        }
    }
}

fn drop_missing_rows(design: Array2<f64>, targets: Array1<f64>) -> (Array2<f64>, Array1<f64>) {
    let keep: Vec<usize> = targets
        .iter()
        .enumerate()
        .filter(|(_, y)| !y.is_nan())
        .map(|(i, _)| i)
        .collect();
    if keep.len() == targets.len() {
        return (design, targets);
    }

    let mut kept_design = Array2::zeros((keep.len(), design.ncols()));
    let mut kept_targets = Array1::zeros(keep.len());
    for (out, &i) in keep.iter().enumerate() {
        kept_design.row_mut(out).assign(&design.row(i));
        kept_targets[out] = targets[i];
    }
    (kept_design, kept_targets)
}

/// Negative log marginal likelihood and its gradient with respect to the
/// log-hyperparameters z = (ln variance, ln lengthscale, ln noise).
fn nll_and_grad(
    distances: &Array2<f64>,
    targets: &Array1<f64>,
    z: &Array1<f64>,
) -> Result<(f64, Array1<f64>), EmulatorError> {
    let kernel = Matern52 {
        variance: z[0].exp(),
        lengthscale: z[1].exp(),
    };
    let noise = z[2].exp();
    let n = targets.len();

    let mut k = distances.mapv(|r| kernel.value(r));
    for i in 0..n {
        k[[i, i]] += noise;
    }

    let chol = k.cholesky(UPLO::Lower)?;
    let ln_det = 2.0 * chol.diag().mapv(f64::ln).sum();
    let alpha = k.solve(targets)?;
    let kinv = k.inv()?;

    let ln_2pi = (2.0 * std::f64::consts::PI).ln();
    let nll = 0.5 * targets.dot(&alpha) + 0.5 * ln_det + 0.5 * n as f64 * ln_2pi;

    // d nll / dz_j = 0.5 * sum over entries of (K^{-1} - alpha alpha^T) ∘ dK/dz_j
    let mut grad = Array1::zeros(3);
    for i in 0..n {
        for j in 0..n {
            let w = kinv[[i, j]] - alpha[i] * alpha[j];
            let r = distances[[i, j]];
            grad[0] += 0.5 * w * kernel.d_ln_variance(r);
            grad[1] += 0.5 * w * kernel.d_ln_lengthscale(r);
            if i == j {
                grad[2] += 0.5 * w * noise;
            }
        }
    }

    Ok((nll, grad))
}

fn initial_log_hyperparameters(design: &Array2<f64>, targets: &Array1<f64>) -> Array1<f64> {
    let n = targets.len() as f64;
    let mean = targets.sum() / n;
    let var = (targets.mapv(|y| (y - mean) * (y - mean)).sum() / n).max(1e-8);

    let distances = pairwise_distances(design.view(), design.view());
    let mut total = 0.0;
    let mut count = 0.0;
    for i in 0..design.nrows() {
        for j in (i + 1)..design.nrows() {
            total += distances[[i, j]];
            count += 1.0;
        }
    }
    let lengthscale = if count > 0.0 && total > 0.0 {
        total / count
    } else {
        1.0
    };

    ndarray::array![var.ln(), lengthscale.ln(), (1e-2 * var).ln()]
}

fn optimize_hyperparameters(
    design: &Array2<f64>,
    targets: &Array1<f64>,
    options: &FitOptions,
) -> (Array1<f64>, ConvergenceStatus) {
    let distances = pairwise_distances(design.view(), design.view());
    let z0 = initial_log_hyperparameters(design, targets);

    // Track the best point seen so a failed line search still yields a model.
    let best: RefCell<Option<(f64, Array1<f64>)>> = RefCell::new(None);

    let cost_and_grad = |z: &Array1<f64>| -> (f64, Array1<f64>) {
        let safe_z = z.mapv(|v| v.clamp(-20.0, 20.0));
        match nll_and_grad(&distances, targets, &safe_z) {
            Ok((cost, grad)) if cost.is_finite() => {
                let mut best = best.borrow_mut();
                let improved = best.as_ref().map_or(true, |(c, _)| cost < *c);
                if improved {
                    *best = Some((cost, safe_z.clone()));
                }
                (cost, grad)
            }
            Ok(_) => {
                log::warn!("non-finite marginal likelihood; returning large finite cost");
                (1e10, Array1::zeros(3))
            }
            Err(e) => {
                log::warn!(
                    "covariance factorization failed during optimization: {e}; returning large finite cost"
                );
                (1e10, Array1::zeros(3))
            }
        }
    };

    let outcome = Bfgs::new(z0.clone(), cost_and_grad)
        .with_tolerance(options.tolerance)
        .with_max_iterations(options.max_iterations)
        .run();

    match outcome {
        Ok(BfgsSolution {
            final_point,
            final_value,
            iterations,
            ..
        }) => (
            final_point.mapv(|v| v.clamp(-20.0, 20.0)),
            ConvergenceStatus::Converged {
                iterations: iterations as usize,
                final_cost: final_value,
            },
        ),
        Err(e) => {
            let (best_cost, best_z) = best.into_inner().unwrap_or((f64::INFINITY, z0));
            log::warn!(
                "GP hyperparameter optimization did not converge ({e:?}); keeping best point seen (cost {best_cost:.6})"
            );
            (
                best_z,
                ConvergenceStatus::NotConverged {
                    reason: format!("{e:?}"),
                    best_cost,
                },
            )
        }
    }
}

/// Fits a Gaussian-process emulator to the output matrix `f`.
///
/// Never fails for optimizer non-convergence; see [`ConvergenceStatus`].
pub fn fit(
    x: Option<ArrayView2<f64>>,
    theta: ArrayView2<f64>,
    f: ArrayView2<f64>,
    options: &FitOptions,
) -> Result<EmulatorFit, EmulatorError> {
    let (design, targets) = training_set(x, theta, f)?;
    let (design, targets) = if options.ignore_nan {
        drop_missing_rows(design, targets)
    } else {
        (design, targets)
    };
    if targets.is_empty() {
        return Err(EmulatorError::EmptyTrainingSet);
    }

    log::info!(
        "fitting GP emulator on {} rows of dimension {}",
        design.nrows(),
        design.ncols()
    );

    let (z, status) = optimize_hyperparameters(&design, &targets, options);
    let kernel = Matern52 {
        variance: z[0].exp(),
        lengthscale: z[1].exp(),
    };
    let noise_variance = z[2].exp();

    let mut k = kernel.covariance(design.view(), design.view());
    for i in 0..targets.len() {
        k[[i, i]] += noise_variance;
    }
    let alpha = k.solve(&targets)?;
    let kinv = k.inv()?;

    Ok(EmulatorFit {
        model: GpModel {
            train_inputs: design,
            alpha,
            kinv,
            kernel,
            noise_variance,
        },
        status,
    })
}

/// Predicts mean and variance surfaces shaped (x rows) x (theta rows),
/// reconstructing the same design-matrix convention used by [`fit`].
pub fn predict(
    fit: &EmulatorFit,
    x: Option<ArrayView2<f64>>,
    theta: ArrayView2<f64>,
) -> Result<Prediction, EmulatorError> {
    let design = match x {
        None => theta.to_owned(),
        Some(x) => cross_design(x, theta),
    };
    let (mean_flat, sd_flat) = fit.model.predict(design.view())?;

    let nx = x.map_or(1, |x| x.nrows());
    let ntheta = theta.nrows();
    let mut mean = Array2::zeros((nx, ntheta));
    let mut var = Array2::zeros((nx, ntheta));
    for j in 0..ntheta {
        for i in 0..nx {
            let flat = j * nx + i;
            mean[[i, j]] = mean_flat[flat];
            var[[i, j]] = sd_flat[flat] * sd_flat[flat];
        }
    }
    Ok(Prediction { mean, var })
}
