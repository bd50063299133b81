//! Matérn-5/2 covariance function with an isotropic lengthscale, plus the
//! analytical derivatives of the covariance with respect to the
//! log-hyperparameters used by gradient-based marginal-likelihood
//! optimization.

use ndarray::{Array2, ArrayView2};

const SQRT_5: f64 = 2.236_067_977_499_79;

/// Matérn-5/2 kernel: k(r) = variance * (1 + s + s^2/3) * exp(-s) with
/// s = sqrt(5) * r / lengthscale.
#[derive(Clone, Copy, Debug)]
pub struct Matern52 {
    pub variance: f64,
    pub lengthscale: f64,
}

impl Matern52 {
    pub fn value(&self, r: f64) -> f64 {
        let s = SQRT_5 * r / self.lengthscale;
        self.variance * (1.0 + s + s * s / 3.0) * (-s).exp()
    }

    /// dk/d(ln variance) at distance r: the covariance itself.
    pub fn d_ln_variance(&self, r: f64) -> f64 {
        self.value(r)
    }

    /// dk/d(ln lengthscale) at distance r.
    ///
    /// From dk/ds = -variance * (s/3)(1 + s) exp(-s) and ds/d(ln l) = -s.
    pub fn d_ln_lengthscale(&self, r: f64) -> f64 {
        let s = SQRT_5 * r / self.lengthscale;
        self.variance * (s * s / 3.0) * (1.0 + s) * (-s).exp()
    }

    /// Cross-covariance matrix between the rows of `a` and the rows of `b`.
    pub fn covariance(&self, a: ArrayView2<f64>, b: ArrayView2<f64>) -> Array2<f64> {
        pairwise_distances(a, b).mapv(|r| self.value(r))
    }
}

/// Euclidean distances between every row of `a` and every row of `b`.
pub fn pairwise_distances(a: ArrayView2<f64>, b: ArrayView2<f64>) -> Array2<f64> {
    let mut d = Array2::zeros((a.nrows(), b.nrows()));
    for (i, arow) in a.rows().into_iter().enumerate() {
        for (j, brow) in b.rows().into_iter().enumerate() {
            let mut sq = 0.0;
            for (ai, bi) in arow.iter().zip(brow.iter()) {
                let diff = ai - bi;
                sq += diff * diff;
            }
            d[[i, j]] = sq.sqrt();
        }
    }
    d
}
