//! # Borehole Synthetic Benchmark
//!
//! A deterministic nonlinear map from engineering parameters to a flow-rate
//! output, used to generate test data for emulation experiments. Inputs
//! arrive standardized to the unit hypercube and are descaled to physical
//! units here: a 2-column design point `x` (well radius `rw`, lower head
//! `Hl`) and a 4-column calibration parameter `theta` (upper head `Hu`,
//! length/conductivity ratio `Ld_Kw`, effective transmissivity `Treff`, and
//! an exponential scaling `powparam`).
//!
//! Two censoring transforms inject missing values (NaN) into the dense
//! output matrix: a structural one that censors entries too large relative
//! to the reference output, and a random one that censors entries
//! independently with a fixed Bernoulli probability.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use thiserror::Error;

/// Number of standardized design-point columns.
pub const XDIM: usize = 2;
/// Number of standardized calibration-parameter columns.
pub const THETA_DIM: usize = 4;

/// Process-wide benchmark metadata. Immutable; replaces the original
/// mutable metadata dictionary.
#[derive(Clone, Copy, Debug)]
pub struct BenchmarkMeta {
    pub function: &'static str,
    pub xdim: usize,
    pub theta_dim: usize,
    /// Structural-failure ratio threshold under `FailMode::High`.
    pub c_structfail_high: f64,
    /// Structural-failure ratio threshold under `FailMode::Low`.
    pub c_structfail_low: f64,
    /// Random-failure probability under `FailMode::High`.
    pub p_randfail_high: f64,
    /// Random-failure probability under `FailMode::Low`.
    pub p_randfail_low: f64,
}

pub const BOREHOLE_META: BenchmarkMeta = BenchmarkMeta {
    function: "Borehole",
    xdim: XDIM,
    theta_dim: THETA_DIM,
    c_structfail_high: 0.7,
    c_structfail_low: 1.8,
    p_randfail_high: 0.75,
    p_randfail_low: 0.25,
};

/// Failure-rate regime for the censoring transforms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailMode {
    High,
    Low,
}

impl FailMode {
    fn structural_threshold(self) -> f64 {
        match self {
            FailMode::High => BOREHOLE_META.c_structfail_high,
            FailMode::Low => BOREHOLE_META.c_structfail_low,
        }
    }

    fn random_probability(self) -> f64 {
        match self {
            FailMode::High => BOREHOLE_META.p_randfail_high,
            FailMode::Low => BOREHOLE_META.p_randfail_low,
        }
    }
}

/// Coefficient set for the `Ld_Kw` descaling transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LdKwVariant {
    Hard,
    Soft,
}

#[derive(Error, Debug)]
pub enum BoreholeError {
    #[error("expected {expected} columns for {name}, found {found}")]
    DimensionMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },
}

/// A descaled design point.
#[derive(Clone, Copy, Debug)]
pub struct BoreholeInput {
    pub rw: f64,
    pub hl: f64,
}

impl BoreholeInput {
    pub fn from_row(row: ArrayView1<f64>) -> Self {
        Self {
            rw: row[0],
            hl: row[1],
        }
    }
}

/// A descaled calibration parameter, in physical column order.
#[derive(Clone, Copy, Debug)]
pub struct BoreholeTheta {
    pub hu: f64,
    pub ld_kw: f64,
    pub treff: f64,
    pub powparam: f64,
}

impl BoreholeTheta {
    pub fn from_row(row: ArrayView1<f64>) -> Self {
        Self {
            hu: row[0],
            ld_kw: row[1],
            treff: row[2],
            powparam: row[3],
        }
    }
}

/// Lifts a single standardized row to a 1 x d design matrix.
pub fn lift_row(row: ArrayView1<f64>) -> Array2<f64> {
    row.to_owned().insert_axis(Axis(0))
}

fn check_columns(
    name: &'static str,
    expected: usize,
    found: usize,
) -> Result<(), BoreholeError> {
    if found == expected {
        Ok(())
    } else {
        Err(BoreholeError::DimensionMismatch {
            name,
            expected,
            found,
        })
    }
}

/// Descales standardized design points in [0, 1]^2 to physical units.
///
/// `rw` follows a log-affine transform onto [0.05, 0.5]; `Hl` an affine
/// transform onto [700, 820].
pub fn xstd_to_x(xstd: ArrayView2<f64>) -> Result<Array2<f64>, BoreholeError> {
    check_columns("x", XDIM, xstd.ncols())?;

    let ln_lo = 0.05_f64.ln();
    let ln_hi = 0.5_f64.ln();

    let mut x = Array2::zeros((xstd.nrows(), XDIM));
    for (i, row) in xstd.rows().into_iter().enumerate() {
        x[[i, 0]] = (ln_lo + row[0] * (ln_hi - ln_lo)).exp();
        x[[i, 1]] = 700.0 + row[1] * (820.0 - 700.0);
    }
    Ok(x)
}

/// Descales standardized parameters in [0, 1]^4 to physical units.
///
/// Standardized column order is (Treff, Hu, Ld_Kw, powparam); the returned
/// matrix is in the physical order (Hu, Ld_Kw, Treff, powparam) consumed by
/// [`BoreholeTheta::from_row`].
pub fn tstd_to_theta(
    tstd: ArrayView2<f64>,
    variant: LdKwVariant,
) -> Result<Array2<f64>, BoreholeError> {
    check_columns("theta", THETA_DIM, tstd.ncols())?;

    let (ld_kw_lo, ld_kw_hi) = match variant {
        LdKwVariant::Hard => (1120.0 / 15000.0, 1680.0 / 1500.0),
        LdKwVariant::Soft => (1120.0 / 12045.0, 1680.0 / 9855.0),
    };

    let mut theta = Array2::zeros((tstd.nrows(), THETA_DIM));
    for (i, row) in tstd.rows().into_iter().enumerate() {
        let treff = 0.05 + row[0] * (0.5 - 0.05);
        let hu = 990.0 + row[1] * (1110.0 - 990.0);
        let ld_kw = ld_kw_lo + row[2] * (ld_kw_hi - ld_kw_lo);
        let powparam = -0.5 + row[3];

        theta[[i, 0]] = hu;
        theta[[i, 1]] = ld_kw;
        theta[[i, 2]] = treff;
        theta[[i, 3]] = powparam;
    }
    Ok(theta)
}

fn flow_rate(input: &BoreholeInput, theta: &BoreholeTheta) -> f64 {
    let numer = 2.0 * std::f64::consts::PI * (theta.hu - input.hl);
    let denom = 2.0 * theta.ld_kw / (input.rw * input.rw) + theta.treff;
    (numer / denom) * (theta.powparam * input.rw).exp()
}

/// Evaluates the benchmark on every (x row, theta row) pair.
///
/// Returns the dense output matrix of shape (x rows) x (theta rows), with
/// element `[i, j]` the flow rate at design point `i` and parameter `j`.
pub fn model(
    xstd: ArrayView2<f64>,
    tstd: ArrayView2<f64>,
) -> Result<Array2<f64>, BoreholeError> {
    let x = xstd_to_x(xstd)?;
    let theta = tstd_to_theta(tstd, LdKwVariant::Hard)?;

    let mut f = Array2::zeros((x.nrows(), theta.nrows()));
    for (j, trow) in theta.rows().into_iter().enumerate() {
        let t = BoreholeTheta::from_row(trow);
        for (i, xrow) in x.rows().into_iter().enumerate() {
            f[[i, j]] = flow_rate(&BoreholeInput::from_row(xrow), &t);
        }
    }
    Ok(f)
}

/// Evaluates the benchmark at the reference parameter (all standardized
/// coordinates 0.5). Returns a (x rows) x 1 matrix.
pub fn true_output(xstd: ArrayView2<f64>) -> Result<Array2<f64>, BoreholeError> {
    let theta0 = Array2::from_elem((1, THETA_DIM), 0.5);
    model(xstd, theta0.view())
}

/// Structural censoring: entries whose ratio to the reference output for
/// the same design point strictly exceeds the fail-mode threshold are set
/// to NaN. Entries that pass are bit-identical to [`model`]'s output.
pub fn failmodel(
    xstd: ArrayView2<f64>,
    tstd: ArrayView2<f64>,
    fail: FailMode,
) -> Result<Array2<f64>, BoreholeError> {
    let c = fail.structural_threshold();
    let mut f = model(xstd, tstd)?;
    let f0 = true_output(xstd)?;

    for i in 0..f.nrows() {
        let reference = f0[[i, 0]];
        for j in 0..f.ncols() {
            if f[[i, j]] / reference > c {
                f[[i, j]] = f64::NAN;
            }
        }
    }
    Ok(f)
}

/// Random censoring: each entry is independently set to NaN with the
/// fail-mode Bernoulli probability.
pub fn failmodel_random<R: Rng>(
    xstd: ArrayView2<f64>,
    tstd: ArrayView2<f64>,
    fail: FailMode,
    rng: &mut R,
) -> Result<Array2<f64>, BoreholeError> {
    let p = fail.random_probability();
    let mut f = model(xstd, tstd)?;

    for value in f.iter_mut() {
        if rng.gen_bool(p) {
            *value = f64::NAN;
        }
    }
    Ok(f)
}
