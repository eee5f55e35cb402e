//! Least-squares projection with an incremental QR factorisation and
//! least-angle model selection scored by corrected leave-one-out error.
//!
//! Column 0 of every design matrix handed to this module is the constant
//! basis term. It always enters first and is never dropped.

use faer::Mat;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{ChaosError, Result};
use crate::math::{axpy, centered_sum_squares, norm, vector_dot};

/// Settings of the least-angle selection path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionSettings {
    /// Maximum number of terms entered along the path, constant excluded.
    pub max_iterations: usize,
    /// Stop once the leave-one-out error exceeds this multiple of the best
    /// error seen so far.
    pub max_error_factor: f64,
    /// A column whose component orthogonal to the active columns is below
    /// this fraction of its norm counts as linearly dependent.
    pub dependence_tolerance: f64,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            max_error_factor: 2.,
            dependence_tolerance: 1e-10,
        }
    }
}

impl SelectionSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(ChaosError::InvalidArgument {
                stage: "selection",
                reason: "max_iterations must be at least 1".to_string(),
            });
        }
        if !(self.max_error_factor >= 1.) {
            return Err(ChaosError::InvalidArgument {
                stage: "selection",
                reason: format!(
                    "max_error_factor must be at least 1, got {}",
                    self.max_error_factor
                ),
            });
        }
        if !(self.dependence_tolerance > 0. && self.dependence_tolerance < 1.) {
            return Err(ChaosError::InvalidArgument {
                stage: "selection",
                reason: format!(
                    "dependence_tolerance must lie in (0, 1), got {}",
                    self.dependence_tolerance
                ),
            });
        }
        Ok(())
    }
}

/// Smallest admissible `1 - h_i` for a leave-one-out estimate.
const LEVERAGE_MARGIN: f64 = 1e-10;

/// Thin QR factorisation `Ψ_A = Q R` grown one column at a time.
///
/// Alongside the factors it tracks the least-squares residual of the
/// response, the diagonal of the hat matrix `Q Qᵀ` and the squared
/// Frobenius norm of `R⁻¹`, which equals `tr((Ψ_Aᵀ Ψ_A)⁻¹)`.
#[derive(Debug, Clone)]
pub(crate) struct IncrementalQr {
    q: Vec<Vec<f64>>,
    /// Column `k` holds the `k + 1` non-zero entries of column `k` of `R`.
    r: Vec<Vec<f64>>,
    /// Same layout for `R⁻¹`.
    r_inv: Vec<Vec<f64>>,
    r_inv_norm_sq: f64,
    /// `Qᵀ y`.
    projections: Vec<f64>,
    residual: Vec<f64>,
    leverage: Vec<f64>,
    terms: Vec<usize>,
}

impl IncrementalQr {
    pub(crate) fn new(response: &[f64]) -> Self {
        Self {
            q: vec![],
            r: vec![],
            r_inv: vec![],
            r_inv_norm_sq: 0.,
            projections: vec![],
            residual: response.to_vec(),
            leverage: vec![0.; response.len()],
            terms: vec![],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.q.len()
    }

    pub(crate) fn samples(&self) -> usize {
        self.residual.len()
    }

    pub(crate) fn terms(&self) -> &[usize] {
        &self.terms
    }

    pub(crate) fn q(&self, k: usize) -> &[f64] {
        &self.q[k]
    }

    /// Entry `(row, col)` of `R`, `row <= col`.
    pub(crate) fn r(&self, row: usize, col: usize) -> f64 {
        self.r[col][row]
    }

    pub(crate) fn residual_sum_squares(&self) -> f64 {
        vector_dot(&self.residual, &self.residual)
    }

    /// Append `column` as basis term `term`.
    ///
    /// Returns `false` and leaves the factorisation untouched when the column
    /// is numerically in the span of the current columns.
    pub(crate) fn push(&mut self, term: usize, column: &[f64], tolerance: f64) -> bool {
        let scale = norm(column);
        if !(scale > 0.) || !scale.is_finite() {
            return false;
        }
        let mut v = column.to_vec();
        let mut r_col = vec![0f64; self.len() + 1];
        // Two passes of modified Gram-Schmidt keep Q orthogonal to working precision.
        for _ in 0..2 {
            for (q, r) in self.q.iter().zip(r_col.iter_mut()) {
                let c = vector_dot(q, &v);
                axpy(q, &mut v, -c);
                *r += c;
            }
        }
        let rho = norm(&v);
        if rho <= tolerance * scale {
            return false;
        }
        v.iter_mut().for_each(|x| *x /= rho);
        let k = self.len();
        r_col[k] = rho;

        // Bordered inverse: the new column of R⁻¹ is (-R⁻¹ r / ρ, 1 / ρ).
        let mut inv_col = vec![0f64; k + 1];
        for (j, col) in self.r_inv.iter().enumerate() {
            let scaled = r_col[j] / rho;
            for (i, &value) in col.iter().enumerate() {
                inv_col[i] -= value * scaled;
            }
        }
        inv_col[k] = 1. / rho;
        self.r_inv_norm_sq += inv_col.iter().map(|x| x * x).sum::<f64>();

        let projection = vector_dot(&v, &self.residual);
        axpy(&v, &mut self.residual, -projection);
        self.leverage
            .iter_mut()
            .zip(v.iter())
            .for_each(|(h, &x)| *h += x * x);

        self.projections.push(projection);
        self.q.push(v);
        self.r.push(r_col);
        self.r_inv.push(inv_col);
        self.terms.push(term);
        true
    }

    /// Corrected leave-one-out error of the current least-squares fit, not
    /// yet divided by the response variance.
    ///
    /// `None` when the estimate is undefined: as many columns as samples,
    /// or a sample with unit leverage.
    pub(crate) fn corrected_loo(&self) -> Option<f64> {
        let n = self.samples();
        let k = self.len();
        if k == 0 || k >= n {
            return None;
        }
        let mut sum = 0f64;
        for (&e, &h) in self.residual.iter().zip(self.leverage.iter()) {
            let margin = 1. - h;
            if !(margin > LEVERAGE_MARGIN) {
                return None;
            }
            let loo = e / margin;
            sum += loo * loo;
        }
        let n_f = n as f64;
        let correction = n_f / (n_f - k as f64) * (1. + self.r_inv_norm_sq);
        Some(sum / n_f * correction)
    }

    /// Least-squares coefficients of the first `k` columns, by back substitution.
    pub(crate) fn coefficients(&self, k: usize) -> Vec<f64> {
        let mut c = self.projections[..k].to_vec();
        for col in (0..k).rev() {
            c[col] /= self.r[col][col];
            let value = c[col];
            for (row, ci) in c.iter_mut().enumerate().take(col) {
                *ci -= self.r[col][row] * value;
            }
        }
        c
    }

    /// Residual sum of squares of the fit on the first `k` columns.
    pub(crate) fn prefix_residual_sum_squares(&self, k: usize) -> f64 {
        let tail: f64 = self.projections[k..].iter().map(|b| b * b).sum();
        self.residual_sum_squares() + tail
    }
}

/// Outcome of a projection: selected basis terms and their coefficients.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Selection {
    pub(crate) terms: Vec<usize>,
    pub(crate) coefficients: Vec<f64>,
    pub(crate) residual_sum_squares: f64,
    /// Corrected leave-one-out error relative to the response variance.
    /// Infinite when undefined for the chosen terms.
    pub(crate) loo_error: f64,
}

fn response_variance(y: &[f64]) -> f64 {
    if y.is_empty() {
        return 0.;
    }
    centered_sum_squares(y) / y.len() as f64
}

fn relative(error: f64, variance: f64) -> f64 {
    if variance > 0. {
        error / variance
    } else {
        error
    }
}

fn check_shapes(psi: &Mat<f64>, y: &[f64]) -> Result<()> {
    if psi.nrows() != y.len() {
        return Err(ChaosError::DimensionMismatch {
            stage: "projection",
            expected: psi.nrows(),
            found: y.len(),
        });
    }
    if psi.ncols() == 0 {
        return Err(ChaosError::InvalidArgument {
            stage: "projection",
            reason: "the basis is empty".to_string(),
        });
    }
    Ok(())
}

fn singular(psi: &Mat<f64>, reason: impl Into<String>) -> ChaosError {
    ChaosError::SingularDesign {
        samples: psi.nrows(),
        basis_size: psi.ncols(),
        reason: reason.into(),
    }
}

/// Ordinary least squares on every column of `psi`.
pub(crate) fn least_squares(psi: &Mat<f64>, y: &[f64], tolerance: f64) -> Result<Selection> {
    check_shapes(psi, y)?;
    if psi.ncols() >= psi.nrows() {
        return Err(singular(
            psi,
            "least squares needs more samples than basis terms",
        ));
    }
    let mut qr = IncrementalQr::new(y);
    for term in 0..psi.ncols() {
        if !qr.push(term, psi.col_as_slice(term), tolerance) {
            return Err(singular(
                psi,
                format!("basis term {term} is linearly dependent on the previous terms"),
            ));
        }
    }
    let variance = response_variance(y);
    let loo_error = qr
        .corrected_loo()
        .map_or(f64::INFINITY, |e| relative(e, variance));
    Ok(Selection {
        coefficients: qr.coefficients(qr.len()),
        terms: qr.terms().to_vec(),
        residual_sum_squares: qr.residual_sum_squares(),
        loo_error,
    })
}

/// Least-angle regression path over the non-constant columns, keeping the
/// prefix of the path with the smallest corrected leave-one-out error.
///
/// LARS runs on centred, unit-norm columns; the constant term is kept in
/// the factorisation as column 0 so that the centred Gram matrix of the
/// active set is `R̃ᵀ R̃`, with `R̃` the factor `R` stripped of its first row
/// and column. Every prefix is refitted by ordinary least squares.
pub(crate) fn lars(psi: &Mat<f64>, y: &[f64], settings: &SelectionSettings) -> Result<Selection> {
    check_shapes(psi, y)?;
    settings.validate()?;
    let n = psi.nrows();
    let p = psi.ncols();
    let tolerance = settings.dependence_tolerance;
    let variance = response_variance(y);

    let mut qr = IncrementalQr::new(y);
    if !qr.push(0, psi.col_as_slice(0), tolerance) {
        return Err(singular(psi, "the constant term vanishes on the sample"));
    }

    // Centred column norms. Columns that are constant on the sample can never enter.
    let scales: Vec<f64> = (0..p)
        .into_par_iter()
        .map(|j| centered_sum_squares(psi.col_as_slice(j)).sqrt())
        .collect();
    let mut eligible: Vec<bool> = scales
        .iter()
        .enumerate()
        .map(|(j, &s)| {
            j > 0 && s > tolerance * norm(psi.col_as_slice(j)).max(f64::MIN_POSITIVE)
        })
        .collect();
    let mut active_scales: Vec<f64> = vec![];
    let mut signs: Vec<f64> = vec![];

    // LARS residual, centred.
    let mean = y.iter().sum::<f64>() / n as f64;
    let mut residual: Vec<f64> = y.iter().map(|v| v - mean).collect();

    let exact_fit = 1e-20 * centered_sum_squares(y);
    let mut best: Option<(usize, f64)> = qr
        .corrected_loo()
        .map(|e| (1, relative(e, variance)));
    // Correlations of eligible columns with the LARS residual, updated along the path.
    let mut correlation = correlations(psi, &residual, &scales, &eligible);
    let initial_correlation = correlation.iter().fold(0f64, |acc, c| acc.max(c.abs()));

    for step in 0..settings.max_iterations {
        if qr.len() + 1 >= n {
            debug!(step, "selection stopped: active set reached the sample size");
            break;
        }
        let Some((entering, corr)) = (0..p)
            .filter(|&j| eligible[j])
            .map(|j| (j, correlation[j]))
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()).then(b.0.cmp(&a.0)))
        else {
            debug!(step, "selection stopped: every term is active");
            break;
        };
        if !(corr.abs() > 1e-12 * initial_correlation.max(f64::MIN_POSITIVE)) {
            debug!(step, "selection stopped: correlations vanished");
            break;
        }
        eligible[entering] = false;
        if !qr.push(entering, psi.col_as_slice(entering), tolerance) {
            warn!(term = entering, "skipping linearly dependent basis term");
            continue;
        }
        active_scales.push(scales[entering]);
        signs.push(corr.signum());

        let error = qr.corrected_loo().map(|e| relative(e, variance));
        debug!(step, active = qr.len(), loo = ?error, "term entered");
        if let Some(e) = error {
            match best {
                Some((_, b)) if !(e < b) => {
                    if e > settings.max_error_factor * b {
                        debug!(step, "selection stopped: error grows");
                        break;
                    }
                }
                _ => best = Some((qr.len(), e)),
            }
        }
        if qr.residual_sum_squares() <= exact_fit {
            debug!(step, "selection stopped: exact fit");
            break;
        }

        // Equiangular direction of the active set.
        let (direction, equiangular) = equiangular_direction(&qr, &active_scales, &signs);
        let current = active_correlation(&qr, &residual, &active_scales);
        let along = correlations(psi, &direction, &scales, &eligible);
        let full_step = current / equiangular;
        let gamma = (0..p)
            .filter(|&j| eligible[j])
            .flat_map(|j| {
                let (c, a) = (correlation[j], along[j]);
                [
                    (current - c) / (equiangular - a),
                    (current + c) / (equiangular + a),
                ]
            })
            .filter(|g| *g > 1e-15 && g.is_finite())
            .fold(full_step, f64::min);
        axpy(&direction, &mut residual, -gamma);
        correlation
            .iter_mut()
            .zip(along.iter())
            .for_each(|(c, a)| *c -= gamma * a);
    }

    let Some((size, loo_error)) = best else {
        return Err(singular(
            psi,
            "no active set admits a leave-one-out estimate",
        ));
    };
    Ok(Selection {
        terms: qr.terms()[..size].to_vec(),
        coefficients: qr.coefficients(size),
        residual_sum_squares: qr.prefix_residual_sum_squares(size),
        loo_error,
    })
}

/// `ψ_jᵀ v / s_j` for every column, zero for columns that may not enter.
///
/// With `v` centred this is the correlation of `v` with the centred,
/// normalised column `j`.
fn correlations(psi: &Mat<f64>, v: &[f64], scales: &[f64], eligible: &[bool]) -> Vec<f64> {
    (0..psi.ncols())
        .into_par_iter()
        .map(|j| {
            if eligible[j] {
                vector_dot(psi.col_as_slice(j), v) / scales[j]
            } else {
                0.
            }
        })
        .collect()
}

/// Common absolute correlation of the active columns with the residual.
fn active_correlation(qr: &IncrementalQr, residual: &[f64], scales: &[f64]) -> f64 {
    // Centred active column k is Σ_{i>=1} R[i, k] q_i.
    let q_dot: Vec<f64> = (1..qr.len())
        .map(|i| vector_dot(qr.q(i), residual))
        .collect();
    (1..qr.len())
        .map(|k| {
            let value: f64 = (1..=k).map(|i| qr.r(i, k) * q_dot[i - 1]).sum();
            (value / scales[k - 1]).abs()
        })
        .fold(0f64, f64::max)
}

/// Unit equiangular vector `u` and the common correlation `A` of the active
/// columns with it.
///
/// With `D` the diagonal of centred column norms and `s` the signs,
/// `u = A Σ z_i q_i` where `R̃ᵀ z = D s` and `A = 1 / ‖z‖`.
fn equiangular_direction(qr: &IncrementalQr, scales: &[f64], signs: &[f64]) -> (Vec<f64>, f64) {
    let k = qr.len() - 1;
    let mut z = vec![0f64; k];
    for i in 0..k {
        let mut value = scales[i] * signs[i];
        for (l, zl) in z.iter().enumerate().take(i) {
            value -= qr.r(l + 1, i + 1) * zl;
        }
        z[i] = value / qr.r(i + 1, i + 1);
    }
    let equiangular = 1. / norm(&z);
    let mut direction = vec![0f64; qr.samples()];
    for (i, &zi) in z.iter().enumerate() {
        axpy(qr.q(i + 1), &mut direction, zi * equiangular);
    }
    (direction, equiangular)
}
