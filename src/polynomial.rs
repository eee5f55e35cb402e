//! Univariate orthonormal polynomial families.
//!
//! Every family is stored as the three-term recurrence of its orthonormal
//! polynomials in a standardized variable `z`:
//!
//! `sqrt(b[n+1]) p[n+1](z) = (z - a[n]) p[n](z) - sqrt(b[n]) p[n-1](z)`
//!
//! with `p[-1] = 0` and `p[0] = 1`. Classical families have these
//! coefficients in closed form. Laws without a classical family are handled
//! by orthogonalizing `z * p[n]` against all previous polynomials on a
//! discretized version of the measure.

use itertools::izip;

use crate::distribution::{Family, Marginal};
use crate::error::{ChaosError, Result};
use crate::math::axpy;

/// Recurrence coefficients of an orthonormal family up to a fixed degree.
#[derive(Debug, Clone, PartialEq)]
pub struct Recurrence {
    alpha: Vec<f64>,
    /// `sqrt_beta[n]` for `n` in `0..=degree`. The first entry is unused.
    sqrt_beta: Vec<f64>,
}

impl Recurrence {
    pub fn degree(&self) -> usize {
        self.alpha.len()
    }

    pub fn alpha(&self, n: usize) -> f64 {
        self.alpha[n]
    }

    pub fn beta(&self, n: usize) -> f64 {
        self.sqrt_beta[n] * self.sqrt_beta[n]
    }

    /// Write `p[0](z), ..., p[degree](z)` into `out`.
    pub fn evaluate_into(&self, z: f64, out: &mut [f64]) {
        assert!(out.len() == self.degree() + 1);
        out[0] = 1.;
        if self.degree() == 0 {
            return;
        }
        out[1] = (z - self.alpha[0]) / self.sqrt_beta[1];
        for n in 1..self.degree() {
            out[n + 1] = ((z - self.alpha[n]) * out[n] - self.sqrt_beta[n] * out[n - 1])
                / self.sqrt_beta[n + 1];
        }
    }

    pub fn evaluate(&self, n: usize, z: f64) -> f64 {
        let mut values = vec![0f64; self.degree() + 1];
        self.evaluate_into(z, &mut values);
        values[n]
    }
}

/// Families with closed-form recurrence coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassicalFamily {
    /// Standard normal measure.
    Hermite,
    /// Uniform measure on `[-1, 1]`.
    Legendre,
    /// Measure proportional to `z^(k-1) exp(-z)` on `[0, inf)`.
    Laguerre { k: f64 },
    /// Measure proportional to `(1 - z)^alpha (1 + z)^beta` on `[-1, 1]`.
    Jacobi { alpha: f64, beta: f64 },
}

impl ClassicalFamily {
    /// Monic recurrence coefficients `(a[n], b[n])` for `n >= 0`.
    fn coefficients(&self, n: usize) -> (f64, f64) {
        let nf = n as f64;
        match *self {
            ClassicalFamily::Hermite => (0., nf),
            ClassicalFamily::Legendre => (0., nf * nf / (4. * nf * nf - 1.)),
            ClassicalFamily::Laguerre { k } => (2. * nf + k, nf * (nf + k - 1.)),
            ClassicalFamily::Jacobi { alpha, beta } => {
                let s = alpha + beta;
                let a = if n == 0 {
                    (beta - alpha) / (s + 2.)
                } else {
                    (beta * beta - alpha * alpha) / ((2. * nf + s) * (2. * nf + s + 2.))
                };
                let b = match n {
                    0 => 1.,
                    1 => 4. * (1. + alpha) * (1. + beta) / ((2. + s) * (2. + s) * (3. + s)),
                    _ => {
                        let t = 2. * nf + s;
                        4. * nf * (nf + alpha) * (nf + beta) * (nf + s)
                            / (t * t * (t + 1.) * (t - 1.))
                    }
                };
                (a, b)
            }
        }
    }

    pub fn recurrence(&self, degree: usize) -> Recurrence {
        let alpha = (0..degree).map(|n| self.coefficients(n).0).collect();
        let sqrt_beta = (0..=degree)
            .map(|n| if n == 0 { 1. } else { self.coefficients(n).1.sqrt() })
            .collect();
        Recurrence { alpha, sqrt_beta }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ClassicalFamily::Hermite => "Hermite",
            ClassicalFamily::Legendre => "Legendre",
            ClassicalFamily::Laguerre { .. } => "Laguerre",
            ClassicalFamily::Jacobi { .. } => "Jacobi",
        }
    }
}

/// Probability measure supported on finitely many nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteMeasure {
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

impl DiscreteMeasure {
    /// Weights are normalized to sum to one.
    pub fn new(nodes: Vec<f64>, weights: Vec<f64>) -> Result<Self> {
        if nodes.len() != weights.len() {
            return Err(ChaosError::DimensionMismatch {
                stage: "discrete measure",
                expected: nodes.len(),
                found: weights.len(),
            });
        }
        if weights.iter().any(|w| !(w.is_finite() && *w >= 0.))
            || nodes.iter().any(|z| !z.is_finite())
        {
            return Err(ChaosError::InvalidArgument {
                stage: "discrete measure",
                reason: "nodes must be finite and weights finite and non-negative".to_string(),
            });
        }
        let total: f64 = weights.iter().sum();
        if !(total > 0.) {
            return Err(ChaosError::InvalidArgument {
                stage: "discrete measure",
                reason: "weights sum to zero".to_string(),
            });
        }
        let weights = weights.into_iter().map(|w| w / total).collect();
        Ok(Self { nodes, weights })
    }

    /// Trapezoidal discretization of a density on `[lower, upper]`.
    pub fn from_density(
        lower: f64,
        upper: f64,
        points: usize,
        density: impl Fn(f64) -> f64,
    ) -> Result<Self> {
        if points < 2 || !(lower < upper) {
            return Err(ChaosError::InvalidArgument {
                stage: "discrete measure",
                reason: format!("cannot discretize [{lower}, {upper}] with {points} points"),
            });
        }
        let h = (upper - lower) / (points - 1) as f64;
        let nodes: Vec<f64> = (0..points).map(|i| lower + h * i as f64).collect();
        let weights = nodes
            .iter()
            .enumerate()
            .map(|(i, &z)| {
                let end = if i == 0 || i == points - 1 { 0.5 } else { 1. };
                end * h * density(z)
            })
            .collect();
        Self::new(nodes, weights)
    }

    /// Law of `(X - E[X]) / sd(X)` for a log-normal `X` with log-scale `sigma_log`.
    ///
    /// The grid lives in the underlying standard normal variable and reaches
    /// far enough into the right tail to integrate polynomials of degree
    /// `2 * (degree + 1)` accurately.
    pub fn standardized_log_normal(sigma_log: f64, degree: usize) -> Result<Self> {
        let reach = (degree + 1) as f64 * sigma_log;
        let upper = (12. + 2. * reach).min(600. / reach.max(1e-3));
        let lower = -12.;
        let h = 0.01;
        let points = ((upper - lower) / h).ceil() as usize + 1;
        let scale = (sigma_log * sigma_log).exp_m1().sqrt();
        let half_var = 0.5 * sigma_log * sigma_log;

        let grid = Self::from_density(lower, upper, points, |t| (-0.5 * t * t).exp())?;
        let nodes = grid
            .nodes
            .iter()
            .map(|&t| (sigma_log * t - half_var).exp_m1() / scale)
            .collect();
        Self::new(nodes, grid.weights)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn inner(&self, a: &[f64], b: &[f64]) -> f64 {
        izip!(self.weights.iter(), a, b)
            .map(|(w, x, y)| w * x * y)
            .sum()
    }

    /// Orthonormalize `1, z, z^2, ...` by Gram-Schmidt on the Krylov sequence
    /// `z * p[n]`, with one re-orthogonalization pass.
    pub fn orthonormalize(&self, degree: usize) -> Result<Recurrence> {
        let mut polys: Vec<Vec<f64>> = Vec::with_capacity(degree + 1);
        polys.push(vec![1f64; self.len()]);
        let mut alpha = Vec::with_capacity(degree);
        let mut sqrt_beta = Vec::with_capacity(degree + 1);
        sqrt_beta.push(1.);

        for n in 0..degree {
            let mut next: Vec<f64> = self
                .nodes
                .iter()
                .zip(polys[n].iter())
                .map(|(z, p)| z * p)
                .collect();
            alpha.push(self.inner(&next, &polys[n]));

            for _ in 0..2 {
                for p in polys.iter() {
                    let c = self.inner(&next, p);
                    axpy(p, &mut next, -c);
                }
            }

            let norm = self.inner(&next, &next).sqrt();
            if !(norm > 1e-12) || !norm.is_finite() {
                return Err(ChaosError::InvalidArgument {
                    stage: "polynomial family",
                    reason: format!(
                        "discrete measure with {} nodes cannot carry polynomials of degree {}",
                        self.len(),
                        n + 1
                    ),
                });
            }
            next.iter_mut().for_each(|v| *v /= norm);
            sqrt_beta.push(norm);
            polys.push(next);
        }

        Ok(Recurrence { alpha, sqrt_beta })
    }
}

/// Source of the recurrence coefficients of a univariate family.
#[derive(Debug, Clone, PartialEq)]
pub enum BasisFamily {
    Classical(ClassicalFamily),
    NumericallyOrthogonalized(DiscreteMeasure),
}

impl BasisFamily {
    pub fn recurrence(&self, degree: usize) -> Result<Recurrence> {
        match self {
            BasisFamily::Classical(family) => Ok(family.recurrence(degree)),
            BasisFamily::NumericallyOrthogonalized(measure) => measure.orthonormalize(degree),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BasisFamily::Classical(family) => family.label(),
            BasisFamily::NumericallyOrthogonalized(_) => "Gram-Schmidt",
        }
    }
}

/// Orthonormal polynomials of one input, including the map to the
/// standardized variable `z = (x - shift) / scale`.
#[derive(Debug, Clone)]
pub struct UnivariatePolynomials {
    label: &'static str,
    shift: f64,
    scale: f64,
    recurrence: Recurrence,
}

impl UnivariatePolynomials {
    /// Pick the family matching the law of `marginal`.
    pub fn for_marginal(marginal: &Marginal, degree: usize) -> Result<Self> {
        let (family, shift, scale) = match marginal.family() {
            Family::Uniform { lower, upper } => (
                BasisFamily::Classical(ClassicalFamily::Legendre),
                0.5 * (lower + upper),
                0.5 * (upper - lower),
            ),
            Family::Normal { mean, std_dev } => {
                (BasisFamily::Classical(ClassicalFamily::Hermite), mean, std_dev)
            }
            Family::Beta {
                alpha,
                beta,
                lower,
                upper,
            } => (
                BasisFamily::Classical(ClassicalFamily::Jacobi {
                    alpha: beta - 1.,
                    beta: alpha - 1.,
                }),
                0.5 * (lower + upper),
                0.5 * (upper - lower),
            ),
            Family::Gamma { k, lambda, gamma } => (
                BasisFamily::Classical(ClassicalFamily::Laguerre { k }),
                gamma,
                lambda.recip(),
            ),
            Family::Exponential { lambda, gamma } => (
                BasisFamily::Classical(ClassicalFamily::Laguerre { k: 1. }),
                gamma,
                lambda.recip(),
            ),
            Family::LogNormal { sigma_log, .. } => (
                BasisFamily::NumericallyOrthogonalized(DiscreteMeasure::standardized_log_normal(
                    sigma_log, degree,
                )?),
                marginal.mean(),
                marginal.std_dev(),
            ),
        };
        Ok(Self {
            label: family.label(),
            shift,
            scale,
            recurrence: family.recurrence(degree)?,
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn degree(&self) -> usize {
        self.recurrence.degree()
    }

    pub fn recurrence(&self) -> &Recurrence {
        &self.recurrence
    }

    pub fn standardize(&self, x: f64) -> f64 {
        (x - self.shift) / self.scale
    }

    /// Values of all polynomials up to the family degree at input `x`.
    pub fn evaluate_into(&self, x: f64, out: &mut [f64]) {
        self.recurrence.evaluate_into(self.standardize(x), out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn gram(measure: &DiscreteMeasure, recurrence: &Recurrence) -> Vec<Vec<f64>> {
        let d = recurrence.degree();
        let values: Vec<Vec<f64>> = measure
            .nodes
            .iter()
            .map(|&z| {
                let mut out = vec![0.; d + 1];
                recurrence.evaluate_into(z, &mut out);
                out
            })
            .collect();
        (0..=d)
            .map(|i| {
                (0..=d)
                    .map(|j| {
                        measure
                            .weights
                            .iter()
                            .zip(values.iter())
                            .map(|(w, v)| w * v[i] * v[j])
                            .sum()
                    })
                    .collect()
            })
            .collect()
    }

    fn assert_identity(matrix: &[Vec<f64>], tol: f64) {
        for (i, row) in matrix.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                let expected = if i == j { 1. } else { 0. };
                assert_abs_diff_eq!(value, expected, epsilon = tol);
            }
        }
    }

    #[test]
    fn hermite_values() {
        let rec = ClassicalFamily::Hermite.recurrence(3);
        let z = 0.7f64;
        assert_abs_diff_eq!(rec.evaluate(1, z), z, epsilon = 1e-14);
        assert_abs_diff_eq!(rec.evaluate(2, z), (z * z - 1.) / 2f64.sqrt(), epsilon = 1e-14);
        assert_abs_diff_eq!(
            rec.evaluate(3, z),
            (z * z * z - 3. * z) / 6f64.sqrt(),
            epsilon = 1e-14
        );
    }

    #[test]
    fn legendre_values() {
        let rec = ClassicalFamily::Legendre.recurrence(2);
        let z = -0.3f64;
        assert_abs_diff_eq!(rec.evaluate(1, z), 3f64.sqrt() * z, epsilon = 1e-14);
        assert_abs_diff_eq!(
            rec.evaluate(2, z),
            5f64.sqrt() * 0.5 * (3. * z * z - 1.),
            epsilon = 1e-14
        );
    }

    #[test]
    fn jacobi_reduces_to_legendre() {
        let jacobi = ClassicalFamily::Jacobi {
            alpha: 0.,
            beta: 0.,
        }
        .recurrence(6);
        let legendre = ClassicalFamily::Legendre.recurrence(6);
        for n in 0..6 {
            assert_abs_diff_eq!(jacobi.alpha(n), legendre.alpha(n), epsilon = 1e-14);
            assert_abs_diff_eq!(jacobi.beta(n + 1), legendre.beta(n + 1), epsilon = 1e-14);
        }
    }

    #[test]
    fn gram_schmidt_recovers_hermite() {
        let measure =
            DiscreteMeasure::from_density(-15., 15., 3001, |z| (-0.5 * z * z).exp()).unwrap();
        let numeric = measure.orthonormalize(8).unwrap();
        let exact = ClassicalFamily::Hermite.recurrence(8);
        for n in 0..8 {
            assert_abs_diff_eq!(numeric.alpha(n), exact.alpha(n), epsilon = 1e-8);
            assert_abs_diff_eq!(numeric.beta(n + 1), exact.beta(n + 1), epsilon = 1e-7);
        }
    }

    #[test]
    fn jacobi_is_orthonormal() {
        let (a, b) = (1., 2.);
        let measure = DiscreteMeasure::from_density(-1., 1., 40001, |z| {
            (1. - z).powf(a) * (1. + z).powf(b)
        })
        .unwrap();
        let rec = ClassicalFamily::Jacobi { alpha: a, beta: b }.recurrence(5);
        assert_identity(&gram(&measure, &rec), 1e-6);
    }

    #[test]
    fn laguerre_is_orthonormal() {
        let k = 2.5;
        let measure =
            DiscreteMeasure::from_density(0., 80., 80001, |z| z.powf(k - 1.) * (-z).exp())
                .unwrap();
        let rec = ClassicalFamily::Laguerre { k }.recurrence(4);
        assert_identity(&gram(&measure, &rec), 1e-5);
    }

    #[test]
    fn log_normal_family_is_orthonormal() {
        let marginal = Marginal::log_normal("r", 7.71, 1.0056, 0.).unwrap();
        let polys = UnivariatePolynomials::for_marginal(&marginal, 6).unwrap();
        assert_eq!(polys.label(), "Gram-Schmidt");

        // Check on a finer grid than the one used for construction.
        let sigma: f64 = 1.0056;
        let scale = (sigma * sigma).exp_m1().sqrt();
        let fine =
            DiscreteMeasure::from_density(-12., 30., 16801, |t| (-0.5 * t * t).exp()).unwrap();
        let nodes = fine
            .nodes
            .iter()
            .map(|&t| (sigma * t - 0.5 * sigma * sigma).exp_m1() / scale)
            .collect();
        let measure = DiscreteMeasure::new(nodes, fine.weights.clone()).unwrap();
        assert_identity(&gram(&measure, polys.recurrence()), 1e-6);

        // The first polynomial is the standardized variable itself.
        let x = 3000.;
        assert_abs_diff_eq!(
            polys.recurrence().evaluate(1, polys.standardize(x)),
            (x - marginal.mean()) / marginal.std_dev(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn degenerate_measure_is_rejected() {
        let measure = DiscreteMeasure::new(vec![0., 1.], vec![0.5, 0.5]).unwrap();
        assert!(measure.orthonormalize(1).is_ok());
        assert!(measure.orthonormalize(2).is_err());
    }
}
