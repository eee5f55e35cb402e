use rayon::prelude::*;
use tracing::warn;

use crate::basis::OrthogonalBasis;
use crate::enumerate::MultiIndex;
use crate::error::{ChaosError, Result};
use crate::math::centered_sum_squares;
use crate::sample::Sample;

/// A fitted chaos expansion: a sparse linear combination of basis terms.
#[derive(Debug, Clone)]
pub struct Metamodel {
    basis: OrthogonalBasis,
    /// Sorted, distinct positions of the active terms in the basis.
    terms: Vec<usize>,
    coefficients: Vec<f64>,
}

impl Metamodel {
    /// Assemble a metamodel from basis term positions and their coefficients.
    pub fn new(basis: OrthogonalBasis, terms: Vec<usize>, coefficients: Vec<f64>) -> Result<Self> {
        if terms.len() != coefficients.len() {
            return Err(ChaosError::DimensionMismatch {
                stage: "metamodel",
                expected: terms.len(),
                found: coefficients.len(),
            });
        }
        if terms.len() > basis.size() {
            return Err(ChaosError::InvalidArgument {
                stage: "metamodel",
                reason: format!(
                    "{} coefficients for a basis of {} terms",
                    terms.len(),
                    basis.size()
                ),
            });
        }
        let mut pairs: Vec<(usize, f64)> = terms.into_iter().zip(coefficients).collect();
        pairs.sort_unstable_by_key(|&(term, _)| term);
        if let Some(&(term, _)) = pairs.iter().find(|&&(term, _)| term >= basis.size()) {
            return Err(ChaosError::InvalidArgument {
                stage: "metamodel",
                reason: format!("term {term} is outside a basis of {} terms", basis.size()),
            });
        }
        if pairs.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(ChaosError::InvalidArgument {
                stage: "metamodel",
                reason: "a basis term appears twice".to_string(),
            });
        }
        let (terms, coefficients) = pairs.into_iter().unzip();
        Ok(Self {
            basis,
            terms,
            coefficients,
        })
    }

    pub fn basis(&self) -> &OrthogonalBasis {
        &self.basis
    }

    pub fn dimension(&self) -> usize {
        self.basis.dimension()
    }

    /// Positions of the active terms in the basis, ascending.
    pub fn terms(&self) -> &[usize] {
        &self.terms
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Active multi-indices paired with their coefficients.
    pub fn indexed_coefficients(&self) -> impl Iterator<Item = (&MultiIndex, f64)> + '_ {
        self.terms
            .iter()
            .zip(self.coefficients.iter())
            .map(|(&term, &c)| (self.basis.multi_index(term), c))
    }

    /// Coefficient of `index`, zero for inactive terms.
    pub fn coefficient_of(&self, index: &MultiIndex) -> Result<f64> {
        let position = self.basis.enumeration().position(index)?;
        Ok(self
            .terms
            .binary_search(&position)
            .map_or(0., |k| self.coefficients[k]))
    }

    pub fn evaluate(&self, x: &[f64]) -> Result<f64> {
        if x.len() != self.dimension() {
            return Err(ChaosError::DimensionMismatch {
                stage: "metamodel evaluation",
                expected: self.dimension(),
                found: x.len(),
            });
        }
        Ok(self.evaluate_unchecked(x))
    }

    fn evaluate_unchecked(&self, x: &[f64]) -> f64 {
        let table = self.basis.univariate_table(x);
        self.terms
            .iter()
            .zip(self.coefficients.iter())
            .map(|(&term, &c)| c * self.basis.term_from_table(term, &table))
            .sum()
    }

    /// Evaluate every row of `sample`, in row order.
    pub fn evaluate_sample(&self, sample: &Sample) -> Result<Vec<f64>> {
        if sample.dimension() != self.dimension() {
            return Err(ChaosError::DimensionMismatch {
                stage: "metamodel evaluation",
                expected: self.dimension(),
                found: sample.dimension(),
            });
        }
        Ok((0..sample.len())
            .into_par_iter()
            .map(|i| self.evaluate_unchecked(sample.row(i)))
            .collect())
    }

    /// Mean of the output under the input distribution.
    pub fn mean(&self) -> f64 {
        self.indexed_coefficients()
            .find(|(index, _)| index.is_constant())
            .map_or(0., |(_, c)| c)
    }

    /// Variance of the output under the input distribution.
    pub fn variance(&self) -> f64 {
        self.indexed_coefficients()
            .filter(|(index, _)| !index.is_constant())
            .map(|(_, c)| c * c)
            .sum()
    }
}

/// Out-of-sample comparison of model and metamodel outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    observed: Vec<f64>,
    predicted: Vec<f64>,
    q2: f64,
}

impl Validation {
    /// Score predictions against observations with the predictivity
    /// coefficient `Q² = 1 - SSR / SST`.
    ///
    /// `Q²` is reported as computed, including negative values.
    pub fn new(observed: Vec<f64>, predicted: Vec<f64>) -> Result<Self> {
        if observed.len() != predicted.len() {
            return Err(ChaosError::DimensionMismatch {
                stage: "validation",
                expected: observed.len(),
                found: predicted.len(),
            });
        }
        if observed.len() < 2 {
            return Err(ChaosError::DegenerateSample {
                stage: "validation",
                reason: format!("{} validation points", observed.len()),
            });
        }
        if let Some(row) = observed
            .iter()
            .chain(predicted.iter())
            .position(|v| !v.is_finite())
        {
            return Err(ChaosError::InvalidArgument {
                stage: "validation",
                reason: format!("validation point {} is not finite", row % observed.len()),
            });
        }
        let total = centered_sum_squares(&observed);
        if !(total > 0.) {
            return Err(ChaosError::DegenerateSample {
                stage: "validation",
                reason: "validation outputs have zero variance".to_string(),
            });
        }
        let residual: f64 = observed
            .iter()
            .zip(predicted.iter())
            .map(|(y, p)| (y - p) * (y - p))
            .sum();
        let q2 = 1. - residual / total;
        if !(q2 > 0.) {
            warn!(q2, "metamodel predicts no better than the validation mean");
        }
        Ok(Self {
            observed,
            predicted,
            q2,
        })
    }

    /// Evaluate `metamodel` on `inputs` and score it against `outputs`.
    pub fn of(metamodel: &Metamodel, inputs: &Sample, outputs: &[f64]) -> Result<Self> {
        let predicted = metamodel.evaluate_sample(inputs)?;
        Self::new(outputs.to_vec(), predicted)
    }

    pub fn q2(&self) -> f64 {
        self.q2
    }

    pub fn observed(&self) -> &[f64] {
        &self.observed
    }

    pub fn predicted(&self) -> &[f64] {
        &self.predicted
    }

    /// Observed minus predicted, per validation point.
    pub fn residuals(&self) -> Vec<f64> {
        self.observed
            .iter()
            .zip(self.predicted.iter())
            .map(|(y, p)| y - p)
            .collect()
    }

    pub fn mean_squared_error(&self) -> f64 {
        self.residuals().iter().map(|r| r * r).sum::<f64>() / self.observed.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::{JointDistribution, Marginal};
    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;

    fn basis() -> OrthogonalBasis {
        let joint = JointDistribution::new(vec![
            Marginal::uniform("a", -1., 1.).unwrap(),
            Marginal::normal("b", 0., 1.).unwrap(),
        ])
        .unwrap();
        OrthogonalBasis::new(&joint, 2).unwrap()
    }

    #[test]
    fn moments_from_coefficients() {
        let model = Metamodel::new(basis(), vec![4, 0, 2], vec![0.5, 3., -2.]).unwrap();
        assert_eq!(model.terms(), &[0, 2, 4]);
        assert_eq!(model.coefficients(), &[3., -2., 0.5]);
        assert_abs_diff_eq!(model.mean(), 3.);
        assert_abs_diff_eq!(model.variance(), 4.25);
        assert_abs_diff_eq!(
            model.coefficient_of(&MultiIndex::new(vec![1, 1])).unwrap(),
            0.5
        );
        assert_abs_diff_eq!(
            model.coefficient_of(&MultiIndex::new(vec![2, 0])).unwrap(),
            0.
        );
    }

    #[test]
    fn evaluation_is_the_weighted_sum() {
        let model = Metamodel::new(basis(), vec![0, 1, 2], vec![1., 2., 3.]).unwrap();
        // Legendre: √3 a, Hermite: b
        let x = [0.5, -1.];
        let expected = 1. + 2. * 3f64.sqrt() * 0.5 + 3. * -1.;
        assert_abs_diff_eq!(model.evaluate(&x).unwrap(), expected, epsilon = 1e-14);
        let sample = Sample::from_rows(
            vec!["a".to_string(), "b".to_string()],
            &[[0.5, -1.], [0., 0.]],
        )
        .unwrap();
        let values = model.evaluate_sample(&sample).unwrap();
        assert_abs_diff_eq!(values[0], expected, epsilon = 1e-14);
        assert_abs_diff_eq!(values[1], 1., epsilon = 1e-14);
        assert!(model.evaluate(&[1.]).is_err());
    }

    #[test]
    fn rejects_malformed_coefficients() {
        assert!(Metamodel::new(basis(), vec![0, 1], vec![1.]).is_err());
        assert!(Metamodel::new(basis(), vec![0, 0], vec![1., 2.]).is_err());
        assert!(Metamodel::new(basis(), vec![6], vec![1.]).is_err());
    }

    #[test]
    fn q2_is_not_clipped() {
        let perfect = Validation::new(vec![1., 2., 3.], vec![1., 2., 3.]).unwrap();
        assert_abs_diff_eq!(perfect.q2(), 1.);
        assert_abs_diff_eq!(perfect.mean_squared_error(), 0.);

        let bad = Validation::new(vec![1., 2., 3.], vec![3., 2., 1.]).unwrap();
        assert_abs_diff_eq!(bad.q2(), -3.);
        assert_eq!(bad.residuals(), vec![-2., 0., 2.]);
    }

    #[test]
    fn degenerate_validation() {
        assert!(matches!(
            Validation::new(vec![1.], vec![1.]),
            Err(ChaosError::DegenerateSample { .. })
        ));
        assert!(matches!(
            Validation::new(vec![2., 2.], vec![1., 2.]),
            Err(ChaosError::DegenerateSample { .. })
        ));
        assert!(matches!(
            Validation::new(vec![1., 2.], vec![1.]),
            Err(ChaosError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn non_finite_validation_values() {
        assert!(matches!(
            Validation::new(vec![1., f64::NAN, 3.], vec![1., 2., 3.]),
            Err(ChaosError::InvalidArgument { .. })
        ));
        assert!(matches!(
            Validation::new(vec![1., 2., 3.], vec![1., f64::INFINITY, 3.]),
            Err(ChaosError::InvalidArgument { .. })
        ));
    }
}
