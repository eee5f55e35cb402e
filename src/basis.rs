use faer::Mat;
use rayon::prelude::*;

use crate::distribution::JointDistribution;
use crate::enumerate::{total_degree_indices, LinearEnumeration, MultiIndex};
use crate::error::{ChaosError, Result};
use crate::polynomial::UnivariatePolynomials;
use crate::sample::Sample;

/// Tensor-product orthonormal basis truncated at a total degree.
///
/// Term `i` is the product over inputs `k` of the univariate polynomial of
/// degree `multi_index(i)[k]`, orthonormal under the law of input `k`.
#[derive(Debug, Clone)]
pub struct OrthogonalBasis {
    names: Vec<String>,
    polynomials: Vec<UnivariatePolynomials>,
    enumeration: LinearEnumeration,
    indices: Vec<MultiIndex>,
    /// Offsets into a univariate value table of the non-constant factors of
    /// each term.
    factors: Vec<Vec<usize>>,
    total_degree: usize,
}

impl OrthogonalBasis {
    pub fn new(distribution: &JointDistribution, total_degree: usize) -> Result<Self> {
        if total_degree == 0 {
            return Err(ChaosError::InvalidArgument {
                stage: "basis",
                reason: "total degree must be at least 1".to_string(),
            });
        }
        let dimension = distribution.dimension();
        let polynomials = distribution
            .marginals()
            .iter()
            .map(|marginal| UnivariatePolynomials::for_marginal(marginal, total_degree))
            .collect::<Result<Vec<_>>>()?;
        let indices = total_degree_indices(dimension, total_degree)?;
        let stride = total_degree + 1;
        let factors = indices
            .iter()
            .map(|index| {
                index
                    .iter()
                    .enumerate()
                    .filter(|&(_, &degree)| degree > 0)
                    .map(|(k, &degree)| k * stride + degree)
                    .collect()
            })
            .collect();

        Ok(Self {
            names: distribution.names(),
            polynomials,
            enumeration: LinearEnumeration::new(dimension)?,
            indices,
            factors,
            total_degree,
        })
    }

    /// Like [`OrthogonalBasis::new`] but checks that the caller's notion of
    /// the input dimension agrees with the distribution.
    pub fn with_dimension(
        distribution: &JointDistribution,
        dimension: usize,
        total_degree: usize,
    ) -> Result<Self> {
        if distribution.dimension() != dimension {
            return Err(ChaosError::DimensionMismatch {
                stage: "basis",
                expected: dimension,
                found: distribution.dimension(),
            });
        }
        Self::new(distribution, total_degree)
    }

    pub fn dimension(&self) -> usize {
        self.polynomials.len()
    }

    pub fn size(&self) -> usize {
        self.indices.len()
    }

    pub fn total_degree(&self) -> usize {
        self.total_degree
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn enumeration(&self) -> LinearEnumeration {
        self.enumeration
    }

    pub fn multi_indices(&self) -> &[MultiIndex] {
        &self.indices
    }

    /// # Panics
    ///
    /// If `term` is not below [`Self::size`].
    pub fn multi_index(&self, term: usize) -> &MultiIndex {
        &self.indices[term]
    }

    /// Name of the univariate family used for each input.
    pub fn family_labels(&self) -> Vec<&'static str> {
        self.polynomials.iter().map(|p| p.label()).collect()
    }

    fn check_point(&self, x: &[f64]) -> Result<()> {
        if x.len() != self.dimension() {
            return Err(ChaosError::DimensionMismatch {
                stage: "basis evaluation",
                expected: self.dimension(),
                found: x.len(),
            });
        }
        Ok(())
    }

    /// All univariate polynomial values at `x`, input-major.
    pub(crate) fn univariate_table(&self, x: &[f64]) -> Vec<f64> {
        let stride = self.total_degree + 1;
        let mut table = vec![0f64; self.dimension() * stride];
        table
            .chunks_exact_mut(stride)
            .zip(self.polynomials.iter().zip(x))
            .for_each(|(out, (poly, &xk))| poly.evaluate_into(xk, out));
        table
    }

    #[inline]
    pub(crate) fn term_from_table(&self, term: usize, table: &[f64]) -> f64 {
        self.factors[term].iter().map(|&offset| table[offset]).product()
    }

    pub fn evaluate_term(&self, term: usize, x: &[f64]) -> Result<f64> {
        if term >= self.size() {
            return Err(ChaosError::InvalidArgument {
                stage: "basis evaluation",
                reason: format!("term {term} is outside a basis of {} terms", self.size()),
            });
        }
        self.check_point(x)?;
        Ok(self.term_from_table(term, &self.univariate_table(x)))
    }

    /// Values of every basis term at `x`.
    pub fn evaluate(&self, x: &[f64]) -> Result<Vec<f64>> {
        self.check_point(x)?;
        let table = self.univariate_table(x);
        Ok((0..self.size())
            .map(|term| self.term_from_table(term, &table))
            .collect())
    }

    /// Design matrix with one row per sample point and one column per term.
    pub fn design_matrix(&self, sample: &Sample) -> Result<Mat<f64>> {
        self.design_matrix_for(sample, &(0..self.size()).collect::<Vec<_>>())
    }

    /// Design matrix restricted to the listed terms.
    pub fn design_matrix_for(&self, sample: &Sample, terms: &[usize]) -> Result<Mat<f64>> {
        if sample.dimension() != self.dimension() {
            return Err(ChaosError::DimensionMismatch {
                stage: "design matrix",
                expected: self.dimension(),
                found: sample.dimension(),
            });
        }
        if let Some(&term) = terms.iter().find(|&&term| term >= self.size()) {
            return Err(ChaosError::InvalidArgument {
                stage: "design matrix",
                reason: format!("term {term} is outside a basis of {} terms", self.size()),
            });
        }
        let tables: Vec<Vec<f64>> = (0..sample.len())
            .into_par_iter()
            .map(|i| self.univariate_table(sample.row(i)))
            .collect();
        Ok(Mat::from_fn(sample.len(), terms.len(), |i, j| {
            self.term_from_table(terms[j], &tables[i])
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Marginal;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn joint() -> JointDistribution {
        JointDistribution::new(vec![
            Marginal::uniform("u", -2., 4.).unwrap(),
            Marginal::normal("n", 1., 0.5).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn size_and_labels() {
        let basis = OrthogonalBasis::new(&joint(), 3).unwrap();
        assert_eq!(basis.size(), 10);
        assert_eq!(basis.family_labels(), vec!["Legendre", "Hermite"]);
        assert!(basis.multi_index(0).is_constant());
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let err = OrthogonalBasis::with_dimension(&joint(), 3, 2).unwrap_err();
        assert!(matches!(
            err,
            ChaosError::DimensionMismatch {
                expected: 3,
                found: 2,
                ..
            }
        ));
        assert!(OrthogonalBasis::new(&joint(), 0).is_err());
    }

    #[test]
    fn product_terms() {
        let basis = OrthogonalBasis::new(&joint(), 2).unwrap();
        let x = [1.5, 1.2];
        let values = basis.evaluate(&x).unwrap();
        let zu = (1.5 - 1.) / 3.;
        let zn = (1.2 - 1.) / 0.5;
        // (1, 1) is at position 4
        assert_abs_diff_eq!(values[0], 1.);
        assert_abs_diff_eq!(values[1], 3f64.sqrt() * zu, epsilon = 1e-14);
        assert_abs_diff_eq!(values[2], zn, epsilon = 1e-14);
        assert_abs_diff_eq!(values[4], 3f64.sqrt() * zu * zn, epsilon = 1e-14);
        assert_abs_diff_eq!(basis.evaluate_term(4, &x).unwrap(), values[4]);
        assert!(basis.evaluate(&[1.]).is_err());
    }

    #[test]
    fn out_of_range_terms_are_rejected() {
        let joint = joint();
        let basis = OrthogonalBasis::new(&joint, 2).unwrap();
        assert!(matches!(
            basis.evaluate_term(basis.size(), &[1.5, 1.2]),
            Err(ChaosError::InvalidArgument { .. })
        ));
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let sample = joint.sample(4, &mut rng).unwrap();
        assert!(matches!(
            basis.design_matrix_for(&sample, &[0, 7]),
            Err(ChaosError::InvalidArgument { .. })
        ));
        assert_eq!(basis.design_matrix_for(&sample, &[0, 5]).unwrap().ncols(), 2);
    }

    #[test]
    fn empirical_gram_is_close_to_identity() {
        let joint = joint();
        let basis = OrthogonalBasis::new(&joint, 3).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let sample = joint.sample(100_000, &mut rng).unwrap();
        let psi = basis.design_matrix(&sample).unwrap();
        let n = psi.nrows() as f64;
        for i in 0..psi.ncols() {
            for j in 0..psi.ncols() {
                let g: f64 = psi
                    .col_as_slice(i)
                    .iter()
                    .zip(psi.col_as_slice(j))
                    .map(|(a, b)| a * b)
                    .sum::<f64>()
                    / n;
                let expected = if i == j { 1. } else { 0. };
                assert_abs_diff_eq!(g, expected, epsilon = 0.05);
            }
        }
    }
}
