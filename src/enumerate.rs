//! Multi-indices of multivariate polynomial terms and their linear ordering.
//!
//! Terms are ordered by total degree, and inside one total degree in
//! reverse-lexicographic order of the exponents: in two dimensions the
//! sequence starts `(0,0) (1,0) (0,1) (2,0) (1,1) (0,2)`. The position of
//! a term in that sequence is also the position of its chaos coefficient.

use std::ops::Deref;

use crate::error::{ChaosError, Result};
use crate::math::binomial;

/// Per-dimension polynomial degrees of a single tensor-product term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MultiIndex(Vec<usize>);

impl MultiIndex {
    pub fn new(degrees: Vec<usize>) -> Self {
        Self(degrees)
    }

    pub fn total_degree(&self) -> usize {
        self.0.iter().sum()
    }

    pub fn is_constant(&self) -> bool {
        self.0.iter().all(|&d| d == 0)
    }

    /// Dimensions with a non-zero degree.
    pub fn support(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d > 0)
            .map(|(k, _)| k)
    }
}

impl Deref for MultiIndex {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for MultiIndex {
    fn from(degrees: Vec<usize>) -> Self {
        Self(degrees)
    }
}

/// Number of terms of total degree at most `degree` in `dimension` variables.
pub fn basis_size(dimension: usize, degree: usize) -> Result<usize> {
    binomial(degree + dimension, dimension).ok_or_else(|| ChaosError::InvalidArgument {
        stage: "enumeration",
        reason: format!("basis size for dimension {dimension} and degree {degree} overflows"),
    })
}

/// Number of ways to write `total` as an ordered sum of `parts` non-negative integers.
fn compositions(total: usize, parts: usize) -> usize {
    if parts == 0 {
        return usize::from(total == 0);
    }
    binomial(total + parts - 1, parts - 1).unwrap_or(usize::MAX)
}

/// All multi-indices of total degree at most `degree`, in enumeration order.
pub fn total_degree_indices(dimension: usize, degree: usize) -> Result<Vec<MultiIndex>> {
    if dimension == 0 {
        return Err(ChaosError::InvalidArgument {
            stage: "enumeration",
            reason: "dimension must be at least 1".to_string(),
        });
    }
    let mut out = Vec::with_capacity(basis_size(dimension, degree)?);
    let mut prefix = Vec::with_capacity(dimension);
    for total in 0..=degree {
        push_strata(dimension, total, &mut prefix, &mut out);
    }
    Ok(out)
}

fn push_strata(
    dimension: usize,
    remaining: usize,
    prefix: &mut Vec<usize>,
    out: &mut Vec<MultiIndex>,
) {
    if prefix.len() + 1 == dimension {
        prefix.push(remaining);
        out.push(MultiIndex(prefix.clone()));
        prefix.pop();
        return;
    }
    for first in (0..=remaining).rev() {
        prefix.push(first);
        push_strata(dimension, remaining - first, prefix, out);
        prefix.pop();
    }
}

/// Bijection between term positions and multi-indices for a fixed dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearEnumeration {
    dimension: usize,
}

impl LinearEnumeration {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(ChaosError::InvalidArgument {
                stage: "enumeration",
                reason: "dimension must be at least 1".to_string(),
            });
        }
        Ok(Self { dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn basis_size_from_total_degree(&self, degree: usize) -> Result<usize> {
        basis_size(self.dimension, degree)
    }

    /// The multi-index at position `rank`.
    ///
    /// Fails when the degree layer holding `rank` has more terms than fit in
    /// a `usize`.
    pub fn multi_index(&self, rank: usize) -> Result<MultiIndex> {
        let mut degree = 0;
        let mut below = 0usize;
        loop {
            let through = binomial(degree + self.dimension - 1, self.dimension - 1)
                .and_then(|layer| below.checked_add(layer))
                .ok_or_else(|| ChaosError::InvalidArgument {
                    stage: "enumeration",
                    reason: format!(
                        "rank {rank} is beyond the enumerable terms in dimension {}",
                        self.dimension
                    ),
                })?;
            if rank < through {
                break;
            }
            below = through;
            degree += 1;
        }

        let mut rank = rank - below;
        let mut remaining = degree;
        let mut out = Vec::with_capacity(self.dimension);
        for k in 0..self.dimension - 1 {
            let rest = self.dimension - k - 1;
            let mut value = remaining;
            loop {
                let count = compositions(remaining - value, rest);
                if rank < count {
                    break;
                }
                rank -= count;
                value -= 1;
            }
            out.push(value);
            remaining -= value;
        }
        out.push(remaining);
        Ok(MultiIndex(out))
    }

    /// Position of `index` in the enumeration.
    pub fn position(&self, index: &MultiIndex) -> Result<usize> {
        if index.len() != self.dimension {
            return Err(ChaosError::DimensionMismatch {
                stage: "enumeration",
                expected: self.dimension,
                found: index.len(),
            });
        }
        let degree = index.total_degree();
        let mut rank = if degree == 0 {
            0
        } else {
            basis_size(self.dimension, degree - 1)?
        };

        let mut remaining = degree;
        for (k, &value) in index.iter().enumerate().take(self.dimension - 1) {
            let rest = self.dimension - k - 1;
            rank += ((value + 1)..=remaining)
                .map(|v| compositions(remaining - v, rest))
                .sum::<usize>();
            remaining -= value;
        }
        Ok(rank)
    }

    /// The first `size` multi-indices.
    pub fn indices(&self, size: usize) -> Result<Vec<MultiIndex>> {
        (0..size).map(|rank| self.multi_index(rank)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn idx(v: &[usize]) -> MultiIndex {
        MultiIndex(v.to_vec())
    }

    #[test]
    fn two_dimensional_order() {
        let terms = total_degree_indices(2, 3).unwrap();
        assert_eq!(terms.len(), 10);
        assert_eq!(
            terms,
            vec![
                idx(&[0, 0]),
                idx(&[1, 0]),
                idx(&[0, 1]),
                idx(&[2, 0]),
                idx(&[1, 1]),
                idx(&[0, 2]),
                idx(&[3, 0]),
                idx(&[2, 1]),
                idx(&[1, 2]),
                idx(&[0, 3]),
            ]
        );
    }

    #[test]
    fn borehole_basis_size() {
        let enumeration = LinearEnumeration::new(8).unwrap();
        assert_eq!(enumeration.basis_size_from_total_degree(8).unwrap(), 12870);
    }

    #[test]
    fn rejects_zero_dimension() {
        assert!(LinearEnumeration::new(0).is_err());
        assert!(total_degree_indices(0, 3).is_err());
    }

    #[test]
    fn huge_ranks_are_rejected() {
        let enumeration = LinearEnumeration::new(40).unwrap();
        assert!(matches!(
            enumeration.multi_index(usize::MAX),
            Err(ChaosError::InvalidArgument { .. })
        ));
        let last = enumeration.multi_index(basis_size(40, 3).unwrap() - 1).unwrap();
        assert_eq!(last.total_degree(), 3);
        assert_eq!(last[39], 3);
    }

    #[test]
    fn support_and_degree() {
        let index = idx(&[0, 2, 0, 1]);
        assert_eq!(index.total_degree(), 3);
        assert_eq!(index.support().collect::<Vec<_>>(), vec![1, 3]);
        assert!(idx(&[0, 0]).is_constant());
    }

    proptest! {
        #[test]
        fn size_matches_closed_form(dimension in 1usize..6, degree in 0usize..7) {
            let terms = total_degree_indices(dimension, degree).unwrap();
            prop_assert_eq!(terms.len(), basis_size(dimension, degree).unwrap());
            prop_assert!(terms.iter().all(|t| t.total_degree() <= degree));
            prop_assert!(terms.windows(2).all(|w| w[0].total_degree() <= w[1].total_degree()));
        }

        #[test]
        fn ranking_is_a_bijection(dimension in 1usize..5, degree in 0usize..6) {
            let enumeration = LinearEnumeration::new(dimension).unwrap();
            let terms = total_degree_indices(dimension, degree).unwrap();
            prop_assert_eq!(&enumeration.indices(terms.len()).unwrap(), &terms);
            for (rank, term) in terms.iter().enumerate() {
                prop_assert_eq!(enumeration.position(term).unwrap(), rank);
            }
        }
    }
}
