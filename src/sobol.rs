//! Variance-based sensitivity indices read off the chaos coefficients.
//!
//! Because the basis is orthonormal under the input law, the output
//! variance is the sum of squared non-constant coefficients, and the
//! share of a group of inputs is the sum over the terms whose support
//! satisfies the group condition.

use std::fmt;

use itertools::Itertools;

use crate::error::{ChaosError, Result};
use crate::metamodel::Metamodel;

/// First and total order Sobol indices of every input.
#[derive(Debug, Clone)]
pub struct SobolIndices {
    names: Vec<String>,
    /// Supports of the active non-constant terms, with their squared coefficients.
    parts: Vec<(Vec<usize>, f64)>,
    variance: f64,
    first_order: Vec<f64>,
    total_order: Vec<f64>,
}

impl SobolIndices {
    /// Decompose the variance of `metamodel`.
    ///
    /// Fails with [`ChaosError::SensitivityInvariant`] when the variance is not
    /// finite. The same error is raised when an index leaves `[0, 1]`, a
    /// first-order index exceeds its total-order index, or the first-order
    /// indices sum above one, each by more than `tolerance`.
    pub fn new(metamodel: &Metamodel, names: &[String], tolerance: f64) -> Result<Self> {
        let dimension = metamodel.dimension();
        if names.len() != dimension {
            return Err(ChaosError::DimensionMismatch {
                stage: "sensitivity analysis",
                expected: dimension,
                found: names.len(),
            });
        }
        if !(tolerance >= 0.) {
            return Err(ChaosError::InvalidArgument {
                stage: "sensitivity analysis",
                reason: format!("tolerance must be non-negative, got {tolerance}"),
            });
        }
        let parts: Vec<(Vec<usize>, f64)> = metamodel
            .indexed_coefficients()
            .filter(|(index, _)| !index.is_constant())
            .map(|(index, c)| (index.support().collect(), c * c))
            .collect();
        let variance: f64 = parts.iter().map(|(_, v)| v).sum();
        if !variance.is_finite() {
            return Err(ChaosError::SensitivityInvariant {
                kind: "variance",
                input: names.join(", "),
                value: variance,
            });
        }
        if variance == 0. {
            return Err(ChaosError::DegenerateSample {
                stage: "sensitivity analysis",
                reason: "the metamodel has zero variance".to_string(),
            });
        }

        let mut first_order = vec![0f64; dimension];
        let mut total_order = vec![0f64; dimension];
        for (support, value) in &parts {
            if let &[k] = support.as_slice() {
                first_order[k] += value;
            }
            for &k in support {
                total_order[k] += value;
            }
        }
        first_order.iter_mut().for_each(|s| *s /= variance);
        total_order.iter_mut().for_each(|s| *s /= variance);

        let indices = Self {
            names: names.to_vec(),
            parts,
            variance,
            first_order,
            total_order,
        };
        indices.check(tolerance)?;
        Ok(indices)
    }

    fn check(&self, tolerance: f64) -> Result<()> {
        let violation = |kind: &'static str, k: usize, value: f64| {
            ChaosError::SensitivityInvariant {
                kind,
                input: self.names[k].clone(),
                value,
            }
        };
        for (k, (&first, &total)) in self
            .first_order
            .iter()
            .zip(self.total_order.iter())
            .enumerate()
        {
            if !(first >= -tolerance) || first > total + tolerance {
                return Err(violation("first order", k, first));
            }
            if !(total <= 1. + tolerance) {
                return Err(violation("total order", k, total));
            }
        }
        let sum: f64 = self.first_order.iter().sum();
        if !(sum <= 1. + tolerance) {
            return Err(ChaosError::SensitivityInvariant {
                kind: "summed first order",
                input: self.names.join(", "),
                value: sum,
            });
        }
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn dimension(&self) -> usize {
        self.names.len()
    }

    /// Output variance the indices are relative to.
    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn first_order(&self, input: usize) -> f64 {
        self.first_order[input]
    }

    pub fn total_order(&self, input: usize) -> f64 {
        self.total_order[input]
    }

    pub fn first_order_indices(&self) -> &[f64] {
        &self.first_order
    }

    pub fn total_order_indices(&self) -> &[f64] {
        &self.total_order
    }

    fn share(&self, keep: impl Fn(&[usize]) -> bool) -> f64 {
        self.parts
            .iter()
            .filter(|(support, _)| keep(support.as_slice()))
            .map(|(_, v)| v)
            .sum::<f64>()
            / self.variance
    }

    fn check_group(&self, group: &[usize]) -> Result<Vec<usize>> {
        if let Some(&k) = group.iter().find(|&&k| k >= self.dimension()) {
            return Err(ChaosError::InvalidArgument {
                stage: "sensitivity analysis",
                reason: format!("input {k} out of {} inputs", self.dimension()),
            });
        }
        Ok(group.iter().copied().sorted_unstable().dedup().collect())
    }

    /// Share of variance due to the interaction of exactly `group`, with no
    /// other input involved.
    pub fn interaction(&self, group: &[usize]) -> Result<f64> {
        let group = self.check_group(group)?;
        Ok(self.share(|support| support == &group[..]))
    }

    /// Closed first-order index of `group`: terms depending only on inputs
    /// of the group.
    pub fn grouped_first_order(&self, group: &[usize]) -> Result<f64> {
        let group = self.check_group(group)?;
        Ok(self.share(|support| support.iter().all(|k| group.binary_search(k).is_ok())))
    }

    /// Total index of `group`: terms depending on at least one input of the group.
    pub fn grouped_total_order(&self, group: &[usize]) -> Result<f64> {
        let group = self.check_group(group)?;
        Ok(self.share(|support| support.iter().any(|k| group.binary_search(k).is_ok())))
    }
}

impl fmt::Display for SobolIndices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.names.iter().map(|n| n.len()).max().unwrap_or(0).max(5);
        writeln!(f, "{:<width$}  {:>11}  {:>11}", "input", "first order", "total order")?;
        for (name, (first, total)) in self
            .names
            .iter()
            .zip(self.first_order.iter().zip(self.total_order.iter()))
        {
            writeln!(f, "{name:<width$}  {first:>11.6}  {total:>11.6}")?;
        }
        Ok(())
    }
}
