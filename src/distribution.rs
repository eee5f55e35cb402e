//! Marginal laws and the independent joint distribution of the model inputs.
//!
//! Sampling goes through `rand_distr`, densities and quantiles through
//! `statrs`. Both are built once when a marginal is constructed, so a
//! [`Marginal`] is immutable and can be shared across threads.

use rand::distr::Open01;
use rand::Rng;
use rand_distr::Distribution;
use statrs::distribution::{Continuous, ContinuousCDF};

use crate::error::{ChaosError, Result};
use crate::sample::Sample;

/// Distribution family together with its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Family {
    Uniform {
        lower: f64,
        upper: f64,
    },
    Normal {
        mean: f64,
        std_dev: f64,
    },
    /// `gamma + exp(mu_log + sigma_log * N(0, 1))`
    LogNormal {
        mu_log: f64,
        sigma_log: f64,
        gamma: f64,
    },
    /// Density proportional to `(x - lower)^(alpha - 1) (upper - x)^(beta - 1)`.
    Beta {
        alpha: f64,
        beta: f64,
        lower: f64,
        upper: f64,
    },
    /// Density proportional to `(x - gamma)^(k - 1) exp(-lambda (x - gamma))`.
    Gamma {
        k: f64,
        lambda: f64,
        gamma: f64,
    },
    Exponential {
        lambda: f64,
        gamma: f64,
    },
}

impl Family {
    pub fn label(&self) -> &'static str {
        match self {
            Family::Uniform { .. } => "Uniform",
            Family::Normal { .. } => "Normal",
            Family::LogNormal { .. } => "LogNormal",
            Family::Beta { .. } => "Beta",
            Family::Gamma { .. } => "Gamma",
            Family::Exponential { .. } => "Exponential",
        }
    }
}

/// Sampler and density of the unshifted, unscaled law. `shift` and `scale`
/// map it back onto the support of the family.
#[derive(Debug, Clone)]
enum Law {
    Uniform(rand::distr::Uniform<f64>, statrs::distribution::Uniform),
    Normal(rand_distr::Normal<f64>, statrs::distribution::Normal),
    LogNormal(rand_distr::LogNormal<f64>, statrs::distribution::LogNormal),
    Beta(rand_distr::Beta<f64>, statrs::distribution::Beta),
    Gamma(rand_distr::Gamma<f64>, statrs::distribution::Gamma),
    Exponential(rand_distr::Exp<f64>, statrs::distribution::Exp),
}

impl Law {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Law::Uniform(d, _) => d.sample(rng),
            Law::Normal(d, _) => d.sample(rng),
            Law::LogNormal(d, _) => d.sample(rng),
            Law::Beta(d, _) => d.sample(rng),
            Law::Gamma(d, _) => d.sample(rng),
            Law::Exponential(d, _) => d.sample(rng),
        }
    }

    fn pdf(&self, x: f64) -> f64 {
        match self {
            Law::Uniform(_, d) => d.pdf(x),
            Law::Normal(_, d) => d.pdf(x),
            Law::LogNormal(_, d) => d.pdf(x),
            Law::Beta(_, d) => d.pdf(x),
            Law::Gamma(_, d) => d.pdf(x),
            Law::Exponential(_, d) => d.pdf(x),
        }
    }

    fn cdf(&self, x: f64) -> f64 {
        match self {
            Law::Uniform(_, d) => d.cdf(x),
            Law::Normal(_, d) => d.cdf(x),
            Law::LogNormal(_, d) => d.cdf(x),
            Law::Beta(_, d) => d.cdf(x),
            Law::Gamma(_, d) => d.cdf(x),
            Law::Exponential(_, d) => d.cdf(x),
        }
    }

    fn inverse_cdf(&self, p: f64) -> f64 {
        match self {
            Law::Uniform(_, d) => d.inverse_cdf(p),
            Law::Normal(_, d) => d.inverse_cdf(p),
            Law::LogNormal(_, d) => d.inverse_cdf(p),
            Law::Beta(_, d) => d.inverse_cdf(p),
            Law::Gamma(_, d) => d.inverse_cdf(p),
            Law::Exponential(_, d) => d.inverse_cdf(p),
        }
    }

    /// Lower end of the support, if bounded.
    fn lower(&self) -> Option<f64> {
        match self {
            Law::Uniform(..) | Law::Normal(..) => None,
            _ => Some(0.),
        }
    }
}

/// A named univariate input law.
#[derive(Debug, Clone)]
pub struct Marginal {
    name: String,
    family: Family,
    law: Law,
    shift: f64,
    scale: f64,
}

fn check(name: &str, family: &Family, ok: bool, reason: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(ChaosError::InvalidParameter {
            name: name.to_string(),
            distribution: family.label(),
            reason: reason.to_string(),
        })
    }
}

impl Marginal {
    pub fn uniform(name: impl Into<String>, lower: f64, upper: f64) -> Result<Self> {
        Self::new(name, Family::Uniform { lower, upper })
    }

    pub fn normal(name: impl Into<String>, mean: f64, std_dev: f64) -> Result<Self> {
        Self::new(name, Family::Normal { mean, std_dev })
    }

    pub fn log_normal(
        name: impl Into<String>,
        mu_log: f64,
        sigma_log: f64,
        gamma: f64,
    ) -> Result<Self> {
        Self::new(
            name,
            Family::LogNormal {
                mu_log,
                sigma_log,
                gamma,
            },
        )
    }

    pub fn beta(
        name: impl Into<String>,
        alpha: f64,
        beta: f64,
        lower: f64,
        upper: f64,
    ) -> Result<Self> {
        Self::new(
            name,
            Family::Beta {
                alpha,
                beta,
                lower,
                upper,
            },
        )
    }

    pub fn gamma(name: impl Into<String>, k: f64, lambda: f64, gamma: f64) -> Result<Self> {
        Self::new(name, Family::Gamma { k, lambda, gamma })
    }

    pub fn exponential(name: impl Into<String>, lambda: f64, gamma: f64) -> Result<Self> {
        Self::new(name, Family::Exponential { lambda, gamma })
    }

    /// Validate the parameters of `family` and build the marginal.
    pub fn new(name: impl Into<String>, family: Family) -> Result<Self> {
        let name = name.into();
        let invalid = |err: &dyn std::fmt::Display| ChaosError::InvalidParameter {
            name: name.clone(),
            distribution: family.label(),
            reason: err.to_string(),
        };

        let law = match family {
            Family::Uniform { lower, upper } => {
                check(
                    &name,
                    &family,
                    lower.is_finite() && upper.is_finite(),
                    "bounds must be finite",
                )?;
                check(&name, &family, lower < upper, "lower bound must be below upper bound")?;
                Law::Uniform(
                    rand::distr::Uniform::new(lower, upper).map_err(|e| invalid(&e))?,
                    statrs::distribution::Uniform::new(lower, upper).map_err(|e| invalid(&e))?,
                )
            }
            Family::Normal { mean, std_dev } => {
                check(&name, &family, mean.is_finite(), "mean must be finite")?;
                check(
                    &name,
                    &family,
                    std_dev.is_finite() && std_dev > 0.,
                    "standard deviation must be positive",
                )?;
                Law::Normal(
                    rand_distr::Normal::new(mean, std_dev).map_err(|e| invalid(&e))?,
                    statrs::distribution::Normal::new(mean, std_dev).map_err(|e| invalid(&e))?,
                )
            }
            Family::LogNormal {
                mu_log,
                sigma_log,
                gamma,
            } => {
                check(
                    &name,
                    &family,
                    mu_log.is_finite() && gamma.is_finite(),
                    "location parameters must be finite",
                )?;
                check(
                    &name,
                    &family,
                    sigma_log.is_finite() && sigma_log > 0.,
                    "sigma_log must be positive",
                )?;
                Law::LogNormal(
                    rand_distr::LogNormal::new(mu_log, sigma_log).map_err(|e| invalid(&e))?,
                    statrs::distribution::LogNormal::new(mu_log, sigma_log)
                        .map_err(|e| invalid(&e))?,
                )
            }
            Family::Beta {
                alpha,
                beta,
                lower,
                upper,
            } => {
                check(&name, &family, alpha.is_finite() && alpha > 0., "alpha must be positive")?;
                check(&name, &family, beta.is_finite() && beta > 0., "beta must be positive")?;
                check(
                    &name,
                    &family,
                    lower.is_finite() && upper.is_finite(),
                    "bounds must be finite",
                )?;
                check(&name, &family, lower < upper, "lower bound must be below upper bound")?;
                Law::Beta(
                    rand_distr::Beta::new(alpha, beta).map_err(|e| invalid(&e))?,
                    statrs::distribution::Beta::new(alpha, beta).map_err(|e| invalid(&e))?,
                )
            }
            Family::Gamma { k, lambda, gamma } => {
                check(&name, &family, k.is_finite() && k > 0., "shape k must be positive")?;
                check(
                    &name,
                    &family,
                    lambda.is_finite() && lambda > 0.,
                    "rate lambda must be positive",
                )?;
                check(&name, &family, gamma.is_finite(), "shift gamma must be finite")?;
                Law::Gamma(
                    rand_distr::Gamma::new(k, lambda.recip()).map_err(|e| invalid(&e))?,
                    statrs::distribution::Gamma::new(k, lambda).map_err(|e| invalid(&e))?,
                )
            }
            Family::Exponential { lambda, gamma } => {
                check(
                    &name,
                    &family,
                    lambda.is_finite() && lambda > 0.,
                    "rate lambda must be positive",
                )?;
                check(&name, &family, gamma.is_finite(), "shift gamma must be finite")?;
                Law::Exponential(
                    rand_distr::Exp::new(lambda).map_err(|e| invalid(&e))?,
                    statrs::distribution::Exp::new(lambda).map_err(|e| invalid(&e))?,
                )
            }
        };

        let (shift, scale) = match family {
            Family::LogNormal { gamma, .. }
            | Family::Gamma { gamma, .. }
            | Family::Exponential { gamma, .. } => (gamma, 1.),
            Family::Beta { lower, upper, .. } => (lower, upper - lower),
            Family::Uniform { .. } | Family::Normal { .. } => (0., 1.),
        };

        Ok(Self {
            name,
            family,
            law,
            shift,
            scale,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.shift + self.scale * self.law.sample(rng)
    }

    pub fn pdf(&self, x: f64) -> f64 {
        let u = (x - self.shift) / self.scale;
        match self.law.lower() {
            Some(lower) if u < lower => 0.,
            _ => self.law.pdf(u) / self.scale,
        }
    }

    pub fn cdf(&self, x: f64) -> f64 {
        let u = (x - self.shift) / self.scale;
        match self.law.lower() {
            Some(lower) if u <= lower => 0.,
            _ => self.law.cdf(u),
        }
    }

    /// Inverse CDF at probability `p`.
    pub fn quantile(&self, p: f64) -> Result<f64> {
        if !(0. ..=1.).contains(&p) {
            return Err(ChaosError::InvalidArgument {
                stage: "quantile",
                reason: format!("probability {p} is outside [0, 1]"),
            });
        }
        Ok(self.shift + self.scale * self.law.inverse_cdf(p))
    }

    pub fn mean(&self) -> f64 {
        match self.family {
            Family::Uniform { lower, upper } => 0.5 * (lower + upper),
            Family::Normal { mean, .. } => mean,
            Family::LogNormal {
                mu_log,
                sigma_log,
                gamma,
            } => gamma + (mu_log + 0.5 * sigma_log * sigma_log).exp(),
            Family::Beta {
                alpha,
                beta,
                lower,
                upper,
            } => lower + (upper - lower) * alpha / (alpha + beta),
            Family::Gamma { k, lambda, gamma } => gamma + k / lambda,
            Family::Exponential { lambda, gamma } => gamma + lambda.recip(),
        }
    }

    pub fn std_dev(&self) -> f64 {
        match self.family {
            Family::Uniform { lower, upper } => (upper - lower) / 12f64.sqrt(),
            Family::Normal { std_dev, .. } => std_dev,
            Family::LogNormal {
                mu_log, sigma_log, ..
            } => {
                let s2 = sigma_log * sigma_log;
                (mu_log + 0.5 * s2).exp() * s2.exp_m1().sqrt()
            }
            Family::Beta {
                alpha,
                beta,
                lower,
                upper,
            } => {
                let s = alpha + beta;
                (upper - lower) * (alpha * beta / (s * s * (s + 1.))).sqrt()
            }
            Family::Gamma { k, lambda, .. } => k.sqrt() / lambda,
            Family::Exponential { lambda, .. } => lambda.recip(),
        }
    }
}

/// Ordered marginals joined by the independent copula.
#[derive(Debug, Clone)]
pub struct JointDistribution {
    marginals: Vec<Marginal>,
}

impl JointDistribution {
    pub fn new(marginals: Vec<Marginal>) -> Result<Self> {
        if marginals.is_empty() {
            return Err(ChaosError::InvalidArgument {
                stage: "joint distribution",
                reason: "at least one marginal is required".to_string(),
            });
        }
        for (i, marginal) in marginals.iter().enumerate() {
            if marginals[..i].iter().any(|m| m.name == marginal.name) {
                return Err(ChaosError::InvalidArgument {
                    stage: "joint distribution",
                    reason: format!("input name `{}` is used twice", marginal.name),
                });
            }
        }
        Ok(Self { marginals })
    }

    pub fn dimension(&self) -> usize {
        self.marginals.len()
    }

    pub fn marginals(&self) -> &[Marginal] {
        &self.marginals
    }

    /// # Panics
    ///
    /// If `index` is not below [`Self::dimension`].
    pub fn marginal(&self, index: usize) -> &Marginal {
        &self.marginals[index]
    }

    pub fn names(&self) -> Vec<String> {
        self.marginals.iter().map(|m| m.name.clone()).collect()
    }

    /// Draw `size` independent rows, columns in marginal order.
    pub fn sample<R: Rng + ?Sized>(&self, size: usize, rng: &mut R) -> Result<Sample> {
        let mut sample = Sample::with_capacity(self.names(), size)?;
        let mut row = vec![0f64; self.dimension()];
        for _ in 0..size {
            row.iter_mut()
                .zip(self.marginals.iter())
                .for_each(|(x, marginal)| *x = marginal.sample(rng));
            sample.push(&row)?;
        }
        Ok(sample)
    }

    /// Latin hypercube draw: every marginal is split into `size` equiprobable
    /// strata, each stratum is hit exactly once.
    pub fn latin_hypercube<R: Rng + ?Sized>(&self, size: usize, rng: &mut R) -> Result<Sample> {
        let mut columns = Vec::with_capacity(self.dimension());
        for marginal in self.marginals.iter() {
            let mut strata: Vec<usize> = (0..size).collect();
            rand::seq::SliceRandom::shuffle(strata.as_mut_slice(), rng);
            let column = strata
                .into_iter()
                .map(|stratum| {
                    let u: f64 = rng.sample(Open01);
                    marginal.quantile((stratum as f64 + u) / size as f64)
                })
                .collect::<Result<Vec<f64>>>()?;
            columns.push(column);
        }

        let mut sample = Sample::with_capacity(self.names(), size)?;
        let mut row = vec![0f64; self.dimension()];
        for i in 0..size {
            row.iter_mut()
                .zip(columns.iter())
                .for_each(|(x, column)| *x = column[i]);
            sample.push(&row)?;
        }
        Ok(sample)
    }

    pub fn pdf(&self, x: &[f64]) -> Result<f64> {
        self.check_point(x)?;
        Ok(self
            .marginals
            .iter()
            .zip(x)
            .map(|(marginal, &xi)| marginal.pdf(xi))
            .product())
    }

    pub fn cdf(&self, x: &[f64]) -> Result<f64> {
        self.check_point(x)?;
        Ok(self
            .marginals
            .iter()
            .zip(x)
            .map(|(marginal, &xi)| marginal.cdf(xi))
            .product())
    }

    fn check_point(&self, x: &[f64]) -> Result<()> {
        if x.len() != self.dimension() {
            return Err(ChaosError::DimensionMismatch {
                stage: "joint distribution",
                expected: self.dimension(),
                found: x.len(),
            });
        }
        Ok(())
    }
}
