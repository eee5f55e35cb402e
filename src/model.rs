//! The expensive model being approximated.
//!
//! Provides the `Model` trait, which is all the chaos pipeline needs to know
//! about the physical model: named scalar inputs and one named scalar output.

use std::f64::consts::PI;

use anyhow::Result;
use rayon::prelude::*;

use crate::error::ChaosError;
use crate::sample::Sample;

/// A deterministic function of named scalar inputs.
///
/// The trait is thread-safe so that sample rows can be evaluated in parallel.
pub trait Model: Send + Sync {
    /// Names of the inputs, in the order `evaluate` expects them.
    fn input_names(&self) -> Vec<String>;

    fn output_name(&self) -> String;

    /// Evaluate the model at one point.
    fn evaluate(&self, x: &[f64]) -> Result<f64>;

    fn dimension(&self) -> usize {
        self.input_names().len()
    }
}

/// Evaluate `model` on every row of `sample`, preserving row order.
///
/// A non-finite output is reported as a failed evaluation of its row.
pub fn evaluate_sample<M: Model + ?Sized>(
    model: &M,
    sample: &Sample,
) -> crate::error::Result<Vec<f64>> {
    if sample.dimension() != model.dimension() {
        return Err(ChaosError::DimensionMismatch {
            stage: "model evaluation",
            expected: model.dimension(),
            found: sample.dimension(),
        });
    }
    (0..sample.len())
        .into_par_iter()
        .map(|row| -> crate::error::Result<f64> {
            let value = model
                .evaluate(sample.row(row))
                .map_err(|source| ChaosError::ModelEvaluation { row, source })?;
            if !value.is_finite() {
                return Err(ChaosError::ModelEvaluation {
                    row,
                    source: anyhow::anyhow!("non-finite output {value}"),
                });
            }
            Ok(value)
        })
        .collect()
}

/// A model backed by a closure.
pub struct FnModel<F> {
    inputs: Vec<String>,
    output: String,
    func: F,
}

impl<F> FnModel<F>
where
    F: Fn(&[f64]) -> Result<f64> + Send + Sync,
{
    pub fn new(inputs: Vec<String>, output: impl Into<String>, func: F) -> Self {
        Self {
            inputs,
            output: output.into(),
            func,
        }
    }
}

impl<F> Model for FnModel<F>
where
    F: Fn(&[f64]) -> Result<f64> + Send + Sync,
{
    fn input_names(&self) -> Vec<String> {
        self.inputs.clone()
    }

    fn output_name(&self) -> String {
        self.output.clone()
    }

    fn evaluate(&self, x: &[f64]) -> Result<f64> {
        (self.func)(x)
    }
}

pub mod test_models {
    use super::*;
    use crate::distribution::{JointDistribution, Marginal};

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    /// Water flow rate through a borehole between two aquifers.
    pub struct Borehole;

    impl Borehole {
        /// Input law: radius of the borehole `rw`, radius of influence `r`,
        /// transmissivities `Tu`, `Tl`, potentiometric heads `Hu`, `Hl`,
        /// borehole length `L` and hydraulic conductivity `Kw`.
        pub fn distribution() -> crate::error::Result<JointDistribution> {
            JointDistribution::new(vec![
                Marginal::normal("rw", 0.1, 0.0161812)?,
                Marginal::log_normal("r", 7.71, 1.0056, 0.)?,
                Marginal::uniform("Tu", 63070., 115600.)?,
                Marginal::uniform("Hu", 990., 1110.)?,
                Marginal::uniform("Tl", 63.1, 116.)?,
                Marginal::uniform("Hl", 700., 820.)?,
                Marginal::uniform("L", 1120., 1680.)?,
                Marginal::uniform("Kw", 9855., 12045.)?,
            ])
        }
    }

    impl Model for Borehole {
        fn input_names(&self) -> Vec<String> {
            names(&["rw", "r", "Tu", "Hu", "Tl", "Hl", "L", "Kw"])
        }

        fn output_name(&self) -> String {
            "flow rate".to_string()
        }

        fn evaluate(&self, x: &[f64]) -> Result<f64> {
            let &[rw, r, tu, hu, tl, hl, l, kw] = x else {
                anyhow::bail!("borehole takes 8 inputs, got {}", x.len());
            };
            let log_ratio = (r / rw).ln();
            let denominator =
                log_ratio * (1. + 2. * l * tu / (log_ratio * rw * rw * kw) + tu / tl);
            Ok(2. * PI * tu * (hu - hl) / denominator)
        }
    }

    /// `sin x1 + a sin² x2 + b x3⁴ sin x1` on `U(-π, π)³`.
    pub struct Ishigami {
        pub a: f64,
        pub b: f64,
    }

    impl Default for Ishigami {
        fn default() -> Self {
            Self { a: 7., b: 0.1 }
        }
    }

    impl Ishigami {
        pub fn distribution() -> crate::error::Result<JointDistribution> {
            JointDistribution::new(vec![
                Marginal::uniform("x1", -PI, PI)?,
                Marginal::uniform("x2", -PI, PI)?,
                Marginal::uniform("x3", -PI, PI)?,
            ])
        }

        pub fn mean(&self) -> f64 {
            self.a / 2.
        }

        pub fn variance(&self) -> f64 {
            let (a, b) = (self.a, self.b);
            a * a / 8. + b * PI.powi(4) / 5. + b * b * PI.powi(8) / 18. + 0.5
        }

        fn partial_variances(&self) -> [f64; 3] {
            let (a, b) = (self.a, self.b);
            let v1 = 0.5 * (1. + b * PI.powi(4) / 5.).powi(2);
            let v2 = a * a / 8.;
            let v13 = b * b * PI.powi(8) * (1. / 18. - 1. / 50.);
            [v1, v2, v13]
        }

        pub fn first_order(&self) -> [f64; 3] {
            let [v1, v2, _] = self.partial_variances();
            let v = self.variance();
            [v1 / v, v2 / v, 0.]
        }

        pub fn total_order(&self) -> [f64; 3] {
            let [v1, v2, v13] = self.partial_variances();
            let v = self.variance();
            [(v1 + v13) / v, v2 / v, v13 / v]
        }
    }

    impl Model for Ishigami {
        fn input_names(&self) -> Vec<String> {
            names(&["x1", "x2", "x3"])
        }

        fn output_name(&self) -> String {
            "y".to_string()
        }

        fn evaluate(&self, x: &[f64]) -> Result<f64> {
            let &[x1, x2, x3] = x else {
                anyhow::bail!("ishigami takes 3 inputs, got {}", x.len());
            };
            Ok(x1.sin() + self.a * x2.sin().powi(2) + self.b * x3.powi(4) * x1.sin())
        }
    }
}
