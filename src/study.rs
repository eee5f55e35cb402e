use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::basis::OrthogonalBasis;
use crate::distribution::JointDistribution;
use crate::error::{ChaosError, Result};
use crate::experiment::{Experiment, ExperimentKind};
use crate::metamodel::{Metamodel, Validation};
use crate::model::{evaluate_sample, Model};
use crate::regression::{fit, FunctionalChaosResult, ProjectionStrategy};
use crate::sobol::SobolIndices;

/// Settings of a chaos study.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChaosSettings {
    /// Maximum total degree of the basis terms.
    pub total_degree: usize,
    pub training_size: usize,
    pub validation_size: usize,
    /// Seed of the generator used by [`ChaosStudy::run_seeded`].
    pub seed: u64,
    pub experiment: ExperimentKind,
    pub projection: ProjectionStrategy,
    /// Allowed round-off when checking the Sobol index bounds.
    pub sensitivity_tolerance: f64,
}

impl Default for ChaosSettings {
    fn default() -> Self {
        Self {
            total_degree: 8,
            training_size: 1000,
            validation_size: 1000,
            seed: 0,
            experiment: ExperimentKind::MonteCarlo,
            projection: ProjectionStrategy::default(),
            sensitivity_tolerance: 1e-8,
        }
    }
}

impl ChaosSettings {
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| ChaosError::InvalidArgument {
            stage: "settings",
            reason: reason.to_string(),
        };
        if self.total_degree == 0 {
            return Err(invalid("total degree must be at least 1"));
        }
        if self.training_size == 0 {
            return Err(invalid("training size must be at least 1"));
        }
        if self.validation_size == 0 {
            return Err(invalid("validation size must be at least 1"));
        }
        if !(self.sensitivity_tolerance >= 0.) {
            return Err(invalid("sensitivity tolerance must be non-negative"));
        }
        if let ProjectionStrategy::Lars(selection) = &self.projection {
            selection.validate()?;
        }
        Ok(())
    }
}

/// End-to-end surrogate construction and sensitivity analysis of a model.
#[derive(Debug, Clone)]
pub struct ChaosStudy {
    distribution: JointDistribution,
    settings: ChaosSettings,
}

impl ChaosStudy {
    pub fn new(distribution: JointDistribution, settings: ChaosSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            distribution,
            settings,
        })
    }

    pub fn distribution(&self) -> &JointDistribution {
        &self.distribution
    }

    pub fn settings(&self) -> &ChaosSettings {
        &self.settings
    }

    /// Run the study with a generator seeded from the settings.
    pub fn run_seeded<M: Model + ?Sized>(&self, model: &M) -> Result<ChaosAnalysis> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.settings.seed);
        self.run(model, &mut rng)
    }

    /// Draw designs, evaluate the model, fit the expansion, validate it and
    /// decompose its variance.
    pub fn run<M: Model + ?Sized, R: Rng + ?Sized>(
        &self,
        model: &M,
        rng: &mut R,
    ) -> Result<ChaosAnalysis> {
        let settings = &self.settings;
        let names = self.distribution.names();
        if model.dimension() != self.distribution.dimension() {
            return Err(ChaosError::DimensionMismatch {
                stage: "study",
                expected: self.distribution.dimension(),
                found: model.dimension(),
            });
        }
        if model.input_names() != names {
            warn!(
                model = ?model.input_names(),
                distribution = ?names,
                "model and distribution name their inputs differently"
            );
        }

        let experiment = Experiment::new(&self.distribution, settings.experiment);
        let (training, validation) = experiment.training_and_validation(
            settings.training_size,
            settings.validation_size,
            rng,
        )?;
        info!(
            training = training.len(),
            validation = validation.len(),
            output = %model.output_name(),
            "evaluating the model"
        );
        let training_outputs = evaluate_sample(model, &training)?;
        let validation_outputs = evaluate_sample(model, &validation)?;

        let basis = OrthogonalBasis::with_dimension(
            &self.distribution,
            model.dimension(),
            settings.total_degree,
        )?;
        info!(
            degree = settings.total_degree,
            size = basis.size(),
            families = ?basis.family_labels(),
            "built the chaos basis"
        );
        let result = fit(basis, &training, &training_outputs, &settings.projection)?;

        let validation = Validation::of(result.metamodel(), &validation, &validation_outputs)?;
        info!(q2 = validation.q2(), "validated the metamodel");

        let sobol = SobolIndices::new(result.metamodel(), &names, settings.sensitivity_tolerance)?;
        info!(
            first_order = ?sobol.first_order_indices(),
            total_order = ?sobol.total_order_indices(),
            "computed Sobol indices"
        );

        Ok(ChaosAnalysis {
            result,
            validation,
            sobol,
        })
    }
}

/// Everything a study produces, for reporting.
#[derive(Debug, Clone)]
pub struct ChaosAnalysis {
    result: FunctionalChaosResult,
    validation: Validation,
    sobol: SobolIndices,
}

impl ChaosAnalysis {
    pub fn result(&self) -> &FunctionalChaosResult {
        &self.result
    }

    pub fn metamodel(&self) -> &Metamodel {
        self.result.metamodel()
    }

    pub fn validation(&self) -> &Validation {
        &self.validation
    }

    pub fn q2(&self) -> f64 {
        self.validation.q2()
    }

    /// Model outputs on the validation design.
    pub fn observed(&self) -> &[f64] {
        self.validation.observed()
    }

    /// Metamodel outputs on the validation design.
    pub fn predicted(&self) -> &[f64] {
        self.validation.predicted()
    }

    pub fn sobol(&self) -> &SobolIndices {
        &self.sobol
    }

    pub fn input_names(&self) -> &[String] {
        self.sobol.names()
    }

    pub fn first_order_indices(&self) -> &[f64] {
        self.sobol.first_order_indices()
    }

    pub fn total_order_indices(&self) -> &[f64] {
        self.sobol.total_order_indices()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Marginal;
    use crate::model::FnModel;
    use approx::assert_abs_diff_eq;

    #[test]
    fn settings_are_checked() {
        let defaults = ChaosSettings::default();
        assert!(defaults.validate().is_ok());
        for settings in [
            ChaosSettings {
                total_degree: 0,
                ..defaults
            },
            ChaosSettings {
                training_size: 0,
                ..defaults
            },
            ChaosSettings {
                validation_size: 0,
                ..defaults
            },
        ] {
            assert!(matches!(
                settings.validate(),
                Err(ChaosError::InvalidArgument { .. })
            ));
        }
    }

    #[test]
    fn additive_model() {
        let joint = JointDistribution::new(vec![
            Marginal::uniform("a", -1., 1.).unwrap(),
            Marginal::normal("b", 2., 0.5).unwrap(),
        ])
        .unwrap();
        let model = FnModel::new(joint.names(), "y", |x: &[f64]| Ok(x[0] + 2. * x[1] * x[1]));
        let settings = ChaosSettings {
            total_degree: 3,
            training_size: 60,
            validation_size: 40,
            seed: 5,
            ..Default::default()
        };
        let study = ChaosStudy::new(joint, settings).unwrap();
        let analysis = study.run_seeded(&model).unwrap();
        assert_abs_diff_eq!(analysis.q2(), 1., epsilon = 1e-9);
        assert_eq!(analysis.observed().len(), 40);
        // Var(a) = 1/3, Var(2b²) = 4 Var(b²) with b ~ N(2, 0.25): 4 (4 μ² σ² + 2 σ⁴)
        let var_a = 1. / 3.;
        let var_b = 4. * (4. * 4. * 0.25 + 2. * 0.0625);
        assert_abs_diff_eq!(analysis.metamodel().variance(), var_a + var_b, epsilon = 1e-8);
        assert_abs_diff_eq!(
            analysis.first_order_indices()[0],
            var_a / (var_a + var_b),
            epsilon = 1e-8
        );
        assert_abs_diff_eq!(
            analysis.total_order_indices()[1],
            var_b / (var_a + var_b),
            epsilon = 1e-8
        );

        let again = study.run_seeded(&model).unwrap();
        assert_eq!(again.metamodel().coefficients(), analysis.metamodel().coefficients());
    }

    #[test]
    fn model_dimension_must_match() {
        let joint = JointDistribution::new(vec![Marginal::uniform("a", 0., 1.).unwrap()]).unwrap();
        let model = FnModel::new(
            vec!["a".to_string(), "b".to_string()],
            "y",
            |x: &[f64]| Ok(x[0]),
        );
        let study = ChaosStudy::new(joint, ChaosSettings::default()).unwrap();
        assert!(matches!(
            study.run_seeded(&model),
            Err(ChaosError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn non_finite_model_outputs_abort_the_study() {
        let joint = JointDistribution::new(vec![
            Marginal::uniform("a", 0., 1.).unwrap(),
            Marginal::uniform("b", 0., 1.).unwrap(),
        ])
        .unwrap();
        let model = FnModel::new(joint.names(), "y", |x: &[f64]| {
            Ok(if x[0] > 0.98 { f64::NAN } else { x[0] + x[1] })
        });
        let settings = ChaosSettings {
            total_degree: 2,
            training_size: 300,
            validation_size: 300,
            ..Default::default()
        };
        let study = ChaosStudy::new(joint, settings).unwrap();
        assert!(matches!(
            study.run_seeded(&model),
            Err(ChaosError::ModelEvaluation { .. })
        ));
    }
}
