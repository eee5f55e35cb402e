pub(crate) mod basis;
pub(crate) mod distribution;
pub(crate) mod enumerate;
pub(crate) mod error;
pub(crate) mod experiment;
pub(crate) mod math;
pub(crate) mod metamodel;
pub(crate) mod model;
pub(crate) mod polynomial;
pub(crate) mod regression;
pub(crate) mod sample;
pub(crate) mod selection;
pub(crate) mod sobol;
pub(crate) mod study;

pub use basis::OrthogonalBasis;
pub use distribution::{Family, JointDistribution, Marginal};
pub use enumerate::{basis_size, total_degree_indices, LinearEnumeration, MultiIndex};
pub use error::{ChaosError, Result};
pub use experiment::{Experiment, ExperimentKind};
pub use metamodel::{Metamodel, Validation};
pub use model::{evaluate_sample, test_models, FnModel, Model};
pub use polynomial::{
    BasisFamily, ClassicalFamily, DiscreteMeasure, Recurrence, UnivariatePolynomials,
};
pub use regression::{fit, FunctionalChaosResult, ProjectionStrategy};
pub use sample::Sample;
pub use selection::SelectionSettings;
pub use sobol::SobolIndices;
pub use study::{ChaosAnalysis, ChaosSettings, ChaosStudy};
