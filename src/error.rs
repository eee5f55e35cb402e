use thiserror::Error;

/// Errors raised by any stage of the chaos pipeline.
///
/// None of these are recovered internally. Callers may retry with a larger
/// sample or a lower degree.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ChaosError {
    #[error("invalid parameter for {distribution} marginal `{name}`: {reason}")]
    InvalidParameter {
        name: String,
        distribution: &'static str,
        reason: String,
    },

    #[error("invalid argument in {stage}: {reason}")]
    InvalidArgument { stage: &'static str, reason: String },

    #[error("dimension mismatch in {stage}: expected {expected}, found {found}")]
    DimensionMismatch {
        stage: &'static str,
        expected: usize,
        found: usize,
    },

    #[error(
        "singular design with {samples} samples and {basis_size} basis terms: {reason}"
    )]
    SingularDesign {
        samples: usize,
        basis_size: usize,
        reason: String,
    },

    #[error("degenerate sample in {stage}: {reason}")]
    DegenerateSample { stage: &'static str, reason: String },

    #[error("{kind} Sobol index of `{input}` is {value}, outside the admissible range")]
    SensitivityInvariant {
        kind: &'static str,
        input: String,
        value: f64,
    },

    #[error("model evaluation failed on row {row}")]
    ModelEvaluation {
        row: usize,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T> = std::result::Result<T, ChaosError>;
