use tracing::info;

use crate::basis::OrthogonalBasis;
use crate::enumerate::MultiIndex;
use crate::error::{ChaosError, Result};
use crate::math::centered_sum_squares;
use crate::metamodel::Metamodel;
use crate::sample::Sample;
use crate::selection::{lars, least_squares, SelectionSettings};

/// How chaos coefficients are computed from the training sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectionStrategy {
    /// Least-angle path over the truncated basis, keeping the active set
    /// with the smallest corrected leave-one-out error.
    Lars(SelectionSettings),
    /// Ordinary least squares on the whole truncated basis.
    FullLeastSquares,
}

impl Default for ProjectionStrategy {
    fn default() -> Self {
        Self::Lars(SelectionSettings::default())
    }
}

impl ProjectionStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Lars(_) => "LARS",
            Self::FullLeastSquares => "least squares",
        }
    }
}

/// A fitted expansion together with the data and diagnostics of the fit.
#[derive(Debug, Clone)]
pub struct FunctionalChaosResult {
    input_sample: Sample,
    output_sample: Vec<f64>,
    metamodel: Metamodel,
    residual: f64,
    relative_error: f64,
    loo_error: f64,
}

impl FunctionalChaosResult {
    pub fn metamodel(&self) -> &Metamodel {
        &self.metamodel
    }

    pub fn into_metamodel(self) -> Metamodel {
        self.metamodel
    }

    pub fn input_sample(&self) -> &Sample {
        &self.input_sample
    }

    pub fn output_sample(&self) -> &[f64] {
        &self.output_sample
    }

    /// Multi-indices of the selected terms, in basis order.
    pub fn indices(&self) -> Vec<&MultiIndex> {
        self.metamodel
            .terms()
            .iter()
            .map(|&term| self.metamodel.basis().multi_index(term))
            .collect()
    }

    pub fn coefficients(&self) -> &[f64] {
        self.metamodel.coefficients()
    }

    /// Root mean square of the training residuals.
    pub fn residual(&self) -> f64 {
        self.residual
    }

    /// Training residual sum of squares over the centred output sum of squares.
    pub fn relative_error(&self) -> f64 {
        self.relative_error
    }

    /// Corrected leave-one-out error relative to the output variance.
    pub fn loo_error(&self) -> f64 {
        self.loo_error
    }
}

/// Project `outputs` observed at `inputs` onto `basis`.
pub fn fit(
    basis: OrthogonalBasis,
    inputs: &Sample,
    outputs: &[f64],
    strategy: &ProjectionStrategy,
) -> Result<FunctionalChaosResult> {
    if inputs.len() != outputs.len() {
        return Err(ChaosError::DimensionMismatch {
            stage: "projection",
            expected: inputs.len(),
            found: outputs.len(),
        });
    }
    if inputs.is_empty() {
        return Err(ChaosError::InvalidArgument {
            stage: "projection",
            reason: "the training sample is empty".to_string(),
        });
    }
    if let Some(row) = outputs.iter().position(|v| !v.is_finite()) {
        return Err(ChaosError::InvalidArgument {
            stage: "projection",
            reason: format!("output {row} is not finite: {}", outputs[row]),
        });
    }
    let psi = basis.design_matrix(inputs)?;
    info!(
        samples = psi.nrows(),
        terms = psi.ncols(),
        strategy = strategy.label(),
        "projecting onto the chaos basis"
    );
    let selection = match strategy {
        ProjectionStrategy::Lars(settings) => lars(&psi, outputs, settings)?,
        ProjectionStrategy::FullLeastSquares => least_squares(
            &psi,
            outputs,
            SelectionSettings::default().dependence_tolerance,
        )?,
    };
    drop(psi);

    let n = outputs.len() as f64;
    let total = centered_sum_squares(outputs);
    let relative_error = if total > 0. {
        selection.residual_sum_squares / total
    } else {
        selection.residual_sum_squares
    };
    info!(
        active = selection.terms.len(),
        loo_error = selection.loo_error,
        relative_error,
        "projection finished"
    );

    Ok(FunctionalChaosResult {
        input_sample: inputs.clone(),
        output_sample: outputs.to_vec(),
        residual: (selection.residual_sum_squares / n).sqrt(),
        relative_error,
        loo_error: selection.loo_error,
        metamodel: Metamodel::new(basis, selection.terms, selection.coefficients)?,
    })
}
