//! The fitting subsystem: manufacture new Models from tabular data.
//!
//! Every family shares one shape: `fit_<family>(frame, template/spec) ->
//! FitOutcome`, where the outcome carries the produced Model plus any
//! recoverable warnings. The trained predictor is owned exclusively by the
//! produced Model as its function; prediction families are tagged variants
//! of one [`Surrogate`] capability (`predict`, optional `predict_std`), not
//! an inheritance hierarchy.
//!
//! Determinism is a contract, not a convenience: every stochastic family
//! takes a `seed`, and per-unit RNGs (per tree, per restart) are derived
//! from it by fixed offsets, so the same seed and dataset reproduce the
//! trained parameters bit-for-bit.

mod forest;
mod gp;
mod kmeans;
mod nls;

pub use forest::{fit_forest, ForestSpec, TrainedForest};
pub use gp::{fit_gp, GpSpec, TrainedGp};
pub use kmeans::{fit_kmeans, KmeansSpec, TrainedKmeans};
pub use nls::{fit_nls, NlsSpec};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{QuantusError, Result};
use crate::frame::DataFrame;
use crate::model::{Model, ModelFn};
use crate::pipe::{Role, Stage, Value};

/// A recoverable fitting problem. The fit still yields a best-effort
/// Model; callers decide whether the warning is acceptable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitWarning {
    /// The parameter Jacobian is rank-deficient: some parameters are not
    /// uniquely determined by the data.
    Unidentifiable { details: String },
    /// The optimizer hit its iteration budget before meeting tolerance.
    NoConvergence { iterations: usize },
    /// The fitted parameter density could not carry the full dependence
    /// structure and fell back to something simpler.
    DegenerateDensity { details: String },
}

/// Result of a fit: the produced Model and any recoverable warnings.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub model: Model,
    pub warnings: Vec<FitWarning>,
}

/// A trained predictor, tagged by family.
pub enum Surrogate {
    Gp(gp::TrainedGp),
    Forest(forest::TrainedForest),
    Kmeans(kmeans::TrainedKmeans),
}

impl Surrogate {
    /// Point prediction, one value per underlying output.
    pub fn predict(&self, x: &[f64]) -> Vec<f64> {
        match self {
            Surrogate::Gp(gp) => gp.predict(x),
            Surrogate::Forest(forest) => forest.predict(x),
            Surrogate::Kmeans(kmeans) => kmeans.predict(x),
        }
    }

    /// Predictive standard deviation per output, for families that
    /// expose one.
    pub fn predict_std(&self, x: &[f64]) -> Option<Vec<f64>> {
        match self {
            Surrogate::Gp(gp) => Some(gp.predict_std(x)),
            Surrogate::Forest(forest) => Some(forest.predict_std(x)),
            Surrogate::Kmeans(_) => None,
        }
    }
}

/// Adapter installing a surrogate as a Model function. With `with_std`
/// the predictive standard deviations are appended after the point
/// predictions, matching the `<output>_std` column extension.
pub(crate) struct SurrogateFn {
    pub surrogate: Surrogate,
    pub with_std: bool,
}

impl ModelFn for SurrogateFn {
    fn call(&self, inputs: &[f64]) -> std::result::Result<Vec<f64>, String> {
        let mut values = self.surrogate.predict(inputs);
        if self.with_std {
            match self.surrogate.predict_std(inputs) {
                Some(stds) => values.extend(stds),
                None => return Err("surrogate exposes no predictive std".to_string()),
            }
        }
        Ok(values)
    }
}

/// Check that a training frame carries every template input and output.
pub(crate) fn check_training_frame(
    frame: &DataFrame,
    template: &Model,
    family: &str,
) -> Result<()> {
    let missing: Vec<String> = template
        .inputs()
        .iter()
        .chain(template.outputs())
        .filter(|name| !frame.has_column(name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(QuantusError::missing_columns(
            format!("{family} fit training frame"),
            missing,
        ));
    }
    if frame.n_rows() == 0 {
        return Err(QuantusError::Fit {
            family: family.to_string(),
            message: "training frame has no rows".to_string(),
        });
    }
    Ok(())
}

/// Gather named columns into an `n x k` design matrix, row-major over the
/// frame's rows and column-ordered by `names`.
pub(crate) fn design_matrix(frame: &DataFrame, names: &[String]) -> Result<Array2<f64>> {
    let n = frame.n_rows();
    let k = names.len();
    let mut matrix = Array2::<f64>::zeros((n, k));
    for row in 0..n {
        let values = frame.gather_row(names, row)?;
        for (col, value) in values.into_iter().enumerate() {
            matrix[[row, col]] = value;
        }
    }
    Ok(matrix)
}

/// Output names extended with `_std` columns.
pub(crate) fn with_std_names(outputs: &[String]) -> Vec<String> {
    let mut names = outputs.to_vec();
    names.extend(outputs.iter().map(|name| format!("{name}_std")));
    names
}

// ---------------------------------------------------------------------------
// Pipe stages
// ---------------------------------------------------------------------------
// Frame -> Model stages, one per family. The stage form discards fit
// warnings; call the fit function directly to inspect them.

/// Frame → model: Gaussian-process surrogate fit.
pub struct FitGp {
    pub template: Model,
    pub spec: GpSpec,
}

impl Stage for FitGp {
    fn expects(&self) -> Option<Role> {
        Some(Role::Frame)
    }

    fn apply(&self, input: Value) -> Result<Value> {
        let frame = input.into_frame()?;
        Ok(Value::Model(fit_gp(&frame, &self.template, &self.spec)?.model))
    }
}

/// Frame → model: random-forest surrogate fit.
pub struct FitForest {
    pub template: Model,
    pub spec: ForestSpec,
}

impl Stage for FitForest {
    fn expects(&self) -> Option<Role> {
        Some(Role::Frame)
    }

    fn apply(&self, input: Value) -> Result<Value> {
        let frame = input.into_frame()?;
        Ok(Value::Model(
            fit_forest(&frame, &self.template, &self.spec)?.model,
        ))
    }
}

/// Frame → model: k-means clustering fit.
pub struct FitKmeans {
    pub spec: KmeansSpec,
}

impl Stage for FitKmeans {
    fn expects(&self) -> Option<Role> {
        Some(Role::Frame)
    }

    fn apply(&self, input: Value) -> Result<Value> {
        let frame = input.into_frame()?;
        Ok(Value::Model(fit_kmeans(&frame, &self.spec)?.model))
    }
}

/// Frame → model: nonlinear-least-squares calibration.
pub struct FitNls {
    pub template: Model,
    pub spec: NlsSpec,
}

impl Stage for FitNls {
    fn expects(&self) -> Option<Role> {
        Some(Role::Frame)
    }

    fn apply(&self, input: Value) -> Result<Value> {
        let frame = input.into_frame()?;
        Ok(Value::Model(fit_nls(&frame, &self.template, &self.spec)?.model))
    }
}
