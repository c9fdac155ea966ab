//! The Model abstraction: a named function with an input/output schema,
//! a Domain of admissible values, and a Density over its inputs.

mod design;
mod evaluate;

pub use design::{eval_monte_carlo, eval_nominal, Det};
pub use evaluate::{DomainPolicy, EvalOptions, EvalWarning, Evaluation, RowFailure};

use std::fmt;
use std::sync::Arc;

use crate::density::{Density, Dependence, Marginal};
use crate::domain::{Bound, Domain};
use crate::error::{QuantusError, Result};

/// The function a model evaluates: positional over the model's declared
/// input order, returning one value per declared output.
///
/// Implemented by closures through [`Model::from_fn`] and by fitted
/// surrogates directly. Failures carry a message only; the evaluation
/// engine attaches the row index.
pub trait ModelFn: Send + Sync {
    fn call(&self, inputs: &[f64]) -> std::result::Result<Vec<f64>, String>;
}

impl<F> ModelFn for F
where
    F: Fn(&[f64]) -> Vec<f64> + Send + Sync,
{
    fn call(&self, inputs: &[f64]) -> std::result::Result<Vec<f64>, String> {
        Ok(self(inputs))
    }
}

/// A deterministic function over named inputs plus a description of how
/// those inputs vary.
///
/// Immutable after construction: the composition methods (`with_*`) return
/// a new Model, so a Model reused across pipeline branches can never be
/// altered underneath another branch. The function is shared behind an
/// `Arc`, making clones cheap and evaluation safe to parallelize over rows.
#[derive(Clone)]
pub struct Model {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    function: Arc<dyn ModelFn>,
    domain: Domain,
    density: Density,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("domain", &self.domain)
            .field("density", &self.density)
            .finish_non_exhaustive()
    }
}

impl Model {
    /// Build a model from a plain function.
    ///
    /// Input and output name lists must each be duplicate-free and
    /// non-empty. Inputs and outputs may share names (identity models are
    /// legal); the overlap only matters when an evaluation appends inputs
    /// to outputs, where it becomes a schema error.
    pub fn from_fn(
        name: impl Into<String>,
        inputs: &[&str],
        outputs: &[&str],
        function: impl ModelFn + 'static,
    ) -> Result<Self> {
        let inputs: Vec<String> = inputs.iter().map(|s| s.to_string()).collect();
        let outputs: Vec<String> = outputs.iter().map(|s| s.to_string()).collect();
        Self::from_parts(
            name.into(),
            inputs,
            outputs,
            Arc::new(function),
            Domain::new(),
            Density::new(),
        )
    }

    /// Assemble a model from already-built parts. Used by the fitting
    /// subsystem, which carries domains and densities forward from a
    /// template.
    pub(crate) fn from_parts(
        name: String,
        inputs: Vec<String>,
        outputs: Vec<String>,
        function: Arc<dyn ModelFn>,
        domain: Domain,
        density: Density,
    ) -> Result<Self> {
        if inputs.is_empty() || outputs.is_empty() {
            return Err(QuantusError::schema(
                "a model needs at least one input and one output",
            ));
        }
        if has_duplicates(&inputs) {
            return Err(QuantusError::schema("duplicate input names"));
        }
        if has_duplicates(&outputs) {
            return Err(QuantusError::schema("duplicate output names"));
        }
        let model = Self {
            name,
            inputs,
            outputs,
            function,
            domain,
            density,
        };
        model.check_references(&model.domain, &model.density)?;
        Ok(model)
    }

    fn check_references(&self, domain: &Domain, density: &Density) -> Result<()> {
        for var in domain.variables() {
            if !self.inputs.iter().any(|i| i == var) {
                return Err(QuantusError::schema(format!(
                    "domain references '{var}', which is not a model input"
                )));
            }
        }
        for var in density.variables() {
            if !self.inputs.iter().any(|i| i == var) {
                return Err(QuantusError::schema(format!(
                    "density references '{var}', which is not a model input"
                )));
            }
        }
        Ok(())
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared input names, in positional order.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Declared output names, in result-column order.
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// The model's domain.
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// The model's density.
    pub fn density(&self) -> &Density {
        &self.density
    }

    pub(crate) fn function(&self) -> &Arc<dyn ModelFn> {
        &self.function
    }

    /// New model with a bound on one input variable.
    pub fn with_bounds(&self, name: &str, lo: f64, hi: f64) -> Result<Self> {
        if !self.inputs.iter().any(|i| i == name) {
            return Err(QuantusError::schema(format!(
                "cannot bound '{name}': not a model input"
            )));
        }
        let mut model = self.clone();
        model.domain.set(name, Bound::new(lo, hi)?);
        Ok(model)
    }

    /// New model with a marginal distribution on one input variable.
    pub fn with_marginal(&self, name: &str, marginal: Marginal) -> Result<Self> {
        if !self.inputs.iter().any(|i| i == name) {
            return Err(QuantusError::schema(format!(
                "cannot attach a marginal to '{name}': not a model input"
            )));
        }
        let mut model = self.clone();
        model.density.set_marginal(name, marginal);
        Ok(model)
    }

    /// New model with a dependence structure over its marginals.
    pub fn with_dependence(&self, dependence: Dependence) -> Result<Self> {
        let mut model = self.clone();
        model.density.set_dependence(dependence)?;
        Ok(model)
    }

    /// New model with a replaced density (used by calibration fits).
    pub(crate) fn with_density(&self, density: Density) -> Result<Self> {
        self.check_references(&self.domain, &density)?;
        let mut model = self.clone();
        model.density = density;
        Ok(model)
    }

    /// New model under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        let mut model = self.clone();
        model.name = name.into();
        model
    }

    /// Input variables with no declared marginal, in input order.
    ///
    /// These are the deterministic variables: sampling gives them no
    /// randomness, so nominal or caller-supplied values stand in.
    pub fn deterministic_inputs(&self) -> Vec<&str> {
        self.inputs
            .iter()
            .filter(|name| self.density.marginal_of(name).is_none())
            .map(|s| s.as_str())
            .collect()
    }

    /// Input variables with a declared marginal, in input order.
    pub fn random_inputs(&self) -> Vec<&str> {
        self.inputs
            .iter()
            .filter(|name| self.density.marginal_of(name).is_some())
            .map(|s| s.as_str())
            .collect()
    }
}

fn has_duplicates(names: &[String]) -> bool {
    names
        .iter()
        .enumerate()
        .any(|(i, name)| names[..i].contains(name))
}
