//! The evaluation engine: validate, reorder, invoke row-wise, re-attach
//! names.

use serde::{Deserialize, Serialize};

use crate::error::{QuantusError, Result};
use crate::frame::DataFrame;
use super::Model;

/// What to do when an input value falls outside its declared bound.
///
/// Physical and statistical models are routinely evaluated outside their
/// nominal design envelope during exploratory work, so the default only
/// records a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DomainPolicy {
    /// Skip the bound check entirely.
    Ignore,
    /// Record an [`EvalWarning`] per violating row and keep going.
    #[default]
    Warn,
    /// Fail with a `Domain` error on the first violation.
    Strict,
}

/// Options for [`Model::evaluate_with`].
#[derive(Debug, Clone, Default)]
pub struct EvalOptions {
    /// Join the input columns ahead of the outputs in the result. A name
    /// shared between the frame and the outputs is then a schema error.
    pub append: bool,
    /// Bound-checking policy.
    pub domain: DomainPolicy,
    /// Keep evaluating after a per-row function failure; failed rows
    /// produce NaN outputs and are listed on the result.
    pub tolerant: bool,
}

/// An out-of-domain input recorded during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalWarning {
    pub row: usize,
    pub variable: String,
    pub value: f64,
    pub lo: f64,
    pub hi: f64,
}

/// A per-row function failure recorded in tolerant mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFailure {
    pub row: usize,
    pub message: String,
}

/// Result of an evaluation with options: the output frame plus everything
/// non-fatal the engine noticed along the way.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub frame: DataFrame,
    pub warnings: Vec<EvalWarning>,
    pub failures: Vec<RowFailure>,
}

impl Model {
    /// Evaluate the model over a frame with strict defaults: no appended
    /// inputs, domain violations recorded as warnings (then discarded),
    /// abort on the first function failure.
    pub fn evaluate(&self, frame: &DataFrame) -> Result<DataFrame> {
        self.evaluate_with(frame, &EvalOptions::default())
            .map(|ev| ev.frame)
    }

    /// Evaluate the model over a frame.
    ///
    /// The frame's column set must be a superset of the declared inputs;
    /// anything less is a schema error naming the missing columns. Columns
    /// are gathered into the declared input order before each call (the
    /// function is positional), the function runs once per row, and the
    /// results come back as a new frame with columns named by the declared
    /// outputs, in output order, one row per input row. The input frame is
    /// never mutated.
    pub fn evaluate_with(&self, frame: &DataFrame, options: &EvalOptions) -> Result<Evaluation> {
        let missing: Vec<String> = self
            .inputs()
            .iter()
            .filter(|name| !frame.has_column(name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(QuantusError::missing_columns(
                format!("evaluating '{}'", self.name()),
                missing,
            ));
        }

        if options.append {
            if let Some(collision) = self
                .outputs()
                .iter()
                .find(|name| frame.has_column(name))
            {
                return Err(QuantusError::schema(format!(
                    "cannot append inputs: column '{collision}' collides with a model output"
                )));
            }
        }

        let inputs = self.inputs().to_vec();
        let n_rows = frame.n_rows();
        let n_out = self.outputs().len();
        let mut out_columns: Vec<Vec<f64>> = vec![Vec::with_capacity(n_rows); n_out];
        let mut warnings = Vec::new();
        let mut failures = Vec::new();

        for row in 0..n_rows {
            let values = frame.gather_row(&inputs, row)?;

            match options.domain {
                DomainPolicy::Ignore => {}
                DomainPolicy::Warn => {
                    for violation in self.domain().violations(&inputs, &values) {
                        warnings.push(EvalWarning {
                            row,
                            variable: violation.variable,
                            value: violation.value,
                            lo: violation.lo,
                            hi: violation.hi,
                        });
                    }
                }
                DomainPolicy::Strict => {
                    if let Some(violation) =
                        self.domain().violations(&inputs, &values).into_iter().next()
                    {
                        return Err(QuantusError::Domain {
                            variable: violation.variable,
                            value: violation.value,
                            lo: violation.lo,
                            hi: violation.hi,
                            row,
                        });
                    }
                }
            }

            match self.function().call(&values) {
                Ok(result) => {
                    if result.len() != n_out {
                        return Err(QuantusError::Evaluation {
                            row,
                            message: format!(
                                "function returned {} values, model declares {} outputs",
                                result.len(),
                                n_out
                            ),
                        });
                    }
                    for (column, value) in out_columns.iter_mut().zip(result) {
                        column.push(value);
                    }
                }
                Err(message) => {
                    if options.tolerant {
                        failures.push(RowFailure { row, message });
                        for column in &mut out_columns {
                            column.push(f64::NAN);
                        }
                    } else {
                        return Err(QuantusError::Evaluation { row, message });
                    }
                }
            }
        }

        let mut result = DataFrame::new();
        if options.append {
            result = frame.clone();
        }
        for (name, values) in self.outputs().iter().zip(out_columns) {
            result.push_column(name.clone(), values)?;
        }

        Ok(Evaluation {
            frame: result,
            warnings,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame;

    fn doubler() -> Model {
        Model::from_fn("doubler", &["x"], &["y"], |x: &[f64]| vec![2.0 * x[0]])
            .unwrap()
            .with_bounds("x", 0.0, 1.0)
            .unwrap()
    }

    #[test]
    fn test_missing_input_is_schema_error() {
        let model = doubler();
        let df = frame!("z" => [1.0]);
        let err = model.evaluate(&df).unwrap_err();
        assert!(matches!(err, QuantusError::Schema { .. }));
        assert!(err.to_string().contains("x"));
    }

    #[test]
    fn test_extra_columns_ignored() {
        let model = doubler();
        let df = frame!("extra" => [9.0, 9.0], "x" => [1.0, 2.0]);
        let out = model.evaluate(&df).unwrap();
        assert_eq!(out.names(), vec!["y"]);
        assert_eq!(out.column("y").unwrap(), &[2.0, 4.0]);
    }

    #[test]
    fn test_append_joins_inputs() {
        let model = doubler();
        let df = frame!("x" => [0.5]);
        let options = EvalOptions {
            append: true,
            ..EvalOptions::default()
        };
        let ev = model.evaluate_with(&df, &options).unwrap();
        assert_eq!(ev.frame.names(), vec!["x", "y"]);
    }

    #[test]
    fn test_append_collision_is_schema_error() {
        let model = Model::from_fn("id", &["x"], &["x"], |x: &[f64]| vec![x[0]]).unwrap();
        let df = frame!("x" => [1.0]);
        let options = EvalOptions {
            append: true,
            ..EvalOptions::default()
        };
        assert!(model.evaluate_with(&df, &options).is_err());
        // Without append the identity evaluation is fine.
        assert!(model.evaluate(&df).is_ok());
    }

    #[test]
    fn test_domain_warn_collects_and_proceeds() {
        let model = doubler();
        let df = frame!("x" => [0.5, 2.0]);
        let ev = model.evaluate_with(&df, &EvalOptions::default()).unwrap();
        assert_eq!(ev.frame.n_rows(), 2);
        assert_eq!(ev.warnings.len(), 1);
        assert_eq!(ev.warnings[0].row, 1);
        assert_eq!(ev.warnings[0].variable, "x");
    }

    #[test]
    fn test_domain_strict_fails() {
        let model = doubler();
        let df = frame!("x" => [0.5, 2.0]);
        let options = EvalOptions {
            domain: DomainPolicy::Strict,
            ..EvalOptions::default()
        };
        let err = model.evaluate_with(&df, &options).unwrap_err();
        assert!(matches!(err, QuantusError::Domain { row: 1, .. }));
    }

    /// sqrt model that fails on negative input, for failure-path tests.
    fn checked_sqrt_model() -> Model {
        struct CheckedSqrt;
        impl crate::model::ModelFn for CheckedSqrt {
            fn call(&self, inputs: &[f64]) -> std::result::Result<Vec<f64>, String> {
                let x = inputs[0];
                if x < 0.0 {
                    Err(format!("sqrt of negative value {x}"))
                } else {
                    Ok(vec![x.sqrt()])
                }
            }
        }
        Model::from_fn("sqrt", &["x"], &["y"], CheckedSqrt).unwrap()
    }

    #[test]
    fn test_function_failure_aborts_by_default() {
        let model = checked_sqrt_model();
        let df = frame!("x" => [1.0, -1.0, 4.0]);
        let err = model.evaluate(&df).unwrap_err();
        assert!(matches!(err, QuantusError::Evaluation { row: 1, .. }));
    }

    #[test]
    fn test_tolerant_mode_isolates_failures() {
        let model = checked_sqrt_model();
        let df = frame!("x" => [1.0, -1.0, 4.0]);
        let options = EvalOptions {
            tolerant: true,
            ..EvalOptions::default()
        };
        let ev = model.evaluate_with(&df, &options).unwrap();
        assert_eq!(ev.frame.n_rows(), 3);
        assert_eq!(ev.failures.len(), 1);
        assert_eq!(ev.failures[0].row, 1);
        let y = ev.frame.column("y").unwrap();
        assert_eq!(y[0], 1.0);
        assert!(y[1].is_nan());
        assert_eq!(y[2], 2.0);
    }

    #[test]
    fn test_wrong_arity_detected() {
        let model = Model::from_fn("bad", &["x"], &["y", "z"], |x: &[f64]| vec![x[0]]).unwrap();
        let df = frame!("x" => [1.0]);
        assert!(matches!(
            model.evaluate(&df).unwrap_err(),
            QuantusError::Evaluation { .. }
        ));
    }
}
