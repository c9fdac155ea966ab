//! Left-to-right composition of analysis stages.
//!
//! A [`Value`] (frame or model) flows through [`Stage`]s; each stage
//! declares which operand kind it expects, and dispatch happens on that
//! declared capability, never on hidden state. A [`Pipeline`] is itself a
//! stage, so grouping stages never changes the result:
//! `(a |> b) |> c == a |> pipeline(b, c)`.

use crate::error::{QuantusError, Result};
use crate::frame::DataFrame;
use crate::model::{eval_monte_carlo, eval_nominal, Det, EvalOptions, Model};

/// The operand kinds that flow through a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Frame,
    Model,
}

/// A value flowing through a pipe.
#[derive(Debug, Clone)]
pub enum Value {
    Frame(DataFrame),
    Model(Model),
}

impl Value {
    /// Which operand kind this value is.
    pub fn role(&self) -> Role {
        match self {
            Value::Frame(_) => Role::Frame,
            Value::Model(_) => Role::Model,
        }
    }

    /// Apply a stage to this value.
    pub fn pipe(self, stage: &dyn Stage) -> Result<Value> {
        if let Some(expected) = stage.expects() {
            if expected != self.role() {
                return Err(QuantusError::schema(format!(
                    "stage expects a {expected:?} operand, got a {:?}",
                    self.role()
                )));
            }
        }
        stage.apply(self)
    }

    /// Unwrap as a frame.
    pub fn into_frame(self) -> Result<DataFrame> {
        match self {
            Value::Frame(frame) => Ok(frame),
            Value::Model(model) => Err(QuantusError::schema(format!(
                "expected a frame, got model '{}'",
                model.name()
            ))),
        }
    }

    /// Unwrap as a model.
    pub fn into_model(self) -> Result<Model> {
        match self {
            Value::Model(model) => Ok(model),
            Value::Frame(_) => Err(QuantusError::schema("expected a model, got a frame")),
        }
    }
}

impl From<DataFrame> for Value {
    fn from(frame: DataFrame) -> Self {
        Value::Frame(frame)
    }
}

impl From<Model> for Value {
    fn from(model: Model) -> Self {
        Value::Model(model)
    }
}

/// One transformation step in a pipe.
///
/// `expects` declares the operand kind the stage consumes (`None` accepts
/// either); `apply` maps the value. Stages must be pure with respect to the
/// pipe: the result may depend only on the incoming value and the stage's
/// own configuration, never on pipeline position.
pub trait Stage {
    fn expects(&self) -> Option<Role>;
    fn apply(&self, input: Value) -> Result<Value>;
}

/// Free-function spelling of [`Value::pipe`].
pub fn pipe(value: impl Into<Value>, stage: &dyn Stage) -> Result<Value> {
    value.into().pipe(stage)
}

/// An owned sequence of stages, itself usable as a stage.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage.
    pub fn then(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }
}

impl Stage for Pipeline {
    fn expects(&self) -> Option<Role> {
        self.stages.first().and_then(|s| s.expects())
    }

    fn apply(&self, input: Value) -> Result<Value> {
        let mut value = input;
        for stage in &self.stages {
            value = value.pipe(stage.as_ref())?;
        }
        Ok(value)
    }
}

/// Frame → frame: evaluate the incoming frame through a fixed model.
pub struct Apply {
    pub model: Model,
    pub options: EvalOptions,
}

impl Apply {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            options: EvalOptions::default(),
        }
    }
}

impl Stage for Apply {
    fn expects(&self) -> Option<Role> {
        Some(Role::Frame)
    }

    fn apply(&self, input: Value) -> Result<Value> {
        let frame = input.into_frame()?;
        let evaluation = self.model.evaluate_with(&frame, &self.options)?;
        Ok(Value::Frame(evaluation.frame))
    }
}

/// Model → frame: evaluate the incoming model on a fixed frame.
pub struct EvalFrame {
    pub frame: DataFrame,
    pub options: EvalOptions,
}

impl EvalFrame {
    pub fn new(frame: DataFrame) -> Self {
        Self {
            frame,
            options: EvalOptions::default(),
        }
    }
}

impl Stage for EvalFrame {
    fn expects(&self) -> Option<Role> {
        Some(Role::Model)
    }

    fn apply(&self, input: Value) -> Result<Value> {
        let model = input.into_model()?;
        let evaluation = model.evaluate_with(&self.frame, &self.options)?;
        Ok(Value::Frame(evaluation.frame))
    }
}

/// Model → frame: nominal evaluation.
pub struct Nominal {
    pub det: Det,
}

impl Nominal {
    pub fn new() -> Self {
        Self { det: Det::Nominal }
    }
}

impl Default for Nominal {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for Nominal {
    fn expects(&self) -> Option<Role> {
        Some(Role::Model)
    }

    fn apply(&self, input: Value) -> Result<Value> {
        let model = input.into_model()?;
        Ok(Value::Frame(eval_nominal(&model, &self.det)?))
    }
}

/// Model → frame: seeded Monte Carlo evaluation.
pub struct MonteCarlo {
    pub n: usize,
    pub seed: u64,
    pub det: Det,
}

impl Stage for MonteCarlo {
    fn expects(&self) -> Option<Role> {
        Some(Role::Model)
    }

    fn apply(&self, input: Value) -> Result<Value> {
        let model = input.into_model()?;
        Ok(Value::Frame(eval_monte_carlo(
            &model, self.n, self.seed, &self.det,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame;

    fn plus_one() -> Model {
        Model::from_fn("plus_one", &["x"], &["y"], |v: &[f64]| vec![v[0] + 1.0]).unwrap()
    }

    fn double_y() -> Model {
        Model::from_fn("double_y", &["y"], &["z"], |v: &[f64]| vec![2.0 * v[0]]).unwrap()
    }

    #[test]
    fn test_frame_through_model() {
        let out = pipe(frame!("x" => [1.0, 2.0]), &Apply::new(plus_one()))
            .unwrap()
            .into_frame()
            .unwrap();
        assert_eq!(out.column("y").unwrap(), &[2.0, 3.0]);
    }

    #[test]
    fn test_model_against_frame() {
        let out = pipe(plus_one(), &EvalFrame::new(frame!("x" => [0.0])))
            .unwrap()
            .into_frame()
            .unwrap();
        assert_eq!(out.column("y").unwrap(), &[1.0]);
    }

    #[test]
    fn test_role_mismatch_rejected() {
        let err = pipe(plus_one(), &Apply::new(plus_one())).unwrap_err();
        assert!(err.to_string().contains("expects"));
    }

    #[test]
    fn test_pipeline_associativity() {
        let df = frame!("x" => [0.0, 1.0, 2.0]);

        // (a |> b) |> c
        let stepwise = pipe(df.clone(), &Apply::new(plus_one()))
            .unwrap()
            .pipe(&Apply::new(double_y()))
            .unwrap()
            .into_frame()
            .unwrap();

        // a |> (b then c)
        let grouped = pipe(
            df,
            &Pipeline::new()
                .then(Apply::new(plus_one()))
                .then(Apply::new(double_y())),
        )
        .unwrap()
        .into_frame()
        .unwrap();

        assert!(stepwise.equals(&grouped));
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let df = frame!("x" => [1.0]);
        let out = pipe(df.clone(), &Pipeline::new())
            .unwrap()
            .into_frame()
            .unwrap();
        assert!(out.equals(&df));
    }
}
