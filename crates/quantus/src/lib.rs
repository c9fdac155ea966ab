//! Quantus: composable uncertainty-quantification models over tabular data.
//!
//! A [`Model`] pairs a deterministic function with named inputs and
//! outputs, a [`Domain`] of admissible values, and a [`Density`] describing
//! how the inputs vary. Models evaluate against tabular [`DataFrame`]s
//! while tracking naming, ordering, and validity, chain left-to-right
//! through the [`pipe`] operator, and are manufactured from data by the
//! [`fit`] subsystem.
//!
//! # Core Principles
//!
//! - **Schema-checked**: evaluation validates the frame against the
//!   model's declared inputs and reorders columns before the call
//! - **Immutable models**: composition returns a new Model, never mutates
//! - **Reproducible randomness**: every stochastic operation takes a seed
//!
//! # Example
//!
//! ```
//! use quantus::{frame, Marginal, Model};
//!
//! let model = Model::from_fn("doubler", &["x"], &["y"], |v: &[f64]| vec![2.0 * v[0]])
//!     .unwrap()
//!     .with_marginal("x", Marginal::uniform(0.0, 1.0).unwrap())
//!     .unwrap();
//!
//! let result = model.evaluate(&frame!("x" => [0.0, 0.5, 1.0])).unwrap();
//! assert_eq!(result.column("y").unwrap(), &[0.0, 1.0, 2.0]);
//! ```

pub mod density;
pub mod domain;
pub mod error;
pub mod fit;
pub mod frame;
pub mod model;
pub mod pipe;

pub(crate) mod linalg;

pub use density::{Density, Dependence, Marginal};
pub use domain::{Bound, BoundViolation, Domain};
pub use error::{QuantusError, Result};
pub use fit::{
    fit_forest, fit_gp, fit_kmeans, fit_nls, FitForest, FitGp, FitKmeans, FitNls, FitOutcome,
    FitWarning, ForestSpec, GpSpec, KmeansSpec, NlsSpec, Surrogate,
};
pub use frame::{read_csv, write_csv, DataFrame, SourceMetadata};
pub use model::{
    eval_monte_carlo, eval_nominal, Det, DomainPolicy, EvalOptions, EvalWarning, Evaluation,
    Model, ModelFn, RowFailure,
};
pub use pipe::{pipe, Apply, EvalFrame, MonteCarlo, Nominal, Pipeline, Role, Stage, Value};
