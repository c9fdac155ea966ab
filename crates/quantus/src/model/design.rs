//! Designed evaluations: nominal point and Monte Carlo sweeps.

use crate::error::{QuantusError, Result};
use crate::frame::DataFrame;
use super::{EvalOptions, Model};

/// Where deterministic-variable values come from.
#[derive(Debug, Clone)]
pub enum Det {
    /// Use each deterministic variable's nominal value (bound midpoint).
    Nominal,
    /// Use the rows of this frame. Deterministic inputs it does not
    /// supply fall back to their nominal values; columns naming a random
    /// input are rejected as ambiguous.
    Frame(DataFrame),
}

/// Nominal value for one input: marginal median when the variable is
/// random, bound midpoint when it is deterministic and doubly bounded.
fn nominal_value(model: &Model, name: &str) -> Result<f64> {
    if let Some(marginal) = model.density().marginal_of(name) {
        return marginal.quantile(0.5);
    }
    model.domain().nominal_of(name).ok_or_else(|| {
        QuantusError::InvalidParameter(format!(
            "nominal value for '{name}' is undefined: no marginal and no finite bounds"
        ))
    })
}

/// Resolve the deterministic part of a design into a frame.
fn det_frame(model: &Model, det: &Det) -> Result<DataFrame> {
    let det_inputs = model.deterministic_inputs();
    match det {
        Det::Nominal => {
            let mut frame = DataFrame::new();
            for name in det_inputs {
                frame.push_column(name, vec![nominal_value(model, name)?])?;
            }
            Ok(frame)
        }
        Det::Frame(frame) => {
            if let Some(random) = model
                .random_inputs()
                .into_iter()
                .find(|name| frame.has_column(name))
            {
                return Err(QuantusError::schema(format!(
                    "deterministic frame supplies '{random}', which has a marginal"
                )));
            }
            let names: Vec<String> = det_inputs
                .iter()
                .filter(|name| frame.has_column(name))
                .map(|s| s.to_string())
                .collect();
            frame.select(&names)
        }
    }
}

/// Evaluate the model at a single nominal point (or at the rows of a
/// supplied deterministic frame, with random variables at their medians).
///
/// The result carries the resolved inputs alongside the outputs.
pub fn eval_nominal(model: &Model, det: &Det) -> Result<DataFrame> {
    let base = det_frame(model, det)?;
    let n_rows = base.n_rows().max(1);

    let mut full = DataFrame::new();
    for name in model.inputs() {
        let values = if let Some(column) = base.column(name) {
            column.to_vec()
        } else {
            vec![nominal_value(model, name)?; n_rows]
        };
        full.push_column(name.clone(), values)?;
    }

    let options = EvalOptions {
        append: true,
        ..EvalOptions::default()
    };
    Ok(model.evaluate_with(&full, &options)?.frame)
}

/// Monte Carlo evaluation: draw `n` joint samples of the random inputs
/// with a seeded RNG and cross them with the deterministic rows.
///
/// The result has `n * det_rows` rows, deterministic-row major, inputs
/// appended ahead of outputs. Same seed, model, and design reproduce the
/// frame bit-for-bit.
pub fn eval_monte_carlo(model: &Model, n: usize, seed: u64, det: &Det) -> Result<DataFrame> {
    if n == 0 {
        return Err(QuantusError::InvalidParameter(
            "monte carlo requires n >= 1".to_string(),
        ));
    }
    let mut rng = fastrand::Rng::with_seed(seed);
    let samples = model.density().sample(n, &mut rng)?;

    let base = det_frame(model, det)?;
    let det_rows = base.n_rows().max(1);

    let total = n * det_rows;
    let mut full = DataFrame::new();
    for name in model.inputs() {
        let mut values = Vec::with_capacity(total);
        if let Some(sampled) = samples.column(name) {
            // Random input: repeat the sample block per deterministic row.
            for _ in 0..det_rows {
                values.extend_from_slice(sampled);
            }
        } else if let Some(column) = base.column(name) {
            for &v in column {
                values.extend(std::iter::repeat(v).take(n));
            }
        } else {
            let nominal = nominal_value(model, name)?;
            values.extend(std::iter::repeat(nominal).take(total));
        }
        full.push_column(name.clone(), values)?;
    }

    let options = EvalOptions {
        append: true,
        ..EvalOptions::default()
    };
    Ok(model.evaluate_with(&full, &options)?.frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::density::Marginal;
    use crate::frame;

    /// y = a * x + eps with x deterministic and eps random.
    fn line_model() -> Model {
        Model::from_fn("line", &["x", "eps"], &["y"], |v: &[f64]| {
            vec![3.0 * v[0] + v[1]]
        })
        .unwrap()
        .with_bounds("x", 0.0, 2.0)
        .unwrap()
        .with_marginal("eps", Marginal::normal(0.0, 0.1).unwrap())
        .unwrap()
    }

    #[test]
    fn test_nominal_uses_midpoint_and_median() {
        let out = eval_nominal(&line_model(), &Det::Nominal).unwrap();
        assert_eq!(out.n_rows(), 1);
        assert_eq!(out.get("x", 0), Some(1.0));
        assert_eq!(out.get("eps", 0), Some(0.0));
        assert_eq!(out.get("y", 0), Some(3.0));
    }

    #[test]
    fn test_nominal_with_det_frame() {
        let det = Det::Frame(frame!("x" => [0.0, 2.0]));
        let out = eval_nominal(&line_model(), &det).unwrap();
        assert_eq!(out.n_rows(), 2);
        assert_eq!(out.column("y").unwrap(), &[0.0, 6.0]);
    }

    #[test]
    fn test_nominal_unbounded_det_var_fails() {
        let model = Model::from_fn("free", &["x"], &["y"], |v: &[f64]| vec![v[0]]).unwrap();
        assert!(eval_nominal(&model, &Det::Nominal).is_err());
    }

    #[test]
    fn test_monte_carlo_row_count_and_det_major_order() {
        let det = Det::Frame(frame!("x" => [0.0, 1.0, 2.0]));
        let out = eval_monte_carlo(&line_model(), 4, 7, &det).unwrap();
        assert_eq!(out.n_rows(), 12);
        let x = out.column("x").unwrap();
        assert!(x[..4].iter().all(|&v| v == 0.0));
        assert!(x[4..8].iter().all(|&v| v == 1.0));
        assert!(x[8..].iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_monte_carlo_seed_reproducible() {
        let det = Det::Frame(frame!("x" => [0.5]));
        let a = eval_monte_carlo(&line_model(), 16, 99, &det).unwrap();
        let b = eval_monte_carlo(&line_model(), 16, 99, &det).unwrap();
        assert!(a.equals(&b));
    }

    #[test]
    fn test_monte_carlo_rejects_random_var_in_det_frame() {
        let det = Det::Frame(frame!("x" => [0.5], "eps" => [0.0]));
        assert!(eval_monte_carlo(&line_model(), 2, 1, &det).is_err());
    }

    #[test]
    fn test_monte_carlo_without_random_vars_repeats_det() {
        let model = Model::from_fn("det", &["x"], &["y"], |v: &[f64]| vec![v[0] + 1.0])
            .unwrap()
            .with_bounds("x", 0.0, 2.0)
            .unwrap();
        let det = Det::Frame(frame!("x" => [0.0, 1.0]));
        let out = eval_monte_carlo(&model, 3, 5, &det).unwrap();
        assert_eq!(out.n_rows(), 6);
        assert_eq!(out.column("y").unwrap(), &[1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    }
}
