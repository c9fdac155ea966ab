//! Gaussian-process surrogate regression.

use std::sync::Arc;

use ndarray::{Array1, Array2};

use crate::error::{QuantusError, Result};
use crate::frame::DataFrame;
use crate::linalg;
use crate::model::Model;
use super::{check_training_frame, design_matrix, with_std_names, FitOutcome, Surrogate, SurrogateFn};

/// Hyperparameters for [`fit_gp`].
#[derive(Debug, Clone)]
pub struct GpSpec {
    /// Squared-exponential kernel length scale (shared across inputs).
    pub length_scale: f64,
    /// Kernel signal variance.
    pub signal_variance: f64,
    /// Diagonal noise (jitter). The small default keeps the fit an
    /// interpolator while guarding the factorization.
    pub noise: f64,
    /// Extend outputs with `<name>_std` predictive standard deviations.
    pub uncertainty: bool,
}

impl Default for GpSpec {
    fn default() -> Self {
        Self {
            length_scale: 1.0,
            signal_variance: 1.0,
            noise: 1e-8,
            uncertainty: false,
        }
    }
}

/// A trained GP: one latent function per template output over a shared
/// kernel.
pub struct TrainedGp {
    x_train: Array2<f64>,
    chol: Array2<f64>,
    alphas: Vec<Array1<f64>>,
    length_scale: f64,
    signal_variance: f64,
    noise: f64,
}

impl TrainedGp {
    fn kernel(&self, a: &[f64], b: &[f64]) -> f64 {
        kernel_value(a, b, self.length_scale, self.signal_variance)
    }

    fn cross_covariance(&self, x: &[f64]) -> Array1<f64> {
        let n = self.x_train.nrows();
        let mut k_star = Array1::<f64>::zeros(n);
        for i in 0..n {
            let xi = self.x_train.row(i).to_vec();
            k_star[i] = self.kernel(x, &xi);
        }
        k_star
    }

    /// Posterior mean per output.
    pub fn predict(&self, x: &[f64]) -> Vec<f64> {
        let k_star = self.cross_covariance(x);
        self.alphas.iter().map(|alpha| k_star.dot(alpha)).collect()
    }

    /// Posterior standard deviation, shared by every output (the outputs
    /// share one kernel).
    pub fn predict_std(&self, x: &[f64]) -> Vec<f64> {
        let k_star = self.cross_covariance(x);
        let v = linalg::solve_lower(&self.chol, &k_star);
        let variance = (self.signal_variance + self.noise - v.dot(&v)).max(0.0);
        let std = variance.sqrt();
        vec![std; self.alphas.len()]
    }
}

fn kernel_value(a: &[f64], b: &[f64], length_scale: f64, signal_variance: f64) -> f64 {
    let squared: f64 = a
        .iter()
        .zip(b)
        .map(|(&ai, &bi)| (ai - bi) * (ai - bi))
        .sum();
    signal_variance * (-0.5 * squared / (length_scale * length_scale)).exp()
}

/// Fit a Gaussian-process surrogate to the template's outputs.
///
/// The produced Model copies the template's inputs, domain, and density;
/// outputs are the template's, extended with `<name>_std` columns when the
/// spec asks for predictive uncertainty.
pub fn fit_gp(frame: &DataFrame, template: &Model, spec: &GpSpec) -> Result<FitOutcome> {
    check_training_frame(frame, template, "gp")?;
    if spec.length_scale <= 0.0 || spec.signal_variance <= 0.0 || spec.noise < 0.0 {
        return Err(QuantusError::InvalidParameter(
            "gp spec requires length_scale > 0, signal_variance > 0, noise >= 0".to_string(),
        ));
    }

    let x = design_matrix(frame, template.inputs())?;
    let y = design_matrix(frame, template.outputs())?;
    let n = x.nrows();

    let mut gram = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let value = kernel_value(
                x.row(i).to_vec().as_slice(),
                x.row(j).to_vec().as_slice(),
                spec.length_scale,
                spec.signal_variance,
            );
            gram[[i, j]] = value;
            gram[[j, i]] = value;
        }
        gram[[i, i]] += spec.noise;
    }

    let chol = linalg::cholesky(&gram).map_err(|e| QuantusError::Fit {
        family: "gp".to_string(),
        message: format!("kernel factorization failed: {e}"),
    })?;

    let alphas: Vec<Array1<f64>> = (0..y.ncols())
        .map(|k| linalg::cholesky_solve(&chol, &y.column(k).to_owned()))
        .collect();

    let trained = TrainedGp {
        x_train: x,
        chol,
        alphas,
        length_scale: spec.length_scale,
        signal_variance: spec.signal_variance,
        noise: spec.noise,
    };

    let outputs = if spec.uncertainty {
        with_std_names(template.outputs())
    } else {
        template.outputs().to_vec()
    };

    let model = Model::from_parts(
        format!("{}_gp", template.name()),
        template.inputs().to_vec(),
        outputs,
        Arc::new(SurrogateFn {
            surrogate: Surrogate::Gp(trained),
            with_std: spec.uncertainty,
        }),
        template.domain().clone(),
        template.density().clone(),
    )?;

    Ok(FitOutcome {
        model,
        warnings: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame;

    fn smooth_template() -> Model {
        Model::from_fn("smooth", &["x"], &["y", "z"], |v: &[f64]| {
            vec![v[0], v[0] + 1.0]
        })
        .unwrap()
    }

    #[test]
    fn test_gp_interpolates_training_points() {
        let template = smooth_template();
        let data = frame!("x" => [0.0, 1.0, 2.0], "y" => [0.0, 1.0, 2.0], "z" => [1.0, 2.0, 3.0]);
        let fit = fit_gp(&data, &template, &GpSpec::default()).unwrap();

        let result = fit.model.evaluate(&frame!("x" => [0.0, 1.0, 2.0])).unwrap();
        let expected = frame!("y" => [0.0, 1.0, 2.0], "z" => [1.0, 2.0, 3.0]);
        assert!(result.close_to(&expected, 3));
    }

    #[test]
    fn test_gp_copies_template_schema() {
        let template = smooth_template();
        let data = frame!("x" => [0.0, 1.0], "y" => [0.0, 1.0], "z" => [1.0, 2.0]);
        let fit = fit_gp(&data, &template, &GpSpec::default()).unwrap();
        assert_eq!(fit.model.inputs(), template.inputs());
        assert_eq!(fit.model.outputs(), template.outputs());
    }

    #[test]
    fn test_gp_uncertainty_extends_outputs() {
        let template = smooth_template();
        let data = frame!("x" => [0.0, 1.0], "y" => [0.0, 1.0], "z" => [1.0, 2.0]);
        let spec = GpSpec {
            uncertainty: true,
            ..GpSpec::default()
        };
        let fit = fit_gp(&data, &template, &spec).unwrap();
        assert_eq!(
            fit.model.outputs(),
            &["y", "z", "y_std", "z_std"].map(String::from)
        );

        // Std collapses near training points and grows far away.
        let near = fit.model.evaluate(&frame!("x" => [0.0])).unwrap();
        let far = fit.model.evaluate(&frame!("x" => [10.0])).unwrap();
        assert!(near.get("y_std", 0).unwrap() < 1e-3);
        assert!(far.get("y_std", 0).unwrap() > 0.5);
    }

    #[test]
    fn test_gp_missing_target_is_schema_error() {
        let template = smooth_template();
        let data = frame!("x" => [0.0, 1.0], "y" => [0.0, 1.0]);
        assert!(fit_gp(&data, &template, &GpSpec::default()).is_err());
    }
}
