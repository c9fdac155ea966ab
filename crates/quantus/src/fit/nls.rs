//! Nonlinear-least-squares calibration.
//!
//! The template's inputs split into observed variables (present as data
//! columns) and fit parameters (absent). Levenberg-Marquardt minimizes the
//! summed squared residual over the free parameters, with box projection
//! onto the template's bounds. The produced Model keeps the template's
//! function and schema but carries a density over the *fitted parameters*:
//! the linearized covariance `sigma^2 (J^T J)^-1` becomes one Normal
//! marginal per free parameter plus a Gaussian copula holding the
//! parameter correlations, so downstream Monte Carlo propagates the
//! calibration uncertainty.

use ndarray::{Array1, Array2};

use crate::density::{Density, Dependence, Marginal};
use crate::error::{QuantusError, Result};
use crate::frame::DataFrame;
use crate::linalg;
use crate::model::Model;
use super::{design_matrix, FitOutcome, FitWarning};

/// Options for [`fit_nls`].
#[derive(Debug, Clone)]
pub struct NlsSpec {
    /// Outer Levenberg-Marquardt iteration budget.
    pub max_iter: usize,
    /// Relative tolerance on the step and on the residual decrease.
    pub tol: f64,
}

impl Default for NlsSpec {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-8,
        }
    }
}

/// Where each template input draws its value during calibration.
enum InputSource {
    /// Data column, by index into the observed design matrix.
    Observed(usize),
    /// Free parameter, by index into the parameter vector.
    Free(usize),
    /// Parameter pinned by a degenerate bound.
    Fixed(f64),
}

struct Problem<'a> {
    template: &'a Model,
    sources: Vec<InputSource>,
    observed: Array2<f64>,
    targets: Array2<f64>,
    bounds: Vec<(f64, f64)>,
}

impl Problem<'_> {
    fn n_rows(&self) -> usize {
        self.targets.nrows()
    }

    fn n_residuals(&self) -> usize {
        self.targets.nrows() * self.targets.ncols()
    }

    /// Residual vector `f(x_i, theta) - y_i`, stacked row-major.
    fn residuals(&self, theta: &[f64]) -> Result<Array1<f64>> {
        let mut r = Array1::<f64>::zeros(self.n_residuals());
        let mut inputs = vec![0.0; self.sources.len()];
        for row in 0..self.n_rows() {
            for (slot, source) in inputs.iter_mut().zip(&self.sources) {
                *slot = match source {
                    InputSource::Observed(col) => self.observed[[row, *col]],
                    InputSource::Free(idx) => theta[*idx],
                    InputSource::Fixed(value) => *value,
                };
            }
            let predicted =
                self.template
                    .function()
                    .call(&inputs)
                    .map_err(|message| QuantusError::Fit {
                        family: "nls".to_string(),
                        message: format!("model function failed at row {row}: {message}"),
                    })?;
            for (k, &value) in predicted.iter().enumerate() {
                r[row * self.targets.ncols() + k] = value - self.targets[[row, k]];
            }
        }
        Ok(r)
    }

    /// Forward-difference Jacobian of the residuals in the free
    /// parameters.
    fn jacobian(&self, theta: &[f64]) -> Result<Array2<f64>> {
        let base = self.residuals(theta)?;
        let p = theta.len();
        let mut j = Array2::<f64>::zeros((base.len(), p));
        let mut perturbed = theta.to_vec();
        for col in 0..p {
            let h = 1e-6 * theta[col].abs().max(1.0);
            perturbed[col] = theta[col] + h;
            let shifted = self.residuals(&perturbed)?;
            perturbed[col] = theta[col];
            for row in 0..base.len() {
                j[[row, col]] = (shifted[row] - base[row]) / h;
            }
        }
        Ok(j)
    }

    fn project(&self, theta: &mut [f64]) {
        for (value, &(lo, hi)) in theta.iter_mut().zip(&self.bounds) {
            *value = value.clamp(lo, hi);
        }
    }
}

fn sum_of_squares(r: &Array1<f64>) -> f64 {
    r.dot(r)
}

/// Scale-invariant rank check of the Gram matrix `J^T J`.
///
/// The correlation-normalized matrix is factored; a failed factorization
/// or a pivot below `1e-4` (against a unit diagonal) marks a direction of
/// parameter space the residuals barely respond to.
fn rank_deficient(jtj: &Array2<f64>) -> bool {
    let p = jtj.nrows();
    let mut normalized = Array2::<f64>::zeros((p, p));
    for i in 0..p {
        for j in 0..p {
            let scale = (jtj[[i, i]] * jtj[[j, j]]).sqrt();
            normalized[[i, j]] = jtj[[i, j]] / scale;
        }
    }
    match linalg::cholesky(&normalized) {
        Err(_) => true,
        Ok(l) => (0..p).any(|i| l[[i, i]] < 1e-4),
    }
}

/// Solve the damped normal equations `(J^T J + lambda diag(J^T J)) d = -g`,
/// escalating an absolute ridge when the damped matrix still fails to
/// factor (fully degenerate columns).
fn damped_step(jtj: &Array2<f64>, g: &Array1<f64>, lambda: f64) -> Option<Array1<f64>> {
    let p = jtj.nrows();
    let trace_avg = (0..p).map(|i| jtj[[i, i]]).sum::<f64>() / p as f64;
    let mut ridge = 0.0;
    for _ in 0..8 {
        let mut damped = jtj.clone();
        for i in 0..p {
            damped[[i, i]] += lambda * jtj[[i, i]].max(f64::MIN_POSITIVE) + ridge;
        }
        if let Ok(chol) = linalg::cholesky(&damped) {
            let neg_g = g.mapv(|v| -v);
            return Some(linalg::cholesky_solve(&chol, &neg_g));
        }
        ridge = if ridge == 0.0 {
            1e-10 * trace_avg.max(f64::MIN_POSITIVE)
        } else {
            ridge * 100.0
        };
    }
    None
}

/// Calibrate the template's missing inputs against observed data.
///
/// Every template output must appear as a data column (the fitting
/// targets); template inputs found in the data are observed variables, the
/// rest are the parameters to fit. Parameter start values and the box
/// constraints come from the template's bounds; a degenerate `lo == hi`
/// bound pins the parameter.
///
/// Rank deficiency of the parameter Jacobian (structural
/// unidentifiability) and iteration-budget exhaustion are recoverable
/// warnings on the outcome, not errors: the fit still returns a
/// best-effort Model.
pub fn fit_nls(frame: &DataFrame, template: &Model, spec: &NlsSpec) -> Result<FitOutcome> {
    let missing: Vec<String> = template
        .outputs()
        .iter()
        .filter(|name| !frame.has_column(name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(QuantusError::missing_columns("nls fitting targets", missing));
    }
    if frame.n_rows() == 0 {
        return Err(QuantusError::Fit {
            family: "nls".to_string(),
            message: "training frame has no rows".to_string(),
        });
    }

    // Split inputs into observed columns and parameters.
    let observed_names: Vec<String> = template
        .inputs()
        .iter()
        .filter(|name| frame.has_column(name))
        .cloned()
        .collect();
    let mut sources = Vec::with_capacity(template.inputs().len());
    let mut free_names: Vec<String> = Vec::new();
    let mut theta: Vec<f64> = Vec::new();
    let mut bounds: Vec<(f64, f64)> = Vec::new();

    for name in template.inputs() {
        if let Some(col) = observed_names.iter().position(|n| n == name) {
            sources.push(InputSource::Observed(col));
            continue;
        }
        let bound = template.domain().bounds_of(name);
        match bound {
            Some(b) if b.lo == b.hi => {
                sources.push(InputSource::Fixed(b.lo));
            }
            Some(b) => {
                sources.push(InputSource::Free(free_names.len()));
                free_names.push(name.clone());
                theta.push(b.midpoint().unwrap_or(0.0));
                bounds.push((b.lo, b.hi));
            }
            None => {
                sources.push(InputSource::Free(free_names.len()));
                free_names.push(name.clone());
                theta.push(0.0);
                bounds.push((f64::NEG_INFINITY, f64::INFINITY));
            }
        }
    }

    if free_names.is_empty() {
        return Err(QuantusError::Fit {
            family: "nls".to_string(),
            message: "no free parameters: every input is observed or pinned".to_string(),
        });
    }

    let problem = Problem {
        template,
        sources,
        observed: design_matrix(frame, &observed_names)?,
        targets: design_matrix(frame, template.outputs())?,
        bounds,
    };

    let mut warnings = Vec::new();

    // Levenberg-Marquardt with box projection.
    let mut residual = problem.residuals(&theta)?;
    let mut ssr = sum_of_squares(&residual);
    let mut lambda = 1e-3;
    let mut converged = false;

    for _ in 0..spec.max_iter {
        let jacobian = problem.jacobian(&theta)?;
        let jtj = jacobian.t().dot(&jacobian);
        let gradient = jacobian.t().dot(&residual);

        let mut accepted = false;
        for _ in 0..12 {
            let Some(step) = damped_step(&jtj, &gradient, lambda) else {
                lambda *= 10.0;
                continue;
            };
            let mut candidate = theta.clone();
            for (value, delta) in candidate.iter_mut().zip(step.iter()) {
                *value += delta;
            }
            problem.project(&mut candidate);

            let candidate_residual = problem.residuals(&candidate)?;
            let candidate_ssr = sum_of_squares(&candidate_residual);
            if candidate_ssr < ssr {
                let step_small = theta
                    .iter()
                    .zip(&candidate)
                    .all(|(&a, &b)| (a - b).abs() <= spec.tol * (1.0 + a.abs()));
                let decrease_small = (ssr - candidate_ssr) <= spec.tol * ssr.max(spec.tol);

                theta = candidate;
                residual = candidate_residual;
                ssr = candidate_ssr;
                lambda = (lambda * 0.1).max(1e-12);
                accepted = true;

                if step_small || decrease_small {
                    converged = true;
                }
                break;
            }
            lambda *= 10.0;
        }

        if converged {
            break;
        }
        if !accepted {
            // No downhill step at any damping: treat as converged to the
            // current point.
            converged = true;
            break;
        }
    }

    if !converged {
        warnings.push(FitWarning::NoConvergence {
            iterations: spec.max_iter,
        });
    }

    // Linearized parameter covariance.
    let jacobian = problem.jacobian(&theta)?;
    let jtj = jacobian.t().dot(&jacobian);
    let p = free_names.len();
    let n_res = problem.n_residuals();

    if rank_deficient(&jtj) {
        warnings.push(FitWarning::Unidentifiable {
            details: format!(
                "parameter Jacobian is rank-deficient over {}",
                free_names.join(", ")
            ),
        });
    }

    let sigma2 = if n_res > p {
        ssr / (n_res - p) as f64
    } else {
        ssr.max(f64::MIN_POSITIVE)
    };

    // Ridge-stabilized inverse when the Gram matrix will not factor. A
    // Gram matrix no ridge can repair (NaN entries) falls through to the
    // all-zero covariance, which the marginal construction below treats
    // as degenerate.
    let trace_avg = (0..p).map(|i| jtj[[i, i]]).sum::<f64>() / p as f64;
    let mut ridge = 1e-10 * trace_avg.max(f64::MIN_POSITIVE);
    let mut covariance = Array2::<f64>::zeros((p, p));
    let mut stabilized = jtj.clone();
    for attempt in 0..64 {
        if attempt > 0 {
            stabilized = jtj.clone();
            for i in 0..p {
                stabilized[[i, i]] += ridge;
            }
            ridge *= 100.0;
        }
        if let Ok(chol) = linalg::cholesky(&stabilized) {
            covariance = linalg::cholesky_inverse(&chol) * sigma2;
            break;
        }
    }

    // Density over the fitted parameters.
    let mut density = Density::new();
    let mut stds = Vec::with_capacity(p);
    for (idx, name) in free_names.iter().enumerate() {
        let variance = covariance[[idx, idx]].max(0.0);
        let mut std = variance.sqrt();
        if !std.is_finite() || std <= 0.0 {
            std = f64::EPSILON.sqrt() * (1.0 + theta[idx].abs());
            warnings.push(FitWarning::DegenerateDensity {
                details: format!("parameter '{name}' has a degenerate variance estimate"),
            });
        }
        stds.push(std);
        density.set_marginal(name.clone(), Marginal::normal(theta[idx], std)?);
    }

    if p >= 2 {
        let mut correlation = vec![vec![0.0; p]; p];
        for i in 0..p {
            for j in 0..p {
                if i == j {
                    correlation[i][j] = 1.0;
                } else {
                    correlation[i][j] =
                        (covariance[[i, j]] / (stds[i] * stds[j])).clamp(-1.0, 1.0);
                }
            }
        }
        if density
            .set_dependence(Dependence::GaussianCopula { correlation })
            .is_err()
        {
            warnings.push(FitWarning::DegenerateDensity {
                details: "parameter correlation is not positive definite; using independence"
                    .to_string(),
            });
        }
    }

    let model = template
        .with_density(density)?
        .renamed(format!("{}_nls", template.name()));

    Ok(FitOutcome { model, warnings })
}
