//! Joint probability distributions over model inputs.
//!
//! A [`Density`] maps a subset of a model's input variables to
//! [`Marginal`] distributions and couples them through a [`Dependence`]
//! descriptor. Variables without a marginal are deterministic: they draw no
//! randomness and contribute no log-density term.

mod marginal;
pub(crate) mod special;

pub use marginal::Marginal;

use indexmap::IndexMap;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{QuantusError, Result};
use crate::frame::DataFrame;
use crate::linalg;
use special::{inverse_normal_cdf, standard_normal_cdf};

/// How marginals couple into a joint distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dependence {
    /// Marginals are mutually independent.
    Independence,
    /// Gaussian copula with the given correlation matrix, rows/columns
    /// ordered like the density's marginal variables.
    GaussianCopula { correlation: Vec<Vec<f64>> },
}

impl Default for Dependence {
    fn default() -> Self {
        Dependence::Independence
    }
}

/// Joint distribution over a model's random input variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Density {
    marginals: IndexMap<String, Marginal>,
    dependence: Dependence,
}

impl Density {
    /// An empty density: every variable deterministic.
    pub fn new() -> Self {
        Self {
            marginals: IndexMap::new(),
            dependence: Dependence::Independence,
        }
    }

    /// Set the marginal for a variable, replacing any previous entry.
    pub fn set_marginal(&mut self, name: impl Into<String>, marginal: Marginal) {
        self.marginals.insert(name.into(), marginal);
    }

    /// Install a dependence structure.
    ///
    /// A Gaussian copula is validated against the current marginal set:
    /// the correlation matrix must be square of matching size, symmetric,
    /// with unit diagonal, and positive definite.
    pub fn set_dependence(&mut self, dependence: Dependence) -> Result<()> {
        if let Dependence::GaussianCopula { correlation } = &dependence {
            self.validate_correlation(correlation)?;
        }
        self.dependence = dependence;
        Ok(())
    }

    fn validate_correlation(&self, correlation: &[Vec<f64>]) -> Result<()> {
        let k = self.marginals.len();
        if correlation.len() != k || correlation.iter().any(|row| row.len() != k) {
            return Err(QuantusError::InvalidParameter(format!(
                "copula correlation must be {k}x{k} to match the marginals"
            )));
        }
        for i in 0..k {
            if (correlation[i][i] - 1.0).abs() > 1e-12 {
                return Err(QuantusError::InvalidParameter(
                    "copula correlation diagonal must be 1".to_string(),
                ));
            }
            for j in 0..i {
                if (correlation[i][j] - correlation[j][i]).abs() > 1e-9 {
                    return Err(QuantusError::InvalidParameter(
                        "copula correlation must be symmetric".to_string(),
                    ));
                }
            }
        }
        // Positive definiteness check; the factor is recomputed on use.
        linalg::cholesky(&self.correlation_matrix(correlation))?;
        Ok(())
    }

    fn correlation_matrix(&self, correlation: &[Vec<f64>]) -> Array2<f64> {
        let k = correlation.len();
        let mut r = Array2::<f64>::zeros((k, k));
        for i in 0..k {
            for j in 0..k {
                r[[i, j]] = correlation[i][j];
            }
        }
        r
    }

    /// Variables with a declared marginal, in insertion order.
    pub fn variables(&self) -> Vec<&str> {
        self.marginals.keys().map(|s| s.as_str()).collect()
    }

    /// The marginal declared for a variable, if any.
    pub fn marginal_of(&self, name: &str) -> Option<&Marginal> {
        self.marginals.get(name)
    }

    /// The dependence structure.
    pub fn dependence(&self) -> &Dependence {
        &self.dependence
    }

    /// Whether no variable carries a marginal.
    pub fn is_empty(&self) -> bool {
        self.marginals.is_empty()
    }

    /// Marginal quantile lookup by variable name.
    pub fn quantile(&self, name: &str, p: f64) -> Result<f64> {
        let marginal = self.marginals.get(name).ok_or_else(|| {
            QuantusError::InvalidParameter(format!("no marginal declared for '{name}'"))
        })?;
        marginal.quantile(p)
    }

    /// Draw `n` joint rows over the density's variables.
    ///
    /// Independence samples each marginal by inverse transform; a Gaussian
    /// copula draws correlated standard normals (Cholesky of the
    /// correlation), maps them through the normal CDF, then through each
    /// marginal's quantile. Row-major draw order, so a seeded RNG
    /// reproduces the frame bit-for-bit.
    pub fn sample(&self, n: usize, rng: &mut fastrand::Rng) -> Result<DataFrame> {
        let names: Vec<String> = self.marginals.keys().cloned().collect();
        let k = names.len();
        let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(n); k];

        match &self.dependence {
            Dependence::Independence => {
                for _ in 0..n {
                    for (idx, marginal) in self.marginals.values().enumerate() {
                        columns[idx].push(marginal.sample(rng));
                    }
                }
            }
            Dependence::GaussianCopula { correlation } => {
                let r = self.correlation_matrix(correlation);
                let l = linalg::cholesky(&r)?;
                for _ in 0..n {
                    let z_indep: Array1<f64> = (0..k)
                        .map(|_| {
                            let p = rng.f64().clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON);
                            inverse_normal_cdf(p)
                        })
                        .collect();
                    let z = l.dot(&z_indep);
                    for (idx, marginal) in self.marginals.values().enumerate() {
                        let u = standard_normal_cdf(z[idx])
                            .clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON);
                        columns[idx].push(marginal.quantile(u)?);
                    }
                }
            }
        }

        let mut frame = DataFrame::new();
        for (name, values) in names.into_iter().zip(columns) {
            frame.push_column(name, values)?;
        }
        Ok(frame)
    }

    /// Joint log-density of a row.
    ///
    /// `names`/`values` are parallel; variables without a marginal are
    /// skipped (deterministic, no density term). Under a Gaussian copula
    /// the sum of marginal log-densities is adjusted by the copula log
    /// density `-(1/2) ln det R - (1/2) zᵀ(R⁻¹ - I) z`.
    pub fn log_density(&self, names: &[String], values: &[f64]) -> Result<f64> {
        let mut total = 0.0;
        let mut z = Vec::with_capacity(self.marginals.len());

        for (name, marginal) in &self.marginals {
            let Some(idx) = names.iter().position(|n| n == name) else {
                return Err(QuantusError::missing_columns(
                    "log_density requires every density variable",
                    vec![name.clone()],
                ));
            };
            let x = values[idx];
            total += marginal.log_density(x);
            if matches!(self.dependence, Dependence::GaussianCopula { .. }) {
                let u = marginal.cdf(x).clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON);
                z.push(inverse_normal_cdf(u));
            }
        }

        if let Dependence::GaussianCopula { correlation } = &self.dependence {
            let r = self.correlation_matrix(correlation);
            let l = linalg::cholesky(&r)?;
            let z = Array1::from(z);
            let r_inv_z = linalg::cholesky_solve(&l, &z);
            let quad = z.dot(&r_inv_z) - z.dot(&z);
            total += -0.5 * linalg::cholesky_log_det(&l) - 0.5 * quad;
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_var_density() -> Density {
        let mut density = Density::new();
        density.set_marginal("x", Marginal::uniform(0.0, 2.0).unwrap());
        density.set_marginal("y", Marginal::normal(0.0, 1.0).unwrap());
        density
    }

    #[test]
    fn test_sample_shape_and_support() {
        let density = two_var_density();
        let mut rng = fastrand::Rng::with_seed(3);
        let draws = density.sample(50, &mut rng).unwrap();
        assert_eq!(draws.n_rows(), 50);
        assert_eq!(draws.names(), vec!["x", "y"]);
        assert!(draws.column("x").unwrap().iter().all(|&v| (0.0..=2.0).contains(&v)));
    }

    #[test]
    fn test_sample_seed_reproducible() {
        let density = two_var_density();
        let a = density
            .sample(20, &mut fastrand::Rng::with_seed(11))
            .unwrap();
        let b = density
            .sample(20, &mut fastrand::Rng::with_seed(11))
            .unwrap();
        assert!(a.equals(&b));
    }

    #[test]
    fn test_log_density_independence_sums() {
        let density = two_var_density();
        let names = vec!["x".to_string(), "y".to_string()];
        let ld = density.log_density(&names, &[1.0, 0.0]).unwrap();
        let expected = Marginal::uniform(0.0, 2.0).unwrap().log_density(1.0)
            + Marginal::normal(0.0, 1.0).unwrap().log_density(0.0);
        assert!((ld - expected).abs() < 1e-12);
    }

    #[test]
    fn test_deterministic_variable_contributes_nothing() {
        let mut density = Density::new();
        density.set_marginal("x", Marginal::uniform(0.0, 1.0).unwrap());
        let names = vec!["x".to_string(), "t".to_string()];
        // 't' has no marginal; only x's term appears.
        let ld = density.log_density(&names, &[0.5, 123.0]).unwrap();
        assert!((ld - 0.0).abs() < 1e-12); // ln(1/1) = 0
    }

    #[test]
    fn test_copula_validation() {
        let mut density = two_var_density();
        // Wrong size
        assert!(density
            .set_dependence(Dependence::GaussianCopula {
                correlation: vec![vec![1.0]],
            })
            .is_err());
        // Not unit diagonal
        assert!(density
            .set_dependence(Dependence::GaussianCopula {
                correlation: vec![vec![2.0, 0.0], vec![0.0, 1.0]],
            })
            .is_err());
        // Valid
        assert!(density
            .set_dependence(Dependence::GaussianCopula {
                correlation: vec![vec![1.0, 0.5], vec![0.5, 1.0]],
            })
            .is_ok());
    }

    #[test]
    fn test_copula_log_density_reduces_to_independence_at_zero_corr() {
        let mut with_copula = two_var_density();
        with_copula
            .set_dependence(Dependence::GaussianCopula {
                correlation: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            })
            .unwrap();
        let independent = two_var_density();

        let names = vec!["x".to_string(), "y".to_string()];
        let row = [0.7, -0.3];
        let a = with_copula.log_density(&names, &row).unwrap();
        let b = independent.log_density(&names, &row).unwrap();
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_copula_sampling_correlates() {
        let mut density = Density::new();
        density.set_marginal("a", Marginal::normal(0.0, 1.0).unwrap());
        density.set_marginal("b", Marginal::normal(0.0, 1.0).unwrap());
        density
            .set_dependence(Dependence::GaussianCopula {
                correlation: vec![vec![1.0, 0.9], vec![0.9, 1.0]],
            })
            .unwrap();

        let mut rng = fastrand::Rng::with_seed(42);
        let draws = density.sample(400, &mut rng).unwrap();
        let a = draws.column("a").unwrap();
        let b = draws.column("b").unwrap();
        let n = a.len() as f64;
        let mean_a = a.iter().sum::<f64>() / n;
        let mean_b = b.iter().sum::<f64>() / n;
        let cov = a
            .iter()
            .zip(b)
            .map(|(&x, &y)| (x - mean_a) * (y - mean_b))
            .sum::<f64>()
            / n;
        let var_a = a.iter().map(|&x| (x - mean_a).powi(2)).sum::<f64>() / n;
        let var_b = b.iter().map(|&y| (y - mean_b).powi(2)).sum::<f64>() / n;
        let corr = cov / (var_a * var_b).sqrt();
        assert!(corr > 0.7, "sample correlation {corr}");
    }
}
