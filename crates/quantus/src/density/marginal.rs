//! Single-variable marginal distributions.

use serde::{Deserialize, Serialize};

use crate::error::{QuantusError, Result};
use super::special::{inverse_normal_cdf, standard_normal_cdf, FRAC_1_SQRT_2PI};

/// A marginal distribution family with validated parameters.
///
/// Construct through the family constructors ([`Marginal::uniform`],
/// [`Marginal::normal`], [`Marginal::log_normal`]), which reject invalid
/// parameters up front. Sampling is inverse-transform (a uniform draw mapped
/// through [`Marginal::quantile`]), so samples inherit the quantile
/// function's monotonicity and a seeded RNG reproduces exactly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Marginal {
    /// Continuous uniform on `[lo, hi]`.
    Uniform { lo: f64, hi: f64 },
    /// Normal with mean and standard deviation.
    Normal { mean: f64, std: f64 },
    /// Log-normal; `mu`/`sigma` are the log-scale parameters.
    LogNormal { mu: f64, sigma: f64 },
}

impl Marginal {
    /// Uniform marginal on `[lo, hi]`; requires finite `lo < hi`.
    pub fn uniform(lo: f64, hi: f64) -> Result<Self> {
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(QuantusError::InvalidParameter(format!(
                "uniform requires finite lo < hi (got [{lo}, {hi}])"
            )));
        }
        Ok(Marginal::Uniform { lo, hi })
    }

    /// Normal marginal; requires finite mean and `std > 0`.
    pub fn normal(mean: f64, std: f64) -> Result<Self> {
        if !mean.is_finite() || !std.is_finite() || std <= 0.0 {
            return Err(QuantusError::InvalidParameter(format!(
                "normal requires finite mean and std > 0 (got mean={mean}, std={std})"
            )));
        }
        Ok(Marginal::Normal { mean, std })
    }

    /// Log-normal marginal; `mu`/`sigma` on the log scale, `sigma > 0`.
    pub fn log_normal(mu: f64, sigma: f64) -> Result<Self> {
        if !mu.is_finite() || !sigma.is_finite() || sigma <= 0.0 {
            return Err(QuantusError::InvalidParameter(format!(
                "log-normal requires finite mu and sigma > 0 (got mu={mu}, sigma={sigma})"
            )));
        }
        Ok(Marginal::LogNormal { mu, sigma })
    }

    /// Quantile function; monotonic in `p` for every family.
    ///
    /// Uniform and log-normal quantiles are closed-form; the normal
    /// quantile uses Acklam's rational approximation (see
    /// [`super::special`]).
    pub fn quantile(&self, p: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&p) || p.is_nan() {
            return Err(QuantusError::InvalidParameter(format!(
                "quantile probability must lie in [0, 1] (got {p})"
            )));
        }
        let value = match *self {
            Marginal::Uniform { lo, hi } => lo + p * (hi - lo),
            Marginal::Normal { mean, std } => mean + std * inverse_normal_cdf(p),
            Marginal::LogNormal { mu, sigma } => (mu + sigma * inverse_normal_cdf(p)).exp(),
        };
        Ok(value)
    }

    /// Cumulative probability of `x`.
    pub fn cdf(&self, x: f64) -> f64 {
        match *self {
            Marginal::Uniform { lo, hi } => ((x - lo) / (hi - lo)).clamp(0.0, 1.0),
            Marginal::Normal { mean, std } => standard_normal_cdf((x - mean) / std),
            Marginal::LogNormal { mu, sigma } => {
                if x <= 0.0 {
                    0.0
                } else {
                    standard_normal_cdf((x.ln() - mu) / sigma)
                }
            }
        }
    }

    /// Natural log of the density at `x`; `-inf` outside the support.
    pub fn log_density(&self, x: f64) -> f64 {
        match *self {
            Marginal::Uniform { lo, hi } => {
                if x < lo || x > hi {
                    f64::NEG_INFINITY
                } else {
                    -(hi - lo).ln()
                }
            }
            Marginal::Normal { mean, std } => {
                let z = (x - mean) / std;
                FRAC_1_SQRT_2PI.ln() - std.ln() - 0.5 * z * z
            }
            Marginal::LogNormal { mu, sigma } => {
                if x <= 0.0 {
                    f64::NEG_INFINITY
                } else {
                    let z = (x.ln() - mu) / sigma;
                    FRAC_1_SQRT_2PI.ln() - sigma.ln() - x.ln() - 0.5 * z * z
                }
            }
        }
    }

    /// Distribution mean.
    pub fn mean(&self) -> f64 {
        match *self {
            Marginal::Uniform { lo, hi } => 0.5 * (lo + hi),
            Marginal::Normal { mean, .. } => mean,
            Marginal::LogNormal { mu, sigma } => (mu + 0.5 * sigma * sigma).exp(),
        }
    }

    /// Nominal value: the median.
    pub fn nominal(&self) -> f64 {
        match *self {
            Marginal::Uniform { lo, hi } => 0.5 * (lo + hi),
            Marginal::Normal { mean, .. } => mean,
            Marginal::LogNormal { mu, .. } => mu.exp(),
        }
    }

    /// Draw one value by inverse transform.
    ///
    /// The uniform draw is nudged into the open interval so infinite
    /// quantiles cannot occur.
    pub fn sample(&self, rng: &mut fastrand::Rng) -> f64 {
        let p = rng.f64().clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON);
        // Range-checked above, cannot fail.
        self.quantile(p).unwrap_or(f64::NAN)
    }

    /// Lower and upper support endpoints (possibly infinite).
    pub fn support(&self) -> (f64, f64) {
        match *self {
            Marginal::Uniform { lo, hi } => (lo, hi),
            Marginal::Normal { .. } => (f64::NEG_INFINITY, f64::INFINITY),
            Marginal::LogNormal { .. } => (0.0, f64::INFINITY),
        }
    }
}
