//! Admissible-value bounds for model inputs.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{QuantusError, Result};

/// An admissible interval for one variable.
///
/// Unbounded ends are represented with infinities, so `contains` is a plain
/// interval check for every bound kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub lo: f64,
    pub hi: f64,
}

impl Bound {
    /// Create an ordered bound. `lo == hi` pins the variable to one value.
    pub fn new(lo: f64, hi: f64) -> Result<Self> {
        if lo.is_nan() || hi.is_nan() {
            return Err(QuantusError::InvalidParameter(format!(
                "bound endpoints must not be NaN (got [{lo}, {hi}])"
            )));
        }
        if lo > hi {
            return Err(QuantusError::InvalidParameter(format!(
                "bound must be ordered: lo <= hi (got [{lo}, {hi}])"
            )));
        }
        Ok(Self { lo, hi })
    }

    /// The fully unconstrained bound `(-inf, +inf)`.
    pub fn unbounded() -> Self {
        Self {
            lo: f64::NEG_INFINITY,
            hi: f64::INFINITY,
        }
    }

    /// Whether a value lies inside the interval (inclusive).
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lo && value <= self.hi
    }

    /// Whether both ends are finite.
    pub fn is_finite(&self) -> bool {
        self.lo.is_finite() && self.hi.is_finite()
    }

    /// Interval midpoint, available only for doubly-finite bounds.
    pub fn midpoint(&self) -> Option<f64> {
        self.is_finite().then(|| 0.5 * (self.lo + self.hi))
    }
}

/// A bound violation found while checking a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundViolation {
    pub variable: String,
    pub value: f64,
    pub lo: f64,
    pub hi: f64,
}

/// Admissible bounds for a set of variables.
///
/// Every tracked variable has exactly one entry; variables without an entry
/// are unconstrained. Insertion order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    bounds: IndexMap<String, Bound>,
}

impl Domain {
    /// Create an empty domain (every variable unconstrained).
    pub fn new() -> Self {
        Self {
            bounds: IndexMap::new(),
        }
    }

    /// Set the bound for a variable, replacing any previous entry.
    pub fn set(&mut self, name: impl Into<String>, bound: Bound) {
        self.bounds.insert(name.into(), bound);
    }

    /// The bound declared for a variable, if any.
    pub fn bounds_of(&self, name: &str) -> Option<Bound> {
        self.bounds.get(name).copied()
    }

    /// Names with a declared bound, in insertion order.
    pub fn variables(&self) -> Vec<&str> {
        self.bounds.keys().map(|s| s.as_str()).collect()
    }

    /// True iff every named value lies within its declared bound.
    ///
    /// `names` and `values` are parallel slices, as produced by
    /// [`crate::DataFrame::gather_row`].
    pub fn contains(&self, names: &[String], values: &[f64]) -> bool {
        names.iter().zip(values).all(|(name, &value)| {
            self.bounds
                .get(name)
                .map_or(true, |bound| bound.contains(value))
        })
    }

    /// All bound violations in a row. Empty means the row is admissible.
    pub fn violations(&self, names: &[String], values: &[f64]) -> Vec<BoundViolation> {
        names
            .iter()
            .zip(values)
            .filter_map(|(name, &value)| {
                let bound = self.bounds.get(name)?;
                (!bound.contains(value)).then(|| BoundViolation {
                    variable: name.clone(),
                    value,
                    lo: bound.lo,
                    hi: bound.hi,
                })
            })
            .collect()
    }

    /// Nominal value for a variable: the bound midpoint.
    ///
    /// None when the variable is unbounded on either end or has no entry;
    /// callers fall back to the density or report the variable as
    /// unresolvable.
    pub fn nominal_of(&self, name: &str) -> Option<f64> {
        self.bounds.get(name).and_then(|b| b.midpoint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_ordering_enforced() {
        assert!(Bound::new(1.0, 0.0).is_err());
        assert!(Bound::new(0.0, 0.0).is_ok());
        assert!(Bound::new(f64::NEG_INFINITY, 3.0).is_ok());
    }

    #[test]
    fn test_unbounded_contains_everything() {
        let b = Bound::unbounded();
        assert!(b.contains(f64::MIN));
        assert!(b.contains(0.0));
        assert!(b.contains(f64::MAX));
        assert!(b.midpoint().is_none());
    }

    #[test]
    fn test_contains_and_violations() {
        let mut domain = Domain::new();
        domain.set("x", Bound::new(-1.0, 1.0).unwrap());
        let names = vec!["x".to_string(), "y".to_string()];

        assert!(domain.contains(&names, &[0.5, 99.0]));
        assert!(!domain.contains(&names, &[1.5, 0.0]));

        let violations = domain.violations(&names, &[1.5, 0.0]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].variable, "x");
        assert_eq!(violations[0].value, 1.5);
    }

    #[test]
    fn test_nominal_is_midpoint() {
        let mut domain = Domain::new();
        domain.set("c", Bound::new(0.0, 4.0).unwrap());
        assert_eq!(domain.nominal_of("c"), Some(2.0));
        assert_eq!(domain.nominal_of("missing"), None);
    }
}
