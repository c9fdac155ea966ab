//! Frame comparison with and without numeric tolerance.

use super::DataFrame;

impl DataFrame {
    /// Exact equality: same column set, same row count, bitwise-equal
    /// values, with NaN treated as equal to NaN.
    ///
    /// Column *order* is not compared; frames are keyed by name.
    pub fn equals(&self, other: &DataFrame) -> bool {
        self.compare(other, |a, b| a == b || (a.is_nan() && b.is_nan()))
    }

    /// Tolerant equality: values match within `0.5 * 10^-precision`.
    ///
    /// `precision` is the number of decimal places that must agree, the
    /// convention the test suite uses throughout (`close_to(&expected, 3)`
    /// accepts differences below 5e-4).
    pub fn close_to(&self, other: &DataFrame, precision: i32) -> bool {
        let tol = 0.5 * 10f64.powi(-precision);
        self.compare(other, |a, b| {
            (a - b).abs() <= tol || (a.is_nan() && b.is_nan())
        })
    }

    fn compare(&self, other: &DataFrame, cell_eq: impl Fn(f64, f64) -> bool) -> bool {
        if self.n_cols() != other.n_cols() || self.n_rows() != other.n_rows() {
            return false;
        }
        for (name, values) in self.iter() {
            let Some(theirs) = other.column(name) else {
                return false;
            };
            if !values
                .iter()
                .zip(theirs.iter())
                .all(|(&a, &b)| cell_eq(a, b))
            {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::frame;

    #[test]
    fn test_equals_ignores_column_order() {
        let a = frame!("x" => [1.0, 2.0], "y" => [3.0, 4.0]);
        let b = frame!("y" => [3.0, 4.0], "x" => [1.0, 2.0]);
        assert!(a.equals(&b));
    }

    #[test]
    fn test_equals_detects_value_difference() {
        let a = frame!("x" => [1.0]);
        let b = frame!("x" => [1.5]);
        assert!(!a.equals(&b));
    }

    #[test]
    fn test_equals_detects_missing_column() {
        let a = frame!("x" => [1.0]);
        let b = frame!("z" => [1.0]);
        assert!(!a.equals(&b));
    }

    #[test]
    fn test_close_to_precision() {
        let a = frame!("x" => [1.0]);
        let b = frame!("x" => [1.0004]);
        assert!(a.close_to(&b, 3));
        assert!(!a.close_to(&b, 4));
    }

    #[test]
    fn test_nan_equal_to_nan() {
        let a = frame!("x" => [f64::NAN]);
        let b = frame!("x" => [f64::NAN]);
        assert!(a.equals(&b));
        assert!(a.close_to(&b, 6));
    }
}
