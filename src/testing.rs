//! Testing utilities for linear-oblivious-tree.
//!
//! Assertion helpers shared by unit tests, integration tests and benches.
//!
//! ```ignore
//! use linear_oblivious_tree::testing::{assert_predictions_eq, DEFAULT_TOLERANCE_F64};
//! ```

use approx::AbsDiffEq;
use ndarray::ArrayView1;

// =============================================================================
// Constants
// =============================================================================

/// Default tolerance for comparing model outputs of order 1.
pub const DEFAULT_TOLERANCE_F64: f64 = 1e-5;

// =============================================================================
// Slice Assertions
// =============================================================================

/// Assert that two f64 slices are approximately equal element-wise.
///
/// # Panics
///
/// Panics if lengths differ or any element differs by more than `tolerance`.
pub fn assert_slice_approx_eq_f64(actual: &[f64], expected: &[f64], tolerance: f64, context: &str) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{context}: length mismatch - got {}, expected {}",
        actual.len(),
        expected.len()
    );

    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        let diff = (a - e).abs();
        assert!(
            diff <= tolerance,
            "{context}[{i}]: {a} ≠ {e} (diff={diff}, tolerance={tolerance})"
        );
    }
}

// =============================================================================
// Prediction Assertions
// =============================================================================

/// Git-style diff of the rows that differ by more than `epsilon`.
fn diff_predictions(actual: ArrayView1<'_, f64>, expected: &[f64], epsilon: f64) -> String {
    let mut result = format!("Rows: {}\nEpsilon: {epsilon:.0e}\n\n", expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        if !a.abs_diff_eq(e, epsilon) {
            result.push_str(&format!("[{i:3}] - {e:>12.6}  (expected)\n"));
            result.push_str(&format!("      + {a:>12.6}  (actual, Δ={:+.2e})\n", a - e));
        }
    }
    result
}

/// Assert that batch predictions match `expected` within `epsilon`.
///
/// On failure, shows a diff of the differing rows.
///
/// # Panics
///
/// Panics if lengths differ or any value differs by more than `epsilon`.
pub fn assert_predictions_eq(actual: ArrayView1<'_, f64>, expected: &[f64], epsilon: f64) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "prediction length mismatch - got {}, expected {}",
        actual.len(),
        expected.len()
    );
    let all_close = actual
        .iter()
        .zip(expected)
        .all(|(a, e)| a.abs_diff_eq(e, epsilon));
    if !all_close {
        panic!(
            "predictions differ:\n{}",
            diff_predictions(actual, expected, epsilon)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_slice_approx_eq_passes() {
        assert_slice_approx_eq_f64(&[1.0, 2.0], &[1.0 + 1e-7, 2.0], DEFAULT_TOLERANCE_F64, "ok");
    }

    #[test]
    #[should_panic(expected = "ctx[1]")]
    fn test_slice_approx_eq_reports_index() {
        assert_slice_approx_eq_f64(&[1.0, 2.0], &[1.0, 2.5], 1e-3, "ctx");
    }

    #[test]
    #[should_panic(expected = "predictions differ")]
    fn test_predictions_diff() {
        let actual = array![1.0, 2.0, 3.0];
        assert_predictions_eq(actual.view(), &[1.0, 2.1, 3.0], 1e-3);
    }
}
