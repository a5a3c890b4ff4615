//! Polynomial fitting of fiber trajectories.
//!
//! Ordinary least squares on the Vandermonde design matrix, solved through
//! SVD. Coefficients are ordered lowest degree first, matching the
//! persisted `fitparms` layout.

use nalgebra::{DMatrix, DVector};

/// Fit `ys` as a polynomial in `xs` of the given degree.
///
/// Returns `degree + 1` coefficients, constant term first, or `None` when
/// the inputs are too short (fewer than `degree + 1` points), mismatched,
/// or the solve fails. Unweighted.
pub fn fit_polynomial(xs: &[f64], ys: &[f64], degree: usize) -> Option<Vec<f64>> {
    if xs.len() != ys.len() || xs.len() < degree + 1 {
        return None;
    }

    let mut design = DMatrix::zeros(xs.len(), degree + 1);
    for (i, &x) in xs.iter().enumerate() {
        let mut power = 1.0;
        for j in 0..=degree {
            design[(i, j)] = power;
            power *= x;
        }
    }

    let rhs = DVector::from_column_slice(ys);
    let svd = design.svd(true, true);
    // Relative cutoff in the manner of lstsq's rcond: raw column
    // coordinates make the Vandermonde matrix badly conditioned, and tiny
    // singular values only inject noise into the solution.
    let max_sv = svd.singular_values.iter().fold(0.0_f64, |a, &b| a.max(b));
    let eps = max_sv * xs.len() as f64 * f64::EPSILON;
    svd.solve(&rhs, eps)
        .ok()
        .map(|coeffs| coeffs.iter().copied().collect())
}

/// Evaluate a lowest-degree-first polynomial at `x` (Horner form).
pub fn eval_polynomial(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_recovers_line() {
        let xs: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| 3.0 + 0.25 * x).collect();
        let coeffs = fit_polynomial(&xs, &ys, 1).unwrap();
        assert_eq!(coeffs.len(), 2);
        assert_relative_eq!(coeffs[0], 3.0, epsilon = 1e-8);
        assert_relative_eq!(coeffs[1], 0.25, epsilon = 1e-8);
    }

    #[test]
    fn test_fit_recovers_cubic() {
        let xs: Vec<f64> = (0..100).map(|i| i as f64 * 0.1).collect();
        let truth = [1.0, -2.0, 0.5, 0.125];
        let ys: Vec<f64> = xs.iter().map(|&x| eval_polynomial(&truth, x)).collect();
        let coeffs = fit_polynomial(&xs, &ys, 3).unwrap();
        for (fitted, expected) in coeffs.iter().zip(truth.iter()) {
            assert_relative_eq!(*fitted, *expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_fit_overdetermined_degree_predicts() {
        // Linear data fitted with a higher degree still predicts well.
        let xs: Vec<f64> = (0..200).map(|i| 1800.0 + i as f64 * 2.0).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| 2000.0 + 0.01 * x).collect();
        let coeffs = fit_polynomial(&xs, &ys, 3).unwrap();
        for (&x, &y) in xs.iter().zip(ys.iter()) {
            assert_relative_eq!(eval_polynomial(&coeffs, x), y, epsilon = 0.05);
        }
    }

    #[test]
    fn test_fit_rejects_short_input() {
        assert!(fit_polynomial(&[0.0, 1.0], &[1.0, 2.0], 5).is_none());
        assert!(fit_polynomial(&[0.0, 1.0], &[1.0], 1).is_none());
    }

    #[test]
    fn test_eval_empty_is_zero() {
        assert_eq!(eval_polynomial(&[], 123.0), 0.0);
    }
}
