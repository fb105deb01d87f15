//! Dense linear algebra used by the solver.
//!
//! The problems here are tiny (one or two parameters, tens to hundreds of
//! observations), so everything goes through nalgebra's SVD or Cholesky
//! without worrying about cost.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem `min ||x β - y||` using SVD.
///
/// Singular values below `tol · s_max` are treated as zero, so the cut-off
/// follows the scale of `x`. Returns `None` if `x` is zero or the system is
/// too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);
    let s_max = svd.singular_values.iter().copied().fold(0.0_f64, f64::max);
    if !(s_max.is_finite() && s_max > 0.0) {
        return None;
    }

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol * s_max) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve the symmetric positive (semi-)definite system `a x = b`.
///
/// Cholesky first; if the matrix is not numerically positive definite we fall
/// back to the SVD least-squares solution.
pub fn solve_spd(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    if let Some(chol) = a.clone().cholesky() {
        let x = chol.solve(b);
        if x.iter().all(|v| v.is_finite()) {
            return Some(x);
        }
    }
    solve_least_squares(a, b)
}

/// Parameter covariance `(JᵀJ)⁺` from a (weighted) Jacobian.
///
/// Columns are first scaled to unit norm, `J = Js·D`, so parameters of very
/// different magnitude are compared on equal terms. With `Js = U S Vᵀ` the
/// result is `D⁻¹ V S⁻² Vᵀ D⁻¹`, where singular values at or below
/// `max(rcond, ε · max(n, p)) · s_max` are treated as zero. A degenerate
/// direction therefore keeps its share of variance in every parameter it
/// involves. The result is symmetric positive semi-definite by construction.
///
/// Returns the covariance and the numerical rank of `J`.
pub fn covariance_from_jacobian(j: &DMatrix<f64>, rcond: f64) -> Option<(DMatrix<f64>, usize)> {
    let (n, p) = j.shape();
    if p == 0 {
        return Some((DMatrix::zeros(0, 0), 0));
    }

    let norms: Vec<f64> = j
        .column_iter()
        .map(|c| {
            let d = c.norm();
            if d > 0.0 && d.is_finite() { d } else { 1.0 }
        })
        .collect();
    let mut scaled = j.clone();
    for (k, &d) in norms.iter().enumerate() {
        scaled.column_mut(k).unscale_mut(d);
    }

    let svd = scaled.svd(false, true);
    let v_t = svd.v_t.as_ref()?;
    let s = &svd.singular_values;

    let s_max = s.iter().copied().fold(0.0_f64, f64::max);
    if !(s_max.is_finite() && s_max > 0.0) {
        return None;
    }
    let threshold = rcond.max(f64::EPSILON * n.max(p) as f64) * s_max;

    let mut cov = DMatrix::<f64>::zeros(p, p);
    let mut rank = 0usize;
    for (k, &sk) in s.iter().enumerate() {
        if sk <= threshold {
            continue;
        }
        rank += 1;
        let inv2 = 1.0 / (sk * sk);
        let vk = v_t.row(k);
        for a in 0..p {
            for b in 0..p {
                cov[(a, b)] += vk[a] * vk[b] * inv2 / (norms[a] * norms[b]);
            }
        }
    }

    if cov.iter().all(|v| v.is_finite()) {
        Some((cov, rank))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn spd_solve_matches_direct_inverse() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let b = DVector::from_row_slice(&[1.0, 2.0]);
        let x = solve_spd(&a, &b).unwrap();
        assert_relative_eq!(x[0], 1.0 / 11.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 7.0 / 11.0, epsilon = 1e-12);
    }

    #[test]
    fn covariance_of_full_rank_jacobian_is_normal_inverse() {
        let j = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let (cov, rank) = covariance_from_jacobian(&j, 0.0).unwrap();
        assert_eq!(rank, 2);

        let expected = (j.transpose() * &j).try_inverse().unwrap();
        for (a, b) in cov.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn covariance_of_degenerate_jacobian_is_finite_psd() {
        // Second column is a multiple of the first.
        let j = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
        let (cov, rank) = covariance_from_jacobian(&j, 0.0).unwrap();
        assert_eq!(rank, 1);
        assert!(cov.iter().all(|v| v.is_finite()));

        let eig = cov.symmetric_eigen();
        assert!(eig.eigenvalues.iter().all(|&l| l >= -1e-12));
    }

    #[test]
    fn spd_fallback_uses_a_scale_relative_cutoff() {
        // Singular but tiny: Cholesky fails, and an absolute cut-off would
        // zero out every singular value.
        let a = DMatrix::from_row_slice(2, 2, &[1e-100, 1e-100, 1e-100, 1e-100]);
        let b = DVector::from_row_slice(&[1e-100, 1e-100]);
        let x = solve_spd(&a, &b).unwrap();
        assert_relative_eq!(x[0], 0.5, epsilon = 1e-9);
        assert_relative_eq!(x[1], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn zero_matrix_has_no_least_squares_solution() {
        let x = DMatrix::<f64>::zeros(2, 2);
        let y = DVector::from_row_slice(&[1.0, 1.0]);
        assert!(solve_least_squares(&x, &y).is_none());
    }

    #[test]
    fn covariance_is_invariant_to_column_units() {
        let j = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let (cov, _) = covariance_from_jacobian(&j, 0.0).unwrap();

        // Rescale the first parameter by 1e-40: its column grows by 1e40.
        let mut wide = j.clone();
        wide.column_mut(0).scale_mut(1e40);
        let (cov_wide, rank) = covariance_from_jacobian(&wide, 0.0).unwrap();
        assert_eq!(rank, 2);
        assert_relative_eq!(cov_wide[(0, 0)], cov[(0, 0)] * 1e-80, max_relative = 1e-9);
        assert_relative_eq!(cov_wide[(1, 1)], cov[(1, 1)], max_relative = 1e-9);
    }

    #[test]
    fn badly_scaled_degenerate_jacobian_keeps_variance_in_both_parameters() {
        // Collinear columns that differ by ~52 orders of magnitude, as for
        // (L_peak, m0) in a free zero-point fit.
        let w = [10.0, 8.0, 5.0];
        let mut data = Vec::new();
        for &wi in &w {
            data.push(wi * 4.6e-52);
            data.push(-wi);
        }
        let j = DMatrix::from_row_slice(3, 2, &data);
        let (cov, rank) = covariance_from_jacobian(&j, 1e-6).unwrap();
        assert_eq!(rank, 1);
        assert!(cov[(0, 0)] > 0.0);
        assert!(cov[(1, 1)] > 0.0);
        // The variance lies along the constrained direction `(a, -1)`.
        assert!(cov[(0, 1)] < 0.0);
    }
}
