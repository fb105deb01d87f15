//! Levenberg–Marquardt solver for small weighted least-squares problems.
//!
//! Minimises `χ²(p) = Σ r_i(p)²`, where the problem supplies already-weighted
//! residuals (e.g. `(y_i - f(x_i; p)) / σ_i`).
//!
//! Each iteration solves the damped normal equations
//!
//! ```text
//! (JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr
//! ```
//!
//! with a forward-difference Jacobian `J = ∂r/∂p`. Marquardt's diagonal
//! scaling makes the step invariant to parameter units:
//! a peak luminosity in watts is ~1e51 while a zero-point is ~20.
//!
//! Convergence (any one is enough):
//! - gradient: `max_j |J_jᵀ r| / (‖J_j‖ ‖r‖) <= gtol`
//! - χ² reduction: an accepted step lowers χ² by at most `ftol · χ²`
//! - step size: every `|δ_j| <= xtol · (|p_j| + xtol)`
//!
//! Trial points where the model is undefined (a `NumericalDomain` error, or a
//! non-finite residual) count as rejected steps and just raise `λ`.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, ErrorKind};
use crate::math::lstsq::solve_spd;

const LAMBDA_MIN: f64 = 1e-15;
const LAMBDA_MAX: f64 = 1e16;

/// A least-squares problem: weighted residuals as a function of parameters.
pub trait LeastSquaresProblem {
    fn residuals(&self, params: &DVector<f64>) -> Result<DVector<f64>, AppError>;
}

impl<F> LeastSquaresProblem for F
where
    F: Fn(&DVector<f64>) -> Result<DVector<f64>, AppError>,
{
    fn residuals(&self, params: &DVector<f64>) -> Result<DVector<f64>, AppError> {
        self(params)
    }
}

/// Solver settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmOptions {
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    pub initial_lambda: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
            initial_lambda: 1e-3,
        }
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// χ² is exactly zero.
    ZeroResidual,
    /// Residual vector is orthogonal to the Jacobian columns.
    Gradient,
    /// Relative χ² reduction fell below `ftol`.
    ChiSquareReduction,
    /// Parameter step fell below `xtol`.
    StepSize,
}

impl Termination {
    pub fn describe(self) -> &'static str {
        match self {
            Termination::ZeroResidual => "residuals are zero",
            Termination::Gradient => "gradient below gtol",
            Termination::ChiSquareReduction => "chi-square reduction below ftol",
            Termination::StepSize => "parameter step below xtol",
        }
    }
}

/// Converged solver state.
#[derive(Debug, Clone)]
pub struct LmReport {
    pub params: DVector<f64>,
    pub residuals: DVector<f64>,
    /// Jacobian of the weighted residuals at `params`.
    pub jacobian: DMatrix<f64>,
    pub chi_square: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub lambda: f64,
    pub termination: Termination,
}

#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    pub options: LmOptions,
}

impl LevenbergMarquardt {
    pub fn new(options: LmOptions) -> Self {
        Self { options }
    }

    pub fn minimize<P: LeastSquaresProblem>(
        &self,
        problem: &P,
        initial: DVector<f64>,
    ) -> Result<LmReport, AppError> {
        let opts = &self.options;
        if initial.is_empty() {
            return Err(AppError::validation("Solver needs at least one free parameter."));
        }
        if initial.iter().any(|v| !v.is_finite()) {
            return Err(AppError::validation(format!(
                "Initial parameters must be finite, got {:?}.",
                initial.as_slice()
            )));
        }

        let mut p = initial;
        let mut r = checked_residuals(problem, &p)?;
        let mut chi2 = r.norm_squared();
        let mut evaluations = 1usize;
        let mut lambda = opts.initial_lambda.max(LAMBDA_MIN);

        for iter in 1..=opts.max_iterations {
            if chi2 == 0.0 {
                return self.finish(problem, p, r, chi2, iter - 1, evaluations, lambda, Termination::ZeroResidual);
            }

            let j = numeric_jacobian(problem, &p, &r, &mut evaluations)?;
            let g = j.transpose() * &r;

            if gradient_cosine(&j, &g, r.norm()) <= opts.gtol {
                return Ok(LmReport {
                    params: p,
                    residuals: r,
                    jacobian: j,
                    chi_square: chi2,
                    iterations: iter - 1,
                    evaluations,
                    lambda,
                    termination: Termination::Gradient,
                });
            }

            let jtj = j.transpose() * &j;
            let scale: Vec<f64> = jtj
                .diagonal()
                .iter()
                .map(|&d| if d > 0.0 && d.is_finite() { d } else { 1.0 })
                .collect();
            let neg_g = -&g;

            // Inner loop: raise λ until a step lowers χ² (or becomes negligible).
            loop {
                let mut a = jtj.clone();
                for (k, &s) in scale.iter().enumerate() {
                    a[(k, k)] += lambda * s;
                }
                let step = solve_spd(&a, &neg_g).ok_or_else(|| {
                    AppError::fit_failed(format!(
                        "Damped normal equations are singular at iteration {iter} (lambda={lambda:.3e})."
                    ))
                })?;

                let small_step = step
                    .iter()
                    .zip(p.iter())
                    .all(|(d, x)| d.abs() <= opts.xtol * (x.abs() + opts.xtol));
                let trial = &p + &step;

                evaluations += 1;
                let outcome = match problem.residuals(&trial) {
                    Ok(r_new) if r_new.iter().all(|v| v.is_finite()) => Some(r_new),
                    Ok(_) => None,
                    Err(e) if e.kind() == ErrorKind::NumericalDomain => {
                        debug!(iter, lambda, reason = e.message(), "trial step outside model domain");
                        None
                    }
                    Err(e) => return Err(e),
                };

                if let Some(r_new) = outcome {
                    let chi2_new = r_new.norm_squared();
                    if chi2_new < chi2 {
                        let reduction = chi2 - chi2_new;
                        let chi2_old = chi2;
                        p = trial;
                        r = r_new;
                        chi2 = chi2_new;
                        lambda = (lambda / 10.0).max(LAMBDA_MIN);
                        debug!(iter, chi2, lambda, "accepted step");

                        if chi2 == 0.0 {
                            return self.finish(problem, p, r, chi2, iter, evaluations, lambda, Termination::ZeroResidual);
                        }
                        if reduction <= opts.ftol * chi2_old {
                            return self.finish(problem, p, r, chi2, iter, evaluations, lambda, Termination::ChiSquareReduction);
                        }
                        if small_step {
                            return self.finish(problem, p, r, chi2, iter, evaluations, lambda, Termination::StepSize);
                        }
                        break;
                    }
                }

                if small_step {
                    return self.finish(problem, p, r, chi2, iter, evaluations, lambda, Termination::StepSize);
                }
                lambda *= 10.0;
                if lambda > LAMBDA_MAX {
                    return Err(AppError::fit_failed(format!(
                        "Could not reduce chi-square at iteration {iter}: damping exceeded {LAMBDA_MAX:e} \
                         (chi2={chi2:.6e})."
                    )));
                }
            }
        }

        Err(AppError::fit_failed(format!(
            "Solver did not converge within {} iterations (chi2={chi2:.6e}, lambda={lambda:.3e}, params={:?}).",
            opts.max_iterations,
            p.as_slice()
        )))
    }

    #[allow(clippy::too_many_arguments)]
    fn finish<P: LeastSquaresProblem>(
        &self,
        problem: &P,
        params: DVector<f64>,
        residuals: DVector<f64>,
        chi_square: f64,
        iterations: usize,
        mut evaluations: usize,
        lambda: f64,
        termination: Termination,
    ) -> Result<LmReport, AppError> {
        let jacobian = numeric_jacobian(problem, &params, &residuals, &mut evaluations)?;
        debug!(
            iterations,
            evaluations,
            chi_square,
            termination = termination.describe(),
            "solver converged"
        );
        Ok(LmReport {
            params,
            residuals,
            jacobian,
            chi_square,
            iterations,
            evaluations,
            lambda,
            termination,
        })
    }
}

fn checked_residuals<P: LeastSquaresProblem>(problem: &P, p: &DVector<f64>) -> Result<DVector<f64>, AppError> {
    let r = problem.residuals(p)?;
    if r.is_empty() {
        return Err(AppError::validation("Problem has no residuals."));
    }
    if r.iter().any(|v| !v.is_finite()) {
        return Err(AppError::domain(format!(
            "Residuals are not finite at the initial parameters {:?}.",
            p.as_slice()
        )));
    }
    Ok(r)
}

/// Forward-difference Jacobian of the residuals.
///
/// The step for parameter `k` is `√ε · max(|p_k|, 1)`. If the forward point
/// leaves the model domain, a backward difference is used instead.
pub fn numeric_jacobian<P: LeastSquaresProblem>(
    problem: &P,
    p: &DVector<f64>,
    r0: &DVector<f64>,
    evaluations: &mut usize,
) -> Result<DMatrix<f64>, AppError> {
    let n = r0.len();
    let m = p.len();
    let mut j = DMatrix::<f64>::zeros(n, m);

    for k in 0..m {
        let h = f64::EPSILON.sqrt() * p[k].abs().max(1.0);

        let mut forward = p.clone();
        forward[k] += h;
        *evaluations += 1;
        let (r_shift, signed_h) = match problem.residuals(&forward) {
            Ok(r) => (r, h),
            Err(e) if e.kind() == ErrorKind::NumericalDomain => {
                let mut backward = p.clone();
                backward[k] -= h;
                *evaluations += 1;
                (problem.residuals(&backward)?, -h)
            }
            Err(e) => return Err(e),
        };

        if r_shift.len() != n {
            return Err(AppError::fit_failed(format!(
                "Residual length changed from {n} to {} while differentiating.",
                r_shift.len()
            )));
        }
        for i in 0..n {
            j[(i, k)] = (r_shift[i] - r0[i]) / signed_h;
        }
    }

    if j.iter().any(|v| !v.is_finite()) {
        return Err(AppError::fit_failed("Jacobian contains non-finite entries."));
    }
    Ok(j)
}

fn gradient_cosine(j: &DMatrix<f64>, g: &DVector<f64>, r_norm: f64) -> f64 {
    if r_norm == 0.0 {
        return 0.0;
    }
    j.column_iter()
        .zip(g.iter())
        .filter_map(|(col, &gk)| {
            let norm = col.norm();
            if norm > 0.0 { Some(gk.abs() / (norm * r_norm)) } else { None }
        })
        .fold(0.0, f64::max)
}
