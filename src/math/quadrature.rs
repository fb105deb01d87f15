//! Adaptive Gauss–Kronrod quadrature.
//!
//! Each interval is integrated with the 15-point Kronrod rule; the embedded
//! 7-point Gauss rule gives the error estimate `|K15 - G7|`. The interval with
//! the largest error is bisected until
//!
//! ```text
//! Σ err_i <= max(abs_tol, rel_tol · |Σ I_i|)
//! ```
//!
//! or the subdivision limit is hit, in which case the caller gets an
//! `Integration` error instead of a silently inaccurate value.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;

/// Kronrod abscissae on [0, 1] (the rule is symmetric). Odd indices are the Gauss nodes.
const XGK: [f64; 8] = [
    0.991_455_371_120_812_6,
    0.949_107_912_342_758_5,
    0.864_864_423_359_769_1,
    0.741_531_185_599_394_4,
    0.586_087_235_467_691_1,
    0.405_845_151_377_397_2,
    0.207_784_955_007_898_5,
    0.0,
];

/// Kronrod weights matching `XGK`.
const WGK: [f64; 8] = [
    0.022_935_322_010_529_22,
    0.063_092_092_629_978_55,
    0.104_790_010_322_250_2,
    0.140_653_259_715_525_9,
    0.169_004_726_639_267_9,
    0.190_350_578_064_785_4,
    0.204_432_940_075_298_9,
    0.209_482_141_084_727_8,
];

/// Gauss weights for `XGK[1]`, `XGK[3]`, `XGK[5]` and the centre.
const WG: [f64; 4] = [
    0.129_484_966_168_869_7,
    0.279_705_391_489_276_7,
    0.381_830_050_505_118_9,
    0.417_959_183_673_469_4,
];

/// Tolerances for adaptive integration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadratureTolerance {
    pub abs_tol: f64,
    pub rel_tol: f64,
    pub max_subdivisions: usize,
}

impl Default for QuadratureTolerance {
    fn default() -> Self {
        Self {
            abs_tol: 1e-12,
            rel_tol: 1e-10,
            max_subdivisions: 50,
        }
    }
}

impl QuadratureTolerance {
    pub fn validate(&self) -> Result<(), AppError> {
        let abs_ok = self.abs_tol.is_finite() && self.abs_tol >= 0.0;
        let rel_ok = self.rel_tol.is_finite() && self.rel_tol >= 0.0;
        if !(abs_ok && rel_ok) || (self.abs_tol == 0.0 && self.rel_tol == 0.0) {
            return Err(AppError::validation(format!(
                "Invalid quadrature tolerance: abs={}, rel={} (need finite, >= 0, not both 0).",
                self.abs_tol, self.rel_tol
            )));
        }
        if self.max_subdivisions == 0 {
            return Err(AppError::validation("Quadrature subdivision limit must be >= 1."));
        }
        Ok(())
    }
}

/// Value and diagnostics of a converged integral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadratureResult {
    pub value: f64,
    pub error_estimate: f64,
    pub intervals: usize,
    pub evaluations: usize,
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    a: f64,
    b: f64,
    value: f64,
    error: f64,
}

/// Integrate `f` over `[a, b]` adaptively.
pub fn integrate_adaptive<F>(
    f: F,
    a: f64,
    b: f64,
    tol: &QuadratureTolerance,
) -> Result<QuadratureResult, AppError>
where
    F: Fn(f64) -> f64,
{
    tol.validate()?;
    if !(a.is_finite() && b.is_finite()) {
        return Err(AppError::domain(format!(
            "Integration bounds must be finite (a={a}, b={b})."
        )));
    }
    if a == b {
        return Ok(QuadratureResult {
            value: 0.0,
            error_estimate: 0.0,
            intervals: 0,
            evaluations: 0,
        });
    }
    if b < a {
        let r = integrate_adaptive(f, b, a, tol)?;
        return Ok(QuadratureResult {
            value: -r.value,
            ..r
        });
    }

    let mut evaluations = 0usize;
    let first = gauss_kronrod_15(&f, a, b, &mut evaluations)?;
    let mut segments = vec![first];

    loop {
        let total: f64 = segments.iter().map(|s| s.value).sum();
        let total_err: f64 = segments.iter().map(|s| s.error).sum();
        let target = tol.abs_tol.max(tol.rel_tol * total.abs());

        if total_err <= target {
            debug!(
                value = total,
                error = total_err,
                intervals = segments.len(),
                evaluations,
                "quadrature converged"
            );
            return Ok(QuadratureResult {
                value: total,
                error_estimate: total_err,
                intervals: segments.len(),
                evaluations,
            });
        }

        if segments.len() >= tol.max_subdivisions {
            return Err(AppError::integration(format!(
                "Adaptive quadrature on [{a}, {b}] did not converge after {} subdivisions: \
                 estimate={total:.6e}, error={total_err:.3e}, target={target:.3e}.",
                segments.len()
            )));
        }

        // Bisect the segment with the largest error estimate.
        let worst = segments
            .iter()
            .enumerate()
            .max_by(|x, y| x.1.error.total_cmp(&y.1.error))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let seg = segments.swap_remove(worst);
        let mid = 0.5 * (seg.a + seg.b);
        if mid <= seg.a || mid >= seg.b {
            return Err(AppError::integration(format!(
                "Adaptive quadrature interval [{}, {}] cannot be bisected further (error={:.3e}).",
                seg.a, seg.b, total_err
            )));
        }
        segments.push(gauss_kronrod_15(&f, seg.a, mid, &mut evaluations)?);
        segments.push(gauss_kronrod_15(&f, mid, seg.b, &mut evaluations)?);
    }
}

fn gauss_kronrod_15<F>(f: &F, a: f64, b: f64, evaluations: &mut usize) -> Result<Segment, AppError>
where
    F: Fn(f64) -> f64,
{
    let center = 0.5 * (a + b);
    let half = 0.5 * (b - a);

    let eval = |x: f64, evaluations: &mut usize| -> Result<f64, AppError> {
        *evaluations += 1;
        let v = f(x);
        if v.is_finite() {
            Ok(v)
        } else {
            Err(AppError::integration(format!("Integrand is not finite at x={x}.")))
        }
    };

    let fc = eval(center, evaluations)?;
    let mut res_k = fc * WGK[7];
    let mut res_g = fc * WG[3];

    for (j, &x) in XGK.iter().take(7).enumerate() {
        let dx = half * x;
        let pair = eval(center - dx, evaluations)? + eval(center + dx, evaluations)?;
        res_k += WGK[j] * pair;
        if j % 2 == 1 {
            res_g += WG[j / 2] * pair;
        }
    }

    Ok(Segment {
        a,
        b,
        value: res_k * half,
        error: ((res_k - res_g) * half).abs(),
    })
}
