//! Redshift → distance-factor laws.
//!
//! `R₀(z)` is the comoving distance factor that enters the flux of a standard
//! candle. Two laws are available:
//!
//! - low-redshift approximation: `R₀ = c·z / H0` (only valid for `z ≪ 1`)
//! - exact flat ΛCDM: `R₀ = c · ∫₀ᶻ dz' / H(z')` with
//!   `H(z') = H0 · sqrt((1 - Ω_Λ)(1 + z')³ + Ω_Λ)`
//!
//! Callers pick the law explicitly through `DistanceLaw`.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::{QuadratureTolerance, integrate_adaptive};

/// Distance-factor strategy used by the flux model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "law", rename_all = "snake_case")]
pub enum DistanceLaw {
    /// `c·z / H0`.
    LowRedshift,
    /// Numerical integral of `1/H(z)` for a flat universe with dark-energy fraction `omega_lambda`.
    ExactLcdm {
        omega_lambda: f64,
        tolerance: QuadratureTolerance,
    },
}

impl DistanceLaw {
    /// Distance factor in the units of `c / h0` (metres for SI inputs).
    pub fn distance_factor(&self, z: f64, c: f64, h0: f64) -> Result<f64, AppError> {
        match *self {
            DistanceLaw::LowRedshift => {
                validate_redshift(z)?;
                Ok(relativistic_distance_factor(z, c, h0))
            }
            DistanceLaw::ExactLcdm {
                omega_lambda,
                ref tolerance,
            } => relativistic_distance_factor_exact(z, omega_lambda, c, h0, tolerance),
        }
    }

    /// Human-readable label for terminal output.
    pub fn display_name(&self) -> String {
        match self {
            DistanceLaw::LowRedshift => "low-z (cz/H0)".to_string(),
            DistanceLaw::ExactLcdm { omega_lambda, .. } => {
                format!("exact flat LCDM (Omega_L={omega_lambda})")
            }
        }
    }
}

/// Low-redshift distance factor `c·z / H0`.
pub fn relativistic_distance_factor(z: f64, c: f64, h0: f64) -> f64 {
    c * z / h0
}

/// Flat ΛCDM expansion rate `H(z)`.
pub fn expansion_rate(z: f64, omega_lambda: f64, h0: f64) -> Result<f64, AppError> {
    let e2 = (1.0 - omega_lambda) * (1.0 + z).powi(3) + omega_lambda;
    if !(e2.is_finite() && e2 > 0.0) {
        return Err(AppError::domain(format!(
            "Expansion rate undefined at z={z} for Omega_L={omega_lambda} (H²/H0² = {e2})."
        )));
    }
    Ok(h0 * e2.sqrt())
}

/// Exact distance factor `c · ∫₀ᶻ dz'/H(z')` by adaptive quadrature.
pub fn relativistic_distance_factor_exact(
    z: f64,
    omega_lambda: f64,
    c: f64,
    h0: f64,
    tolerance: &QuadratureTolerance,
) -> Result<f64, AppError> {
    validate_redshift(z)?;
    if !omega_lambda.is_finite() {
        return Err(AppError::validation(format!("Omega_L must be finite, got {omega_lambda}.")));
    }
    if !(h0.is_finite() && h0 > 0.0) {
        return Err(AppError::validation(format!("H0 must be finite and > 0, got {h0}.")));
    }
    if z == 0.0 {
        return Ok(0.0);
    }

    // H² is monotone in z, so positivity at both ends covers the whole range.
    expansion_rate(0.0, omega_lambda, h0)?;
    expansion_rate(z, omega_lambda, h0)?;

    // Integrate the dimensionless 1/E(z) and rescale; keeps the tolerances
    // meaningful (the raw integrand is ~1e17 s in SI units).
    let inv_e = |zp: f64| {
        let e2 = (1.0 - omega_lambda) * (1.0 + zp).powi(3) + omega_lambda;
        if e2 > 0.0 { 1.0 / e2.sqrt() } else { f64::NAN }
    };
    let integral = integrate_adaptive(inv_e, 0.0, z, tolerance)?;

    Ok(c / h0 * integral.value)
}

fn validate_redshift(z: f64) -> Result<(), AppError> {
    if !(z.is_finite() && z >= 0.0) {
        return Err(AppError::domain(format!("Redshift must be finite and >= 0, got {z}.")));
    }
    Ok(())
}
