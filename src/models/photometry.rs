//! Flux/magnitude conversions and the peak-luminosity → magnitude model.

use std::f64::consts::PI;

use crate::error::AppError;
use crate::models::distance::DistanceLaw;

/// `zero_point - 2.5·log10(flux)`.
///
/// Flux must be strictly positive and finite.
pub fn magnitude_from_flux(flux: f64, zero_point: f64) -> Result<f64, AppError> {
    if !(flux.is_finite() && flux > 0.0) {
        return Err(AppError::domain(format!(
            "Flux must be finite and > 0 to convert to a magnitude, got {flux}."
        )));
    }
    Ok(zero_point - 2.5 * flux.log10())
}

/// Inverse of `magnitude_from_flux`: `10^((zero_point - magnitude) / 2.5)`.
pub fn flux_from_magnitude(magnitude: f64, zero_point: f64) -> f64 {
    10f64.powf((zero_point - magnitude) / 2.5)
}

/// Observed peak flux of a source with peak luminosity `l_peak` at redshift `z`:
///
/// ```text
/// F = L / (4π · R₀(z)² · (1 + z)²)
/// ```
pub fn flux_from_peak_luminosity(
    l_peak: f64,
    z: f64,
    law: &DistanceLaw,
    c: f64,
    h0: f64,
) -> Result<f64, AppError> {
    if !l_peak.is_finite() {
        return Err(AppError::domain(format!("Peak luminosity must be finite, got {l_peak}.")));
    }
    let r0 = law.distance_factor(z, c, h0)?;
    if !(r0.is_finite() && r0 > 0.0) {
        return Err(AppError::domain(format!(
            "Distance factor at z={z} is {r0}; flux diverges at zero distance."
        )));
    }
    let one_plus_z = 1.0 + z;
    Ok(l_peak / (4.0 * PI * r0 * r0 * one_plus_z * one_plus_z))
}

/// Apparent peak magnitude for `l_peak` at redshift `z`. This is the fitted model.
pub fn magnitude_from_peak_luminosity(
    l_peak: f64,
    z: f64,
    zero_point: f64,
    law: &DistanceLaw,
    c: f64,
    h0: f64,
) -> Result<f64, AppError> {
    let flux = flux_from_peak_luminosity(l_peak, z, law, c, h0)?;
    magnitude_from_flux(flux, zero_point)
}

/// Peak luminosity implied by one observed magnitude (model inverted at a single point).
pub fn peak_luminosity_from_magnitude(
    magnitude: f64,
    z: f64,
    zero_point: f64,
    law: &DistanceLaw,
    c: f64,
    h0: f64,
) -> Result<f64, AppError> {
    let r0 = law.distance_factor(z, c, h0)?;
    let one_plus_z = 1.0 + z;
    Ok(flux_from_magnitude(magnitude, zero_point) * 4.0 * PI * r0 * r0 * one_plus_z * one_plus_z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::math::QuadratureTolerance;
    use crate::models::constants::PhysicalConstants;
    use approx::assert_relative_eq;

    fn exact_law() -> DistanceLaw {
        DistanceLaw::ExactLcdm {
            omega_lambda: 0.7,
            tolerance: QuadratureTolerance::default(),
        }
    }

    #[test]
    fn flux_magnitude_round_trip() {
        for &zp in &[-5.0, 0.0, 20.25] {
            for &flux in &[1e-30, 1e-3, 1.0, 199.5, 1e40] {
                let m = magnitude_from_flux(flux, zp).unwrap();
                assert_relative_eq!(flux_from_magnitude(m, zp), flux, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn non_positive_flux_is_a_domain_error() {
        for &flux in &[0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = magnitude_from_flux(flux, 20.25).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NumericalDomain);
        }
    }

    #[test]
    fn five_magnitudes_is_a_factor_of_one_hundred() {
        let m1 = magnitude_from_flux(100.0, 0.0).unwrap();
        let m2 = magnitude_from_flux(1.0, 0.0).unwrap();
        assert_relative_eq!(m2 - m1, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn flux_follows_inverse_square_law_at_low_z() {
        let law = DistanceLaw::LowRedshift;
        // c/H0 = 1, so R₀ = z.
        let f = flux_from_peak_luminosity(4.0 * PI, 0.5, &law, 1.0, 1.0).unwrap();
        assert_relative_eq!(f, 1.0 / (0.25 * 2.25), epsilon = 1e-12);
    }

    #[test]
    fn zero_redshift_has_no_finite_flux() {
        let err = flux_from_peak_luminosity(1.0, 0.0, &DistanceLaw::LowRedshift, 1.0, 1.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NumericalDomain);
    }

    #[test]
    fn negative_luminosity_is_a_domain_error() {
        let k = PhysicalConstants::default();
        let err = magnitude_from_peak_luminosity(
            -1e36,
            0.02,
            k.zero_point,
            &DistanceLaw::LowRedshift,
            k.speed_of_light,
            k.hubble_rate,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NumericalDomain);
    }

    #[test]
    fn magnitude_increases_with_redshift() {
        let k = PhysicalConstants::default();
        let l_peak = 4.0e51;
        for law in [DistanceLaw::LowRedshift, exact_law()] {
            let mut prev = f64::NEG_INFINITY;
            for i in 1..=100 {
                let z = i as f64 * 0.01;
                let m = magnitude_from_peak_luminosity(l_peak, z, k.zero_point, &law, k.speed_of_light, k.hubble_rate)
                    .unwrap();
                assert!(m > prev, "magnitude not increasing at z={z} for {law:?}");
                prev = m;
            }
        }
    }

    #[test]
    fn inverting_a_single_point_recovers_luminosity() {
        let k = PhysicalConstants::default();
        let law = exact_law();
        let m = magnitude_from_peak_luminosity(3.3e51, 0.07, k.zero_point, &law, k.speed_of_light, k.hubble_rate)
            .unwrap();
        let l = peak_luminosity_from_magnitude(m, 0.07, k.zero_point, &law, k.speed_of_light, k.hubble_rate).unwrap();
        assert_relative_eq!(l, 3.3e51, max_relative = 1e-10);
    }
}
