//! Reporting utilities: residuals, curve sampling and formatted terminal output.
//!
//! Nothing here feeds back into the fit; it only reads a finished `FittedModel`.

pub mod format;

pub use format::*;

use crate::domain::{CurveGrid, Dataset, FittedModel, ObservationResidual};
use crate::error::{AppError, ErrorKind};

/// Upper redshift of the default plotting grid.
pub const CURVE_Z_MAX: f64 = 0.12;
/// Spacing of the default plotting grid.
pub const CURVE_Z_STEP: f64 = 0.01;

/// Compute fitted values, residuals and pulls for each observation.
pub fn compute_residuals(dataset: &Dataset, model: &FittedModel) -> Result<Vec<ObservationResidual>, AppError> {
    let mut out = Vec::with_capacity(dataset.len());
    for o in &dataset.observations {
        let fitted = model.predict(o.z)?;
        let residual = o.magnitude - fitted;
        out.push(ObservationResidual {
            observation: o.clone(),
            fitted,
            residual,
            pull: residual / o.magnitude_error,
        });
    }
    Ok(out)
}

/// Evaluate the fitted curve on `0, step, 2·step, …, z_max`.
///
/// Grid points where the model is undefined (z = 0: zero distance, infinite
/// flux) are left out rather than reported as errors.
pub fn curve_grid(model: &FittedModel, z_max: f64, step: f64) -> Result<CurveGrid, AppError> {
    if !(step.is_finite() && step > 0.0 && z_max.is_finite() && z_max >= 0.0) {
        return Err(AppError::validation(format!(
            "Invalid curve grid: z_max={z_max}, step={step}."
        )));
    }
    let n = (z_max / step).round() as usize;

    let mut z = Vec::with_capacity(n + 1);
    let mut magnitude = Vec::with_capacity(n + 1);
    for i in 0..=n {
        let zi = i as f64 * step;
        match model.predict(zi) {
            Ok(m) => {
                z.push(zi);
                magnitude.push(m);
            }
            Err(e) if e.kind() == ErrorKind::NumericalDomain => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(CurveGrid { z, magnitude })
}

/// `curve_grid` on the default `[0, 0.12]` grid with `0.01` spacing.
pub fn default_curve_grid(model: &FittedModel) -> Result<CurveGrid, AppError> {
    curve_grid(model, CURVE_Z_MAX, CURVE_Z_STEP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observation;
    use crate::models::{DistanceLaw, PhysicalConstants};
    use approx::assert_relative_eq;

    fn model() -> FittedModel {
        FittedModel {
            l_peak: 3.9e51,
            constants: PhysicalConstants::default(),
            distance_law: DistanceLaw::LowRedshift,
        }
    }

    #[test]
    fn default_grid_skips_zero_and_ends_at_point_twelve() {
        let grid = default_curve_grid(&model()).unwrap();
        assert_eq!(grid.z.len(), 12);
        assert_relative_eq!(grid.z[0], 0.01, epsilon = 1e-15);
        assert_relative_eq!(*grid.z.last().unwrap(), 0.12, epsilon = 1e-12);
        assert!(grid.magnitude.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn residuals_and_pulls() {
        let m = model();
        let z = 0.02;
        let fitted = m.predict(z).unwrap();
        let ds = Dataset::new(vec![Observation {
            name: "a".to_string(),
            z,
            magnitude: fitted + 0.25,
            magnitude_error: 0.125,
        }]);
        let residuals = compute_residuals(&ds, &m).unwrap();
        assert_eq!(residuals.len(), 1);
        assert_relative_eq!(residuals[0].residual, 0.25, epsilon = 1e-12);
        assert_relative_eq!(residuals[0].pull, 2.0, epsilon = 1e-10);
    }

    #[test]
    fn invalid_grid_is_rejected() {
        assert!(curve_grid(&model(), 0.1, 0.0).is_err());
    }
}
