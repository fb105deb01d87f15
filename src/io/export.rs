//! Export per-observation results and datasets.
//!
//! The residual export is meant to be easy to consume in spreadsheets or
//! downstream scripts; the observation writer produces the loader's own format.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::{Dataset, ObservationResidual};
use crate::error::AppError;

/// Write per-observation fitted values and residuals to a CSV file.
pub fn write_residuals_csv(path: &Path, residuals: &[ObservationResidual]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create export CSV '{}': {e}", path.display())))?;
    let mut out = BufWriter::new(file);

    writeln!(out, "name,z,magnitude,magnitude_error,fitted,residual,pull")
        .map_err(|e| AppError::input(format!("Failed to write export CSV header: {e}")))?;

    for r in residuals {
        let o = &r.observation;
        writeln!(
            out,
            "{},{:.6},{:.4},{:.4},{:.6},{:.6},{:.4}",
            o.name, o.z, o.magnitude, o.magnitude_error, r.fitted, r.residual, r.pull
        )
        .map_err(|e| AppError::input(format!("Failed to write export CSV row: {e}")))?;
    }

    out.flush()
        .map_err(|e| AppError::input(format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}

/// Write a dataset as `name z magnitude magnitude_error` lines.
pub fn write_observations(path: &Path, dataset: &Dataset) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create data file '{}': {e}", path.display())))?;
    let mut out = BufWriter::new(file);

    for o in &dataset.observations {
        writeln!(out, "{} {} {} {}", o.name, o.z, o.magnitude, o.magnitude_error)
            .map_err(|e| AppError::input(format!("Failed to write data row: {e}")))?;
    }

    out.flush()
        .map_err(|e| AppError::input(format!("Failed to flush data file: {e}")))?;
    Ok(())
}
