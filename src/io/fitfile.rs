//! Read/write fit JSON files.
//!
//! A fit file is the portable form of a finished fit:
//! - parameters, standard errors and covariance
//! - the fitted model (constants + distance law)
//! - the observations it was fit to
//! - a precomputed curve grid for quick plotting
//!
//! The schema is defined by `domain::FitFile`.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::Utc;

use crate::domain::{Dataset, FitFile, FitResult, ParameterEstimate};
use crate::error::AppError;
use crate::report::default_curve_grid;

/// Build the serializable form of a fit.
pub fn fit_file_from_result(fit: &FitResult, dataset: &Dataset) -> Result<FitFile, AppError> {
    let parameters = fit
        .parameters
        .iter()
        .zip(fit.values.iter())
        .zip(fit.std_errors())
        .map(|((&name, &value), std_error)| ParameterEstimate {
            name,
            value,
            std_error,
        })
        .collect();

    let covariance = fit
        .covariance
        .row_iter()
        .map(|row| row.iter().copied().collect())
        .collect();

    Ok(FitFile {
        tool: "lpeak".to_string(),
        generated_at: Utc::now(),
        zero_point_mode: fit.zero_point_mode,
        model: fit.model,
        parameters,
        covariance,
        quality: fit.quality.clone(),
        observations: dataset.observations.clone(),
        grid: default_curve_grid(&fit.model)?,
    })
}

/// Write a fit JSON file.
pub fn write_fit_json(path: &Path, fit: &FitResult, dataset: &Dataset) -> Result<(), AppError> {
    let doc = fit_file_from_result(fit, dataset)?;
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create fit JSON '{}': {e}", path.display())))?;

    serde_json::to_writer_pretty(BufWriter::new(file), &doc)
        .map_err(|e| AppError::input(format!("Failed to write fit JSON: {e}")))?;

    Ok(())
}

/// Read a fit JSON file.
pub fn read_fit_json(path: &Path) -> Result<FitFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open fit JSON '{}': {e}", path.display())))?;
    let doc: FitFile = serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| AppError::input(format!("Invalid fit JSON '{}': {e}", path.display())))?;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Observation, ParameterKind};
    use crate::error::ErrorKind;
    use crate::fit::{FitOptions, fit_peak_luminosity};

    fn dataset() -> Dataset {
        Dataset::new(vec![
            Observation {
                name: "sn1".to_string(),
                z: 0.01,
                magnitude: 14.5,
                magnitude_error: 0.1,
            },
            Observation {
                name: "sn2".to_string(),
                z: 0.02,
                magnitude: 15.8,
                magnitude_error: 0.1,
            },
            Observation {
                name: "sn3".to_string(),
                z: 0.03,
                magnitude: 16.6,
                magnitude_error: 0.12,
            },
        ])
    }

    #[test]
    fn written_fit_reads_back() {
        let ds = dataset();
        let fit = fit_peak_luminosity(&ds, &FitOptions::default()).unwrap();
        let path = std::env::temp_dir().join(format!("lpeak-fit-{}.json", std::process::id()));

        write_fit_json(&path, &fit, &ds).unwrap();
        let doc = read_fit_json(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(doc.tool, "lpeak");
        assert_eq!(doc.parameters.len(), 1);
        assert_eq!(doc.parameters[0].name, ParameterKind::PeakLuminosity);
        assert_eq!(doc.parameters[0].value, fit.values[0]);
        assert_eq!(doc.covariance, vec![vec![fit.covariance[(0, 0)]]]);
        assert_eq!(doc.observations, ds.observations);
        assert_eq!(doc.grid.z.len(), 12);
    }

    #[test]
    fn garbage_is_an_input_error() {
        let path = std::env::temp_dir().join(format!("lpeak-bad-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        let err = read_fit_json(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert_eq!(err.kind(), ErrorKind::Input);
    }
}
