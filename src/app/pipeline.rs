//! Shared "fit pipeline" logic.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! load observations -> fit -> residuals
//!
//! The CLI front-end then only handles presentation and exports.

use tracing::info;

use crate::domain::{Dataset, FitConfig, FitResult, ObservationResidual};
use crate::error::AppError;
use crate::fit::{FitOptions, fit_peak_luminosity};
use crate::io::load_observations;
use crate::report::compute_residuals;

/// All computed outputs of a single `lpeak fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub dataset: Dataset,
    pub fit: FitResult,
    pub residuals: Vec<ObservationResidual>,
}

/// Load the configured data file and fit it.
pub fn find_peak_luminosity(config: &FitConfig) -> Result<RunOutput, AppError> {
    let dataset = load_observations(&config.data_path)?;
    run_fit_on_dataset(dataset, &config.fit)
}

/// Fit an already-loaded dataset.
pub fn run_fit_on_dataset(dataset: Dataset, options: &FitOptions) -> Result<RunOutput, AppError> {
    let fit = fit_peak_luminosity(&dataset, options)?;
    let residuals = compute_residuals(&dataset, &fit.model)?;

    info!(
        l_peak = fit.model.l_peak,
        chi_square = fit.quality.chi_square,
        "fit complete"
    );

    Ok(RunOutput {
        dataset,
        fit,
        residuals,
    })
}
