//! Shared domain types.
//!
//! Output types are serializable so a fit can be exported to JSON and
//! re-plotted later without refitting.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::Termination;
use crate::models::{DistanceLaw, PhysicalConstants, magnitude_from_peak_luminosity};

/// Which distance law to use (CLI form of `DistanceLaw`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceKind {
    /// `cz/H0`, valid for z ≪ 1.
    #[value(name = "low-z")]
    LowZ,
    /// Numerically integrated flat ΛCDM distance.
    Exact,
}

/// Whether the zero-point magnitude is held fixed or fitted (CLI form of `ZeroPointMode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ZeroPointKind {
    Fixed,
    Free,
}

/// Zero-point convention for a fit.
///
/// `Fixed` fits `L_peak` only. `Free` also fits `m0`; since the model depends
/// on `m0 - 2.5·log10(L_peak)` alone, that fit is rank-deficient and only the
/// combination is constrained by data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum ZeroPointMode {
    Fixed(f64),
    Free,
}

/// A free parameter of the magnitude–redshift model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    PeakLuminosity,
    ZeroPoint,
}

impl ParameterKind {
    pub fn display_name(self) -> &'static str {
        match self {
            ParameterKind::PeakLuminosity => "L_peak [W]",
            ParameterKind::ZeroPoint => "m0",
        }
    }
}

/// One supernova: `(name, z, magnitude, magnitude_error)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub name: String,
    pub z: f64,
    pub magnitude: f64,
    pub magnitude_error: f64,
}

/// An ordered set of observations. Order does not affect the fit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub source: Option<PathBuf>,
    pub observations: Vec<Observation>,
}

/// Summary stats about a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetStats {
    pub n_points: usize,
    pub z_min: f64,
    pub z_max: f64,
    pub mag_min: f64,
    pub mag_max: f64,
}

impl Dataset {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self {
            source: None,
            observations,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// The three aligned numeric columns `(z, magnitude, magnitude_error)`.
    pub fn columns(&self) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let z = self.observations.iter().map(|o| o.z).collect();
        let mag = self.observations.iter().map(|o| o.magnitude).collect();
        let err = self.observations.iter().map(|o| o.magnitude_error).collect();
        (z, mag, err)
    }

    pub fn stats(&self) -> Option<DatasetStats> {
        if self.observations.is_empty() {
            return None;
        }
        let mut z_min = f64::INFINITY;
        let mut z_max = f64::NEG_INFINITY;
        let mut mag_min = f64::INFINITY;
        let mut mag_max = f64::NEG_INFINITY;
        for o in &self.observations {
            z_min = z_min.min(o.z);
            z_max = z_max.max(o.z);
            mag_min = mag_min.min(o.magnitude);
            mag_max = mag_max.max(o.magnitude);
        }
        Some(DatasetStats {
            n_points: self.observations.len(),
            z_min,
            z_max,
            mag_min,
            mag_max,
        })
    }
}

/// Everything needed to evaluate a fitted magnitude–redshift curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub l_peak: f64,
    /// Constants used for the fit; `zero_point` holds the fitted value in free mode.
    pub constants: PhysicalConstants,
    pub distance_law: DistanceLaw,
}

impl FittedModel {
    /// Predicted apparent magnitude at redshift `z`.
    pub fn predict(&self, z: f64) -> Result<f64, AppError> {
        magnitude_from_peak_luminosity(
            self.l_peak,
            z,
            self.constants.zero_point,
            &self.distance_law,
            self.constants.speed_of_light,
            self.constants.hubble_rate,
        )
    }
}

/// Fit quality diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitQuality {
    pub n: usize,
    pub chi_square: f64,
    pub dof: usize,
    /// `χ²/dof`, `None` when `dof == 0`.
    pub reduced_chi_square: Option<f64>,
    /// Numerical rank of the weighted Jacobian at the optimum.
    pub rank: usize,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
}

/// Best-fit parameters and their covariance. Immutable once produced.
#[derive(Debug, Clone)]
pub struct FitResult {
    pub parameters: Vec<ParameterKind>,
    pub values: DVector<f64>,
    /// Covariance with absolute-sigma semantics (not rescaled by χ²/dof).
    pub covariance: DMatrix<f64>,
    pub zero_point_mode: ZeroPointMode,
    pub model: FittedModel,
    pub quality: FitQuality,
}

impl FitResult {
    /// One-sigma uncertainties (square roots of the covariance diagonal).
    pub fn std_errors(&self) -> Vec<f64> {
        self.covariance.diagonal().iter().map(|v| v.max(0.0).sqrt()).collect()
    }

    pub fn value_of(&self, kind: ParameterKind) -> Option<f64> {
        self.parameters
            .iter()
            .position(|&k| k == kind)
            .map(|i| self.values[i])
    }
}

/// A per-observation fitted result (used for tables, plots and exports).
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationResidual {
    pub observation: Observation,
    pub fitted: f64,
    /// `observed - fitted`.
    pub residual: f64,
    /// `residual / magnitude_error`.
    pub pull: f64,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub data_path: PathBuf,
    pub fit: crate::fit::FitOptions,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export_residuals: Option<PathBuf>,
    pub export_fit: Option<PathBuf>,
}

/// Settings for synthetic dataset generation.
#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub count: usize,
    pub z_min: f64,
    pub z_max: f64,
    pub l_peak: f64,
    pub magnitude_error: f64,
    /// Add Gaussian noise with standard deviation `magnitude_error`.
    pub noise: bool,
    pub seed: u64,
    pub constants: PhysicalConstants,
    pub distance_law: DistanceLaw,
}

/// One fitted parameter as stored in a fit file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterEstimate {
    pub name: ParameterKind,
    pub value: f64,
    pub std_error: f64,
}

/// A saved fit (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub zero_point_mode: ZeroPointMode,
    pub model: FittedModel,
    pub parameters: Vec<ParameterEstimate>,
    pub covariance: Vec<Vec<f64>>,
    pub quality: FitQuality,
    pub observations: Vec<Observation>,
    pub grid: CurveGrid,
}

/// A fitted curve sampled on a redshift grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveGrid {
    pub z: Vec<f64>,
    pub magnitude: Vec<f64>,
}
