//! Command-line parsing for the peak-luminosity fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{DistanceKind, ZeroPointKind};
use crate::models::{DEFAULT_OMEGA_LAMBDA, HUBBLE_CONSTANT_KM_S_MPC, ZERO_POINT_MAGNITUDE};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "lpeak", version, about = "Type Ia supernova peak-luminosity fitter")]
pub struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit L_peak to an observation file, print diagnostics, and optionally plot/export.
    Fit(FitArgs),
    /// Write a synthetic observation file from a known L_peak.
    Simulate(SimulateArgs),
    /// Plot a previously exported fit JSON.
    Plot(PlotArgs),
}

/// Model settings shared by `fit` and `simulate`.
#[derive(Debug, Args, Clone)]
pub struct ModelArgs {
    /// Distance law: `low-z` (cz/H0) or `exact` (flat ΛCDM integral).
    #[arg(long, value_enum, default_value_t = DistanceKind::LowZ)]
    pub distance: DistanceKind,

    /// Dark-energy density Ω_Λ for the exact distance law.
    #[arg(long, default_value_t = DEFAULT_OMEGA_LAMBDA)]
    pub omega_lambda: f64,

    /// Hubble constant in km/s/Mpc.
    #[arg(long, default_value_t = HUBBLE_CONSTANT_KM_S_MPC)]
    pub h0: f64,

    /// Zero-point magnitude m0 (held fixed unless `--zero-point free`).
    #[arg(long, default_value_t = ZERO_POINT_MAGNITUDE)]
    pub m0: f64,

    /// Absolute tolerance for the distance integral.
    #[arg(long, default_value_t = 1e-12)]
    pub quad_abs_tol: f64,

    /// Relative tolerance for the distance integral.
    #[arg(long, default_value_t = 1e-10)]
    pub quad_rel_tol: f64,
}

/// Options for fitting an observation file.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Observation file: `name z magnitude magnitude_error` per line
    /// (whitespace- or comma-separated, `#` comments).
    #[arg(short = 'd', long, value_name = "FILE")]
    pub data: PathBuf,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Hold m0 fixed (default) or fit it alongside L_peak.
    #[arg(long, value_enum, default_value_t = ZeroPointKind::Fixed)]
    pub zero_point: ZeroPointKind,

    /// Starting L_peak in watts (default: estimated from the data).
    #[arg(long)]
    pub initial_lpeak: Option<f64>,

    /// Starting m0 when the zero-point is free (default: `--m0`).
    #[arg(long)]
    pub initial_m0: Option<f64>,

    /// Levenberg–Marquardt iteration limit.
    #[arg(long, default_value_t = 200)]
    pub max_iterations: usize,

    /// Render an ASCII plot in the terminal (enabled by default).
    #[arg(long, default_value_t = true)]
    pub plot: bool,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 72)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Export per-observation residuals to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export the fit (parameters, covariance, curve grid) to JSON.
    #[arg(long = "export-fit")]
    pub export_fit: Option<PathBuf>,
}

/// Options for generating a synthetic observation file.
#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Output observation file.
    #[arg(short = 'o', long, value_name = "FILE")]
    pub out: PathBuf,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Number of supernovae to generate.
    #[arg(short = 'n', long, default_value_t = 30)]
    pub count: usize,

    /// Minimum redshift (must be > 0).
    #[arg(long, default_value_t = 0.01)]
    pub z_min: f64,

    /// Maximum redshift.
    #[arg(long, default_value_t = 0.1)]
    pub z_max: f64,

    /// True peak luminosity in watts.
    #[arg(long, default_value_t = 4.0e51)]
    pub lpeak: f64,

    /// Magnitude uncertainty assigned to every point.
    #[arg(long, default_value_t = 0.1)]
    pub sigma: f64,

    /// Add Gaussian noise (std dev `--sigma`) to the magnitudes.
    #[arg(long)]
    pub noise: bool,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Options for plotting a saved fit.
#[derive(Debug, Parser)]
pub struct PlotArgs {
    /// Fit JSON file produced by `lpeak fit --export-fit`.
    #[arg(long, value_name = "JSON")]
    pub fit: PathBuf,

    /// Plot width (columns).
    #[arg(long, default_value_t = 72)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_defaults() {
        let cli = Cli::parse_from(["lpeak", "fit", "--data", "sn.txt"]);
        assert_eq!(cli.log_level, tracing::Level::WARN);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.model.distance, DistanceKind::LowZ);
        assert_eq!(args.zero_point, ZeroPointKind::Fixed);
        assert_eq!(args.model.m0, 20.25);
        assert_eq!(args.model.h0, 75.0);
        assert!(args.plot && !args.no_plot);
    }

    #[test]
    fn global_log_level_after_subcommand() {
        let cli = Cli::parse_from([
            "lpeak", "simulate", "--out", "x.txt", "--distance", "exact", "--noise", "--log-level", "debug",
        ]);
        assert_eq!(cli.log_level, tracing::Level::DEBUG);
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.model.distance, DistanceKind::Exact);
        assert!(args.noise);
    }
}
