//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - loads observations and runs the fit
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;
use tracing::info;

use crate::cli::{Command, FitArgs, ModelArgs, PlotArgs, SimulateArgs};
use crate::domain::{DistanceKind, FitConfig, SampleConfig, ZeroPointKind, ZeroPointMode};
use crate::error::AppError;
use crate::fit::FitOptions;
use crate::math::{LmOptions, QuadratureTolerance};
use crate::models::{DistanceLaw, PhysicalConstants};

pub mod pipeline;

/// Entry point for the `lpeak` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Plot(args) => handle_plot(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args);
    let run = pipeline::find_peak_luminosity(&config)?;

    println!("{}", crate::report::format_run_summary(&run.dataset, &run.fit));
    println!("{}", crate::report::format_residual_table(&run.residuals));

    if config.plot {
        let grid = crate::report::default_curve_grid(&run.fit.model)?;
        let plot = crate::plot::render_ascii_plot(&run.residuals, &grid, config.plot_width, config.plot_height);
        println!("{plot}");
    }

    // Optional exports.
    if let Some(path) = &config.export_residuals {
        crate::io::write_residuals_csv(path, &run.residuals)?;
        info!(path = %path.display(), "wrote residuals");
    }
    if let Some(path) = &config.export_fit {
        crate::io::write_fit_json(path, &run.fit, &run.dataset)?;
        info!(path = %path.display(), "wrote fit JSON");
    }

    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = sample_config_from_args(&args);
    let dataset = crate::data::generate_sample(&config)?;
    crate::io::write_observations(&args.out, &dataset)?;

    println!("Wrote {} observations to {}", dataset.len(), args.out.display());
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let doc = crate::io::read_fit_json(&args.fit)?;
    let plot = crate::plot::render_ascii_plot_from_fit_file(&doc, args.width, args.height);

    println!("{plot}");
    Ok(())
}

pub fn fit_config_from_args(args: &FitArgs) -> FitConfig {
    let zero_point = match args.zero_point {
        ZeroPointKind::Fixed => ZeroPointMode::Fixed(args.model.m0),
        ZeroPointKind::Free => ZeroPointMode::Free,
    };

    FitConfig {
        data_path: args.data.clone(),
        fit: FitOptions {
            constants: constants_from_args(&args.model),
            distance_law: distance_law_from_args(&args.model),
            zero_point,
            initial_l_peak: args.initial_lpeak,
            initial_zero_point: args.initial_m0,
            solver: LmOptions {
                max_iterations: args.max_iterations,
                ..LmOptions::default()
            },
        },
        plot: args.plot && !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
        export_residuals: args.export.clone(),
        export_fit: args.export_fit.clone(),
    }
}

pub fn sample_config_from_args(args: &SimulateArgs) -> SampleConfig {
    SampleConfig {
        count: args.count,
        z_min: args.z_min,
        z_max: args.z_max,
        l_peak: args.lpeak,
        magnitude_error: args.sigma,
        noise: args.noise,
        seed: args.seed,
        constants: constants_from_args(&args.model),
        distance_law: distance_law_from_args(&args.model),
    }
}

fn constants_from_args(args: &ModelArgs) -> PhysicalConstants {
    PhysicalConstants::with_hubble_constant(args.h0, args.m0)
}

fn distance_law_from_args(args: &ModelArgs) -> DistanceLaw {
    match args.distance {
        DistanceKind::LowZ => DistanceLaw::LowRedshift,
        DistanceKind::Exact => DistanceLaw::ExactLcdm {
            omega_lambda: args.omega_lambda,
            tolerance: QuadratureTolerance {
                abs_tol: args.quad_abs_tol,
                rel_tol: args.quad_rel_tol,
                ..QuadratureTolerance::default()
            },
        },
    }
}
