//! Fit driver: binds the magnitude–redshift model to observations.
//!
//! Responsibilities:
//!
//! - validate observations before any weighting (`σ > 0`, `z > 0`)
//! - choose the free parameters (`L_peak`, optionally `m0`)
//! - run weighted Levenberg–Marquardt and build the absolute-sigma covariance

pub mod fitter;

pub use fitter::*;
