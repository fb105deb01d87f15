//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - CLI-facing enums (`DistanceKind`, `ZeroPointKind`)
//! - observations and datasets (`Observation`, `Dataset`)
//! - fit outputs (`FitResult`, `FittedModel`, `FitFile`, etc.)

pub mod types;

pub use types::*;
