//! Distance/flux model for Type Ia supernovae.
//!
//! Everything here is a pure function of redshift and explicitly passed
//! parameters, so the fitter can wrap it without hidden state:
//!
//! - `constants`: physical constants and their defaults
//! - `distance`: distance-factor laws (low-z approximation, exact flat ΛCDM)
//! - `photometry`: flux <-> magnitude and the peak-luminosity composition

pub mod constants;
pub mod distance;
pub mod photometry;

pub use constants::*;
pub use distance::*;
pub use photometry::*;
