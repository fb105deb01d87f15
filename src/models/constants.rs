//! Physical constants.
//!
//! Model functions never read these directly; they take `c`/`h0`/`zero_point`
//! as arguments. The consts only seed `PhysicalConstants::default()`.

use serde::{Deserialize, Serialize};

/// Speed of light in m/s.
pub const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;

/// Hubble constant in km/s/Mpc.
pub const HUBBLE_CONSTANT_KM_S_MPC: f64 = 75.0;

/// One megaparsec in metres (IAU 2015).
pub const METERS_PER_MPC: f64 = 3.085_677_581_491_367e22;

/// Reference magnitude zero-point.
pub const ZERO_POINT_MAGNITUDE: f64 = 20.25;

/// Dark-energy density fraction used when the exact law is selected without an override.
pub const DEFAULT_OMEGA_LAMBDA: f64 = 0.7;

/// Convert a Hubble constant in km/s/Mpc to an expansion rate in s⁻¹.
pub fn hubble_rate_per_second(h0_km_s_mpc: f64) -> f64 {
    h0_km_s_mpc * 1_000.0 / METERS_PER_MPC
}

/// Constants shared by every model evaluation in a run.
///
/// Units are SI throughout: `speed_of_light` in m/s and `hubble_rate` in s⁻¹,
/// so `c·z/H0` is a distance in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalConstants {
    pub speed_of_light: f64,
    pub hubble_rate: f64,
    pub zero_point: f64,
}

impl PhysicalConstants {
    /// Build constants from a Hubble constant given in km/s/Mpc.
    pub fn with_hubble_constant(h0_km_s_mpc: f64, zero_point: f64) -> Self {
        Self {
            speed_of_light: SPEED_OF_LIGHT_M_S,
            hubble_rate: hubble_rate_per_second(h0_km_s_mpc),
            zero_point,
        }
    }

    /// Hubble constant back in km/s/Mpc (for reports).
    pub fn hubble_constant_km_s_mpc(&self) -> f64 {
        self.hubble_rate * METERS_PER_MPC / 1_000.0
    }
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        Self::with_hubble_constant(HUBBLE_CONSTANT_KM_S_MPC, ZERO_POINT_MAGNITUDE)
    }
}
