//! Weighted nonlinear least-squares fit of `L_peak` (and optionally `m0`).
//!
//! Given observations `(z_i, m_i, σ_i)` the fitter minimises
//!
//! ```text
//! χ² = Σ ((m_i - m(z_i; L_peak, m0)) / σ_i)²
//! ```
//!
//! where `m(z; L, m0) = magnitude_from_peak_luminosity(L, z, m0, law, c, H0)`
//! with the constants and distance law held fixed. The covariance is
//! `(JᵀJ)⁺` of the σ-weighted Jacobian: supplied sigmas are treated as true
//! 1-σ errors and the covariance is never rescaled by `χ²/dof`.

use nalgebra::DVector;
use tracing::{debug, info, warn};

use crate::domain::{
    Dataset, FitQuality, FitResult, FittedModel, Observation, ParameterKind, ZeroPointMode,
};
use crate::error::AppError;
use crate::math::{LeastSquaresProblem, LevenbergMarquardt, LmOptions, covariance_from_jacobian};
use crate::models::{
    DistanceLaw, PhysicalConstants, ZERO_POINT_MAGNITUDE, magnitude_from_peak_luminosity,
    peak_luminosity_from_magnitude,
};

/// Relative singular-value cut-off for the finite-difference Jacobian.
///
/// Forward differences divide residual rounding (~1e-14) by steps of order
/// `√ε`, leaving relative column errors near 1e-7; weaker directions are noise.
const JACOBIAN_RCOND: f64 = 1e-5;

/// Options that define the fitted model and how it is solved.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub constants: PhysicalConstants,
    pub distance_law: DistanceLaw,
    pub zero_point: ZeroPointMode,

    /// Starting `L_peak`. `None` uses the data-driven estimate.
    pub initial_l_peak: Option<f64>,
    /// Starting `m0` in free mode. `None` uses `constants.zero_point`.
    pub initial_zero_point: Option<f64>,

    pub solver: LmOptions,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            constants: PhysicalConstants::default(),
            distance_law: DistanceLaw::LowRedshift,
            zero_point: ZeroPointMode::Fixed(ZERO_POINT_MAGNITUDE),
            initial_l_peak: None,
            initial_zero_point: None,
            solver: LmOptions::default(),
        }
    }
}

impl FitOptions {
    pub fn parameters(&self) -> Vec<ParameterKind> {
        match self.zero_point {
            ZeroPointMode::Fixed(_) => vec![ParameterKind::PeakLuminosity],
            ZeroPointMode::Free => vec![ParameterKind::PeakLuminosity, ParameterKind::ZeroPoint],
        }
    }

    fn starting_zero_point(&self) -> f64 {
        match self.zero_point {
            ZeroPointMode::Fixed(m0) => m0,
            ZeroPointMode::Free => self.initial_zero_point.unwrap_or(self.constants.zero_point),
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        let c = self.constants.speed_of_light;
        let h0 = self.constants.hubble_rate;
        if !(c.is_finite() && c > 0.0 && h0.is_finite() && h0 > 0.0) {
            return Err(AppError::validation(format!(
                "Speed of light and Hubble rate must be finite and > 0 (c={c}, H0={h0})."
            )));
        }
        if !self.starting_zero_point().is_finite() {
            return Err(AppError::validation("Zero-point magnitude must be finite."));
        }
        if let Some(l) = self.initial_l_peak {
            if !(l.is_finite() && l > 0.0) {
                return Err(AppError::validation(format!(
                    "Initial peak luminosity must be finite and > 0, got {l}."
                )));
            }
        }
        if let DistanceLaw::ExactLcdm { omega_lambda, tolerance } = &self.distance_law {
            if !omega_lambda.is_finite() {
                return Err(AppError::validation(format!("Omega_L must be finite, got {omega_lambda}.")));
            }
            tolerance.validate()?;
        }
        if self.solver.max_iterations == 0 {
            return Err(AppError::validation("Solver iteration limit must be >= 1."));
        }
        Ok(())
    }
}

/// Weighted magnitude residuals `(m_i - m(z_i; p)) / σ_i`.
struct MagnitudeResiduals<'a> {
    observations: &'a [Observation],
    options: &'a FitOptions,
}

impl MagnitudeResiduals<'_> {
    fn zero_point(&self, params: &DVector<f64>) -> f64 {
        match self.options.zero_point {
            ZeroPointMode::Fixed(m0) => m0,
            ZeroPointMode::Free => params[1],
        }
    }
}

impl LeastSquaresProblem for MagnitudeResiduals<'_> {
    fn residuals(&self, params: &DVector<f64>) -> Result<DVector<f64>, AppError> {
        let k = &self.options.constants;
        let l_peak = params[0];
        let m0 = self.zero_point(params);

        let mut out = DVector::<f64>::zeros(self.observations.len());
        for (i, o) in self.observations.iter().enumerate() {
            let predicted = magnitude_from_peak_luminosity(
                l_peak,
                o.z,
                m0,
                &self.options.distance_law,
                k.speed_of_light,
                k.hubble_rate,
            )?;
            out[i] = (o.magnitude - predicted) / o.magnitude_error;
        }
        Ok(out)
    }
}

/// Fit the peak luminosity (and, in free mode, the zero-point) to `dataset`.
pub fn fit_peak_luminosity(dataset: &Dataset, options: &FitOptions) -> Result<FitResult, AppError> {
    options.validate()?;
    let parameters = options.parameters();
    validate_observations(&dataset.observations, parameters.len())?;

    let m0_start = options.starting_zero_point();
    let l_start = match options.initial_l_peak {
        Some(l) => l,
        None => estimate_initial_l_peak(&dataset.observations, m0_start, options)?,
    };

    let initial = match options.zero_point {
        ZeroPointMode::Fixed(_) => DVector::from_row_slice(&[l_start]),
        ZeroPointMode::Free => DVector::from_row_slice(&[l_start, m0_start]),
    };
    debug!(
        n = dataset.len(),
        l_start,
        m0_start,
        law = %options.distance_law.display_name(),
        "starting fit"
    );

    let problem = MagnitudeResiduals {
        observations: &dataset.observations,
        options,
    };
    let report = LevenbergMarquardt::new(options.solver).minimize(&problem, initial)?;

    let (covariance, rank) = covariance_from_jacobian(&report.jacobian, JACOBIAN_RCOND).ok_or_else(|| {
        AppError::fit_failed("Covariance could not be computed: Jacobian is zero or non-finite at the optimum.")
    })?;
    if rank < parameters.len() {
        warn!(
            rank,
            n_params = parameters.len(),
            "fit is rank-deficient; only m0 - 2.5*log10(L_peak) is constrained, covariance is a pseudo-inverse"
        );
    }

    let n = dataset.len();
    let dof = n.saturating_sub(parameters.len());
    let l_peak = report.params[0];
    if !(l_peak.is_finite() && l_peak > 0.0) {
        return Err(AppError::fit_failed(format!(
            "Solver returned a non-physical peak luminosity {l_peak}."
        )));
    }

    let mut constants = options.constants;
    constants.zero_point = match options.zero_point {
        ZeroPointMode::Fixed(m0) => m0,
        ZeroPointMode::Free => report.params[1],
    };

    let quality = FitQuality {
        n,
        chi_square: report.chi_square,
        dof,
        reduced_chi_square: (dof > 0).then(|| report.chi_square / dof as f64),
        rank,
        iterations: report.iterations,
        evaluations: report.evaluations,
        termination: report.termination,
    };

    info!(
        l_peak,
        m0 = constants.zero_point,
        chi_square = quality.chi_square,
        iterations = quality.iterations,
        "fit converged"
    );

    Ok(FitResult {
        parameters,
        values: report.params,
        covariance,
        zero_point_mode: options.zero_point,
        model: FittedModel {
            l_peak,
            constants,
            distance_law: options.distance_law,
        },
        quality,
    })
}

/// Reject observations that cannot be weighted or evaluated.
pub fn validate_observations(observations: &[Observation], n_params: usize) -> Result<(), AppError> {
    if observations.is_empty() {
        return Err(AppError::validation("No observations to fit."));
    }
    if observations.len() < n_params {
        return Err(AppError::validation(format!(
            "Need at least {n_params} observations for {n_params} free parameters, got {}.",
            observations.len()
        )));
    }
    for (i, o) in observations.iter().enumerate() {
        if !(o.magnitude_error.is_finite() && o.magnitude_error > 0.0) {
            return Err(AppError::validation(format!(
                "Observation {} ('{}') has magnitude error {}; uncertainties must be finite and > 0.",
                i + 1,
                o.name,
                o.magnitude_error
            )));
        }
        if !(o.z.is_finite() && o.z > 0.0) {
            return Err(AppError::validation(format!(
                "Observation {} ('{}') has redshift {}; the flux model needs z > 0.",
                i + 1,
                o.name,
                o.z
            )));
        }
        if !o.magnitude.is_finite() {
            return Err(AppError::validation(format!(
                "Observation {} ('{}') has a non-finite magnitude.",
                i + 1,
                o.name
            )));
        }
    }
    Ok(())
}

/// Starting `L_peak`: inverse-variance weighted geometric mean of the
/// luminosity each observation implies on its own.
///
/// With `m0` fixed the model is linear in `log10 L_peak`, so this is already
/// the least-squares optimum and the solver only has to confirm it.
pub fn estimate_initial_l_peak(
    observations: &[Observation],
    zero_point: f64,
    options: &FitOptions,
) -> Result<f64, AppError> {
    let k = &options.constants;
    let mut sum_w = 0.0;
    let mut sum_wlog = 0.0;
    for o in observations {
        let l = peak_luminosity_from_magnitude(
            o.magnitude,
            o.z,
            zero_point,
            &options.distance_law,
            k.speed_of_light,
            k.hubble_rate,
        )?;
        if !(l.is_finite() && l > 0.0) {
            return Err(AppError::domain(format!(
                "Observation '{}' implies a non-physical luminosity {l}.",
                o.name
            )));
        }
        let w = 1.0 / (o.magnitude_error * o.magnitude_error);
        sum_w += w;
        sum_wlog += w * l.log10();
    }
    Ok(10f64.powf(sum_wlog / sum_w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::math::QuadratureTolerance;
    use approx::assert_relative_eq;

    const L_TRUE: f64 = 3.9e51;

    fn example_dataset() -> Dataset {
        Dataset::new(vec![
            obs("sn1", 0.01, 14.5, 0.1),
            obs("sn2", 0.02, 15.8, 0.1),
            obs("sn3", 0.03, 16.6, 0.12),
        ])
    }

    fn obs(name: &str, z: f64, magnitude: f64, magnitude_error: f64) -> Observation {
        Observation {
            name: name.to_string(),
            z,
            magnitude,
            magnitude_error,
        }
    }

    fn exact_law() -> DistanceLaw {
        DistanceLaw::ExactLcdm {
            omega_lambda: 0.7,
            tolerance: QuadratureTolerance::default(),
        }
    }

    fn synthetic(l_peak: f64, m0: f64, law: DistanceLaw) -> Dataset {
        let k = PhysicalConstants::default();
        let observations = (1..=12)
            .map(|i| {
                let z = 0.008 * i as f64;
                let m = magnitude_from_peak_luminosity(l_peak, z, m0, &law, k.speed_of_light, k.hubble_rate).unwrap();
                Observation {
                    name: format!("SYN-{i:02}"),
                    z,
                    magnitude: m,
                    magnitude_error: 0.1 + 0.01 * i as f64,
                }
            })
            .collect();
        Dataset::new(observations)
    }

    fn assert_psd(result: &FitResult) {
        let cov = &result.covariance;
        assert!(cov.iter().all(|v| v.is_finite()));
        for a in 0..cov.nrows() {
            for b in 0..cov.ncols() {
                assert_relative_eq!(cov[(a, b)], cov[(b, a)], max_relative = 1e-9);
            }
        }
        let eig = cov.clone().symmetric_eigen();
        let scale = eig.eigenvalues.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        assert!(eig.eigenvalues.iter().all(|&l| l >= -1e-9 * scale));
    }

    #[test]
    fn recovers_true_luminosity_from_noiseless_data() {
        for law in [DistanceLaw::LowRedshift, exact_law()] {
            let ds = synthetic(L_TRUE, ZERO_POINT_MAGNITUDE, law);
            let opts = FitOptions {
                distance_law: law,
                ..FitOptions::default()
            };
            let fit = fit_peak_luminosity(&ds, &opts).unwrap();
            assert_relative_eq!(fit.values[0], L_TRUE, max_relative = 1e-8);
            assert!(fit.quality.chi_square < 1e-12, "chi2={}", fit.quality.chi_square);
            assert_eq!(fit.covariance.shape(), (1, 1));
            assert!(fit.covariance[(0, 0)] > 0.0);
        }
    }

    #[test]
    fn converges_from_a_poor_starting_point() {
        let ds = synthetic(L_TRUE, ZERO_POINT_MAGNITUDE, DistanceLaw::LowRedshift);
        for start in [L_TRUE * 50.0, L_TRUE / 1e3] {
            let opts = FitOptions {
                initial_l_peak: Some(start),
                ..FitOptions::default()
            };
            let fit = fit_peak_luminosity(&ds, &opts).unwrap();
            assert_relative_eq!(fit.values[0], L_TRUE, max_relative = 1e-6);
            assert!(fit.quality.iterations > 0);
        }
    }

    #[test]
    fn covariance_matches_analytic_absolute_sigma_value() {
        // m = m0 - 2.5 log10(L) + g(z): ∂m/∂L = -2.5 / (L ln 10), so
        // var(L) = (L ln10 / 2.5)² / Σ 1/σ_i².
        let ds = synthetic(L_TRUE, ZERO_POINT_MAGNITUDE, DistanceLaw::LowRedshift);
        let fit = fit_peak_luminosity(&ds, &FitOptions::default()).unwrap();
        let sum_w: f64 = ds.observations.iter().map(|o| 1.0 / (o.magnitude_error * o.magnitude_error)).sum();
        let expected = (L_TRUE * std::f64::consts::LN_10 / 2.5).powi(2) / sum_w;
        assert_relative_eq!(fit.covariance[(0, 0)], expected, max_relative = 1e-5);
    }

    #[test]
    fn covariance_is_not_rescaled_by_chi_square() {
        let base = example_dataset();
        let mut doubled = base.clone();
        for o in &mut doubled.observations {
            o.magnitude_error *= 2.0;
        }

        let a = fit_peak_luminosity(&base, &FitOptions::default()).unwrap();
        let b = fit_peak_luminosity(&doubled, &FitOptions::default()).unwrap();

        // Uniform sigma scaling leaves the optimum alone and scales the
        // absolute-sigma covariance by exactly 4.
        assert_relative_eq!(a.values[0], b.values[0], max_relative = 1e-8);
        assert_relative_eq!(b.covariance[(0, 0)], 4.0 * a.covariance[(0, 0)], max_relative = 1e-5);
    }

    #[test]
    fn example_dataset_gives_positive_luminosity() {
        let fit = fit_peak_luminosity(&example_dataset(), &FitOptions::default()).unwrap();
        assert!(fit.values[0].is_finite() && fit.values[0] > 0.0);
        assert_eq!(fit.covariance.shape(), (1, 1));
        assert_psd(&fit);
        assert_eq!(fit.quality.dof, 2);
        assert!(fit.quality.reduced_chi_square.unwrap().is_finite());
        // Order of magnitude check against the single-point inversion at z=0.01.
        assert!(fit.values[0] > 1e51 && fit.values[0] < 1e52);
    }

    #[test]
    fn free_zero_point_yields_psd_two_by_two_covariance() {
        let opts = FitOptions {
            zero_point: ZeroPointMode::Free,
            ..FitOptions::default()
        };
        let fit = fit_peak_luminosity(&example_dataset(), &opts).unwrap();
        assert_eq!(fit.parameters, vec![ParameterKind::PeakLuminosity, ParameterKind::ZeroPoint]);
        assert_eq!(fit.covariance.shape(), (2, 2));
        assert!(fit.values[0] > 0.0);
        assert_psd(&fit);
    }

    #[test]
    fn free_zero_point_recovers_identifiable_combination() {
        let m0_true = 19.8;
        let law = exact_law();
        let ds = synthetic(L_TRUE, m0_true, law);
        let opts = FitOptions {
            distance_law: law,
            zero_point: ZeroPointMode::Free,
            ..FitOptions::default()
        };
        let fit = fit_peak_luminosity(&ds, &opts).unwrap();

        let combo = |m0: f64, l: f64| m0 - 2.5 * l.log10();
        let m0_fit = fit.value_of(ParameterKind::ZeroPoint).unwrap();
        assert_relative_eq!(combo(m0_fit, fit.values[0]), combo(m0_true, L_TRUE), epsilon = 1e-8);
        assert_eq!(fit.quality.rank, 1);
        for o in &ds.observations {
            assert_relative_eq!(fit.model.predict(o.z).unwrap(), o.magnitude, epsilon = 1e-8);
        }
    }

    #[test]
    fn zero_point_mode_selects_free_parameters() {
        let fixed = FitOptions::default();
        assert_eq!(fixed.parameters(), vec![ParameterKind::PeakLuminosity]);
        let free = FitOptions {
            zero_point: ZeroPointMode::Free,
            ..FitOptions::default()
        };
        assert_eq!(free.parameters(), vec![ParameterKind::PeakLuminosity, ParameterKind::ZeroPoint]);
    }

    #[test]
    fn free_zero_point_spreads_uncertainty_over_both_parameters() {
        let ds = synthetic(L_TRUE, 19.8, DistanceLaw::LowRedshift);
        for start in [L_TRUE, L_TRUE * 20.0, L_TRUE / 100.0] {
            let opts = FitOptions {
                zero_point: ZeroPointMode::Free,
                initial_l_peak: Some(start),
                ..FitOptions::default()
            };
            let fit = fit_peak_luminosity(&ds, &opts).unwrap();
            let errors = fit.std_errors();
            assert_eq!(fit.quality.rank, 1);
            assert!(errors[0] > 0.0, "L_peak std error is {}", errors[0]);
            assert!(errors[1] > 0.0);
            // Variance lies along the constrained combination m0 - 2.5 log10(L),
            // which pairs the two parameters with opposite signs.
            assert!(fit.covariance[(0, 1)] < 0.0);
            assert_psd(&fit);
        }
    }

    #[test]
    fn free_zero_point_started_at_truth_stays_there() {
        let m0_true = 19.8;
        let ds = synthetic(L_TRUE, m0_true, DistanceLaw::LowRedshift);
        let opts = FitOptions {
            zero_point: ZeroPointMode::Free,
            initial_l_peak: Some(L_TRUE),
            initial_zero_point: Some(m0_true),
            ..FitOptions::default()
        };
        let fit = fit_peak_luminosity(&ds, &opts).unwrap();
        assert_relative_eq!(fit.values[0], L_TRUE, max_relative = 1e-8);
        assert_relative_eq!(fit.values[1], m0_true, epsilon = 1e-8);
    }

    #[test]
    fn zero_uncertainty_is_a_validation_error() {
        let mut ds = example_dataset();
        ds.observations[1].magnitude_error = 0.0;
        let err = fit_peak_luminosity(&ds, &FitOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.message().contains("sn2"));
    }

    #[test]
    fn all_zero_uncertainties_are_a_validation_error() {
        let mut ds = example_dataset();
        for o in &mut ds.observations {
            o.magnitude_error = 0.0;
        }
        let err = fit_peak_luminosity(&ds, &FitOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn zero_redshift_is_a_validation_error() {
        let mut ds = example_dataset();
        ds.observations[0].z = 0.0;
        let err = fit_peak_luminosity(&ds, &FitOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn empty_dataset_is_a_validation_error() {
        let err = fit_peak_luminosity(&Dataset::default(), &FitOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn too_few_points_for_free_mode_is_rejected() {
        let ds = Dataset::new(vec![obs("only", 0.02, 15.8, 0.1)]);
        let opts = FitOptions {
            zero_point: ZeroPointMode::Free,
            ..FitOptions::default()
        };
        let err = fit_peak_luminosity(&ds, &opts).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn iteration_limit_surfaces_fit_failure() {
        let ds = synthetic(L_TRUE, ZERO_POINT_MAGNITUDE, DistanceLaw::LowRedshift);
        let opts = FitOptions {
            initial_l_peak: Some(L_TRUE * 1e6),
            solver: LmOptions {
                max_iterations: 1,
                ..LmOptions::default()
            },
            ..FitOptions::default()
        };
        let err = fit_peak_luminosity(&ds, &opts).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FitFailed);
    }

    #[test]
    fn initial_estimate_is_exact_for_single_parameter_fit() {
        let ds = synthetic(L_TRUE, ZERO_POINT_MAGNITUDE, DistanceLaw::LowRedshift);
        let l0 = estimate_initial_l_peak(&ds.observations, ZERO_POINT_MAGNITUDE, &FitOptions::default()).unwrap();
        assert_relative_eq!(l0, L_TRUE, max_relative = 1e-10);
    }
}
