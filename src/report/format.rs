//! Formatted terminal output for a fit run.

use crate::domain::{Dataset, FitResult, ObservationResidual, ZeroPointMode};

/// Format the full run summary (dataset stats + parameters + covariance + diagnostics).
pub fn format_run_summary(dataset: &Dataset, fit: &FitResult) -> String {
    let mut out = String::new();
    let k = &fit.model.constants;

    out.push_str("=== lpeak - Type Ia peak luminosity fit ===\n");
    if let Some(path) = &dataset.source {
        out.push_str(&format!("Data: {}\n", path.display()));
    }
    if let Some(s) = dataset.stats() {
        out.push_str(&format!(
            "Points: n={} | z=[{:.4}, {:.4}] | mag=[{:.2}, {:.2}]\n",
            s.n_points, s.z_min, s.z_max, s.mag_min, s.mag_max
        ));
    }
    out.push_str(&format!(
        "Model: {} | H0={:.2} km/s/Mpc | c={:.0} m/s\n",
        fit.model.distance_law.display_name(),
        k.hubble_constant_km_s_mpc(),
        k.speed_of_light
    ));
    match fit.zero_point_mode {
        ZeroPointMode::Fixed(m0) => out.push_str(&format!("Zero-point: fixed m0={m0:.4}\n")),
        ZeroPointMode::Free => out.push_str("Zero-point: free\n"),
    }

    out.push_str("\nParameters (1-sigma, absolute):\n");
    for ((kind, value), err) in fit.parameters.iter().zip(fit.values.iter()).zip(fit.std_errors()) {
        out.push_str(&format!("  {:<12} = {:.6e} +/- {:.3e}\n", kind.display_name(), value, err));
    }

    out.push_str("\nCovariance:\n");
    for row in fit.covariance.row_iter() {
        let cells: Vec<String> = row.iter().map(|v| format!("{v:>14.6e}")).collect();
        out.push_str(&format!("  [{}]\n", cells.join(" ")));
    }

    let q = &fit.quality;
    out.push('\n');
    out.push_str(&format!(
        "chi2={:.4} dof={} reduced={} rank={}/{}\n",
        q.chi_square,
        q.dof,
        q.reduced_chi_square.map(|v| format!("{v:.4}")).unwrap_or_else(|| "n/a".to_string()),
        q.rank,
        fit.parameters.len()
    ));
    out.push_str(&format!(
        "Solver: {} after {} iterations ({} evaluations)\n",
        q.termination.describe(),
        q.iterations,
        q.evaluations
    ));

    out
}

/// Format the per-observation residual table.
pub fn format_residual_table(rows: &[ObservationResidual]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<16} {:>8} {:>9} {:>7} {:>9} {:>9} {:>7}",
            "name", "z", "mag", "err", "fitted", "resid", "pull"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<16} {:-<8} {:-<9} {:-<7} {:-<9} {:-<9} {:-<7}",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for r in rows {
        let o = &r.observation;
        out.push_str(
            format!(
                "{:<16} {:>8.4} {:>9.3} {:>7.3} {:>9.3} {:>9.3} {:>7.2}",
                truncate(&o.name, 16),
                o.z,
                o.magnitude,
                o.magnitude_error,
                r.fitted,
                r.residual,
                r.pull
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
