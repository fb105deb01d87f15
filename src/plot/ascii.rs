//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - observed magnitudes: `o`
//! - 1-sigma error bars: `|`
//! - fitted curve: `-` line

use crate::domain::{CurveGrid, FitFile, Observation, ObservationResidual};

/// Render observations and the fitted curve for an in-memory fit.
pub fn render_ascii_plot(
    residuals: &[ObservationResidual],
    grid: &CurveGrid,
    width: usize,
    height: usize,
) -> String {
    let points: Vec<&Observation> = residuals.iter().map(|r| &r.observation).collect();
    render_plot(&points, &curve_points(grid), width, height)
}

/// Render a saved fit file (observations + precomputed curve grid).
pub fn render_ascii_plot_from_fit_file(doc: &FitFile, width: usize, height: usize) -> String {
    let points: Vec<&Observation> = doc.observations.iter().collect();
    render_plot(&points, &curve_points(&doc.grid), width, height)
}

fn curve_points(grid: &CurveGrid) -> Vec<(f64, f64)> {
    grid.z
        .iter()
        .zip(grid.magnitude.iter())
        .map(|(&z, &m)| (z, m))
        .collect()
}

fn render_plot(points: &[&Observation], curve: &[(f64, f64)], width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (z_min, z_max) = z_range(points, curve).unwrap_or((0.0, 1.0));
    let (m_min, m_max) = magnitude_range(points, curve).unwrap_or((0.0, 1.0));
    let (m_min, m_max) = pad_range(m_min, m_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Curve first, then error bars and points on top.
    draw_curve(&mut grid, curve, z_min, z_max, m_min, m_max);

    for o in points {
        let x = map_x(o.z, z_min, z_max, width);
        let top = map_y(o.magnitude + o.magnitude_error, m_min, m_max, height);
        let bottom = map_y(o.magnitude - o.magnitude_error, m_min, m_max, height);
        for row in grid.iter_mut().take(bottom + 1).skip(top) {
            row[x] = '|';
        }
    }
    for o in points {
        let x = map_x(o.z, z_min, z_max, width);
        let y = map_y(o.magnitude, m_min, m_max, height);
        grid[y][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: z=[{z_min:.3}, {z_max:.3}] | mag=[{m_min:.2}, {m_max:.2}]\n"
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn z_range(points: &[&Observation], curve: &[(f64, f64)]) -> Option<(f64, f64)> {
    let zs = points.iter().map(|o| o.z).chain(curve.iter().map(|&(z, _)| z));
    finite_span(zs)
}

fn magnitude_range(points: &[&Observation], curve: &[(f64, f64)]) -> Option<(f64, f64)> {
    let ms = points
        .iter()
        .flat_map(|o| [o.magnitude - o.magnitude_error, o.magnitude + o.magnitude_error])
        .chain(curve.iter().map(|&(_, m)| m));
    finite_span(ms)
}

fn finite_span(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values {
        min = min.min(v);
        max = max.max(v);
    }
    if min.is_finite() && max.is_finite() && max > min {
        Some((min, max))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(z: f64, z_min: f64, z_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((z - z_min) / (z_max - z_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(m: f64, m_min: f64, m_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((m - m_min) / (m_max - m_min)).clamp(0.0, 1.0);
    // Largest magnitude on row 0.
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], z_min: f64, z_max: f64, m_min: f64, m_max: f64) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(z, m) in curve {
        let x = map_x(z, z_min, z_max, width);
        let y = map_y(m, m_min, m_max, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, x, y, '-');
        } else {
            grid[y][x] = '-';
        }
        prev = Some((x, y));
    }
}

/// Integer line drawing (Bresenham).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
