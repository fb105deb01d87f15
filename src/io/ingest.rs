//! Observation file ingest.
//!
//! Format: one supernova per line, four columns
//!
//! ```text
//! name  z  magnitude  magnitude_error
//! ```
//!
//! separated by whitespace or commas (decided from the first data line). No
//! header row. Blank lines and `#` comments are ignored. The `name` column is
//! kept for reporting but takes no part in the fit.
//!
//! Unlike a screening tool this loader is strict: any malformed row fails the
//! whole load with the offending line number.

use std::path::Path;

use csv::StringRecord;
use tracing::{debug, info};

use crate::domain::{Dataset, Observation};
use crate::error::AppError;

/// Expected number of columns per row.
pub const COLUMN_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Comma,
    Whitespace,
}

/// Load observations from a file.
pub fn load_observations(path: &Path) -> Result<Dataset, AppError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::input(format!("Failed to open data file '{}': {e}", path.display())))?;

    let mut dataset = parse_observations(&text)
        .map_err(|e| AppError::input(format!("{}: {}", path.display(), e.message())))?;
    dataset.source = Some(path.to_path_buf());

    info!(path = %path.display(), n = dataset.len(), "loaded observations");
    Ok(dataset)
}

/// Parse observations from file contents.
pub fn parse_observations(text: &str) -> Result<Dataset, AppError> {
    let delimiter = detect_delimiter(text);
    debug!(?delimiter, "detected delimiter");

    let observations = match delimiter {
        Delimiter::Comma => parse_comma_rows(text)?,
        Delimiter::Whitespace => parse_whitespace_rows(text)?,
    };

    if observations.is_empty() {
        return Err(AppError::input("No observations found."));
    }

    Ok(Dataset::new(observations))
}

fn is_skipped(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn parse_comma_rows(text: &str) -> Result<Vec<Observation>, AppError> {
    // Skipped lines are blanked rather than removed so csv positions stay
    // aligned with file line numbers (the reader ignores empty lines).
    let blanked = text
        .lines()
        .map(|line| if is_skipped(line) { "" } else { line })
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(blanked.as_bytes());

    let mut observations = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| AppError::input(format!("Malformed data row: {e}")))?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
        observations.push(parse_record(&record, line)?);
    }
    Ok(observations)
}

fn parse_whitespace_rows(text: &str) -> Result<Vec<Observation>, AppError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !is_skipped(line))
        .map(|(i, line)| {
            let record = StringRecord::from(line.split_whitespace().collect::<Vec<_>>());
            parse_record(&record, i + 1)
        })
        .collect()
}

fn detect_delimiter(text: &str) -> Delimiter {
    let first = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'));
    match first {
        Some(line) if line.contains(',') => Delimiter::Comma,
        _ => Delimiter::Whitespace,
    }
}

fn parse_record(record: &StringRecord, line: usize) -> Result<Observation, AppError> {
    if record.len() != COLUMN_COUNT {
        return Err(AppError::input(format!(
            "Line {line}: expected {COLUMN_COUNT} columns (name z magnitude magnitude_error), found {}.",
            record.len()
        )));
    }

    let name = record.get(0).unwrap_or_default().to_string();
    let z = parse_number(record, 1, "z", line)?;
    let magnitude = parse_number(record, 2, "magnitude", line)?;
    let magnitude_error = parse_number(record, 3, "magnitude_error", line)?;

    if z < 0.0 {
        return Err(AppError::input(format!(
            "Line {line}: redshift must be >= 0, got {z}."
        )));
    }

    Ok(Observation {
        name,
        z,
        magnitude,
        magnitude_error,
    })
}

fn parse_number(record: &StringRecord, idx: usize, column: &str, line: usize) -> Result<f64, AppError> {
    let raw = record.get(idx).unwrap_or_default();
    let value: f64 = raw
        .parse()
        .map_err(|_| AppError::input(format!("Line {line}: column '{column}' is not a number: '{raw}'.")))?;
    if !value.is_finite() {
        return Err(AppError::input(format!("Line {line}: column '{column}' is not finite: '{raw}'.")));
    }
    Ok(value)
}
