//! Threat-score datasets: CSV over HTTP or synthetic.

use std::io::Read;

use rand::Rng;
use tracing::{info, warn};

use crate::error::DatasetError;

/// GETs `url` and parses the body as a `ThreatID,ThreatScore` CSV.
pub fn fetch(url: &str) -> Result<Vec<f64>, DatasetError> {
    let body = fetch_body(url)?;
    let values = parse_csv(&body)?;
    info!(url, values = values.len(), "fetched dataset");
    Ok(values)
}

pub fn fetch_body(url: &str) -> Result<String, DatasetError> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| DatasetError::Transport(e.to_string()))?;

    // into_string() caps the body at 10 MB, datasets can be larger
    let mut body = String::new();
    response
        .into_reader()
        .read_to_string(&mut body)
        .map_err(|e| DatasetError::Transport(e.to_string()))?;
    Ok(body)
}

/// Skips the header line and collects the second comma-separated field of
/// every other line. Trailing blank lines are ignored; a blank line between
/// records is an empty value.
pub fn parse_csv(body: &str) -> Result<Vec<f64>, DatasetError> {
    body.trim_end()
        .lines()
        .enumerate()
        .skip(1)
        .map(|(idx, line)| {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                return Err(DatasetError::InvalidNumber {
                    line: line_no,
                    value: String::new(),
                });
            }
            let field = line
                .split(',')
                .nth(1)
                .ok_or(DatasetError::MissingField { line: line_no })?
                .trim();
            field
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| DatasetError::InvalidNumber {
                    line: line_no,
                    value: field.to_string(),
                })
        })
        .collect()
}

pub fn clamp_size(requested: usize, available: usize) -> usize {
    requested.min(available)
}

/// Shrinks `dataset` to at most `requested` values and returns the size kept.
pub fn truncate_to(dataset: &mut Vec<f64>, requested: usize) -> usize {
    let size = clamp_size(requested, dataset.len());
    if size < requested {
        warn!(requested, available = dataset.len(), "dataset smaller than requested size");
    }
    dataset.truncate(size);
    size
}

/// `size` scores of the form `k / 1000` with `k` uniform in 0..1000.
pub fn generate_synthetic<R: Rng>(size: usize, rng: &mut R) -> Vec<f64> {
    (0..size)
        .map(|_| rng.gen_range(0..1000u32) as f64 / 1000.0)
        .collect()
}
