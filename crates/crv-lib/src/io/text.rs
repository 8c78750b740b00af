//! Newline-delimited sample input, the lowest common denominator for
//! exported physiological recordings.

use crate::signal::Signal;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse newline-delimited samples into a signal at the given rate.
/// Blank lines and `#` comments are skipped.
pub fn parse_signal(text: &str, sample_rate: u32) -> Result<Signal> {
    let mut data = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let sample: f64 = trimmed.parse().with_context(|| {
            format!("sample on line {} is not a number: {trimmed}", idx + 1)
        })?;
        data.push(sample);
    }
    if data.is_empty() {
        anyhow::bail!("recording carries no samples");
    }
    Ok(Signal::new(data, sample_rate))
}

/// Read a newline-delimited recording from disk.
pub fn read_signal(path: &Path, sample_rate: u32) -> Result<Signal> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_signal(&text, sample_rate)
}
