use anyhow::{Context, Result};
use std::path::Path;

/// Load one named column of a headered CSV as an f64 vector.
pub fn load_column(path: &Path, column: &str) -> Result<Vec<f64>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader.headers().context("missing CSV header row")?;
    let col_idx = headers
        .iter()
        .position(|h| h == column)
        .with_context(|| format!("column '{column}' not found in header"))?;

    let mut out = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("malformed CSV record {}", row + 2))?;
        let field = record
            .get(col_idx)
            .with_context(|| format!("row {} has no column '{column}'", row + 2))?;
        let value: f64 = field
            .trim()
            .parse()
            .with_context(|| format!("row {} column '{column}' is not f64: {field}", row + 2))?;
        out.push(value);
    }
    if out.is_empty() {
        anyhow::bail!("no numeric samples in column '{column}'");
    }
    Ok(out)
}
