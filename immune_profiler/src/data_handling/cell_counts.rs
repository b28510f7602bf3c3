use std::collections::HashSet;
use std::path::PathBuf;

use polars::prelude::*;
use tracing::{debug, error, info, warn};

use crate::helper_functions::{has_column, read_csv, require_columns};
use crate::models::{Dataset, Population, SampleRecord};

pub const SAMPLE_COL: &str = "sample";
pub const RESPONSE_COL: &str = "response";
pub const TOTAL_COUNT_COL: &str = "total_count";

/// Wide-format cell count table, one row per sample.
pub struct CellCountDataset {
    pub path: PathBuf,
}

impl Dataset for CellCountDataset {
    fn load(&self) -> PolarsResult<DataFrame> {
        info!("Reading cell counts from {}", self.path.display());

        let df = match read_csv(&self.path) {
            Ok(df) => df,
            Err(e) => {
                error!("Failed to read cell count CSV: {}", e);
                return Err(e);
            }
        };
        debug!("Loaded {} rows, {} cols", df.height(), df.width());

        validate_counts(df)
    }
}

/// Check the sample column and the five count columns, casting counts to Int64
/// and the sample identifier to a string.
pub fn validate_counts(mut df: DataFrame) -> PolarsResult<DataFrame> {
    let mut required = vec![SAMPLE_COL];
    required.extend(Population::ALL.iter().map(|p| p.as_str()));
    require_columns(&df, &required)?;

    let sample = df.column(SAMPLE_COL)?.cast(&DataType::String)?;
    df.with_column(sample)?;

    for population in Population::ALL {
        let name = population.as_str();
        if df.column(name)?.dtype().is_float() {
            reject_fractional_counts(&df, name)?;
        }
        let counts = df.column(name)?.cast(&DataType::Int64)?;
        if counts.null_count() > 0 {
            return Err(PolarsError::ComputeError(
                format!("column `{}` has {} missing or non-integer values", name, counts.null_count()).into(),
            ));
        }
        df.with_column(counts)?;
    }

    let samples = df.column(SAMPLE_COL)?.str()?;
    for population in Population::ALL {
        let counts = df.column(population.as_str())?.i64()?;
        for (i, value) in counts.into_no_null_iter().enumerate() {
            if value < 0 {
                return Err(PolarsError::ComputeError(
                    format!(
                        "negative {} count {} for sample {}",
                        population,
                        value,
                        samples.get(i).unwrap_or("<missing>")
                    )
                    .into(),
                ));
            }
        }
    }

    let mut seen = HashSet::new();
    let duplicates = samples.into_iter().flatten().filter(|s| !seen.insert(*s)).count();
    if duplicates > 0 {
        warn!("{} duplicate sample identifiers in input", duplicates);
    }

    Ok(df)
}

/// Float-typed count columns are accepted only when every value is whole;
/// casting would otherwise truncate `10.7` to `10`.
fn reject_fractional_counts(df: &DataFrame, name: &str) -> PolarsResult<()> {
    let samples = df.column(SAMPLE_COL)?.str()?;
    let values = df.column(name)?.cast(&DataType::Float64)?;
    for (i, value) in values.f64()?.into_iter().enumerate() {
        if let Some(v) = value.filter(|v| v.fract() != 0.0) {
            return Err(PolarsError::ComputeError(
                format!(
                    "column `{}` has non-integer count {} for sample {}",
                    name,
                    v,
                    samples.get(i).unwrap_or("<missing>")
                )
                .into(),
            ));
        }
    }
    Ok(())
}

/// Append `total_count`, the per-sample sum of the five population counts.
pub fn with_total_count(df: DataFrame) -> PolarsResult<DataFrame> {
    let total = Population::ALL
        .iter()
        .map(|p| col(p.as_str()))
        .reduce(|acc, e| acc + e)
        .map(|e| e.alias(TOTAL_COUNT_COL));

    match total {
        Some(total) => df.lazy().with_column(total).collect(),
        None => Ok(df),
    }
}

fn optional_str_column(df: &DataFrame, name: &str) -> PolarsResult<Option<Vec<Option<String>>>> {
    if !has_column(df, name) {
        return Ok(None);
    }
    let column = df.column(name)?.cast(&DataType::String)?;
    let values = column
        .str()?
        .into_iter()
        .map(|v| v.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string))
        .collect();
    Ok(Some(values))
}

/// Convert a validated frame carrying `total_count` into typed records.
pub fn records(df: &DataFrame) -> PolarsResult<Vec<SampleRecord>> {
    let samples = df.column(SAMPLE_COL)?.str()?;
    let totals = df.column(TOTAL_COUNT_COL)?.i64()?;
    let counts = Population::ALL
        .iter()
        .map(|p| -> PolarsResult<Int64Chunked> { Ok(df.column(p.as_str())?.i64()?.clone()) })
        .collect::<PolarsResult<Vec<Int64Chunked>>>()?;

    let responses = optional_str_column(df, RESPONSE_COL)?;

    let mut out = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let mut row_counts = [0i64; 5];
        for (slot, ca) in row_counts.iter_mut().zip(counts.iter()) {
            *slot = ca.get(i).unwrap_or(0);
        }
        out.push(SampleRecord {
            sample: samples.get(i).unwrap_or_default().to_string(),
            response: responses.as_ref().and_then(|v| v[i].clone()),
            counts: row_counts,
            total_count: totals.get(i).unwrap_or(0),
        });
    }
    Ok(out)
}
