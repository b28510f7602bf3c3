use std::env;
use std::fs::{create_dir_all, File};
use std::path::{Path, PathBuf};

use polars::error::PolarsResult;
use polars::frame::DataFrame;
use polars::prelude::{CsvReadOptions, PolarsError, SerReader};
use serde::Serialize;

use crate::models::polars_err;

pub fn project_root() -> PathBuf {
    match env::var_os("PROJECT_ROOT") {
        Some(val) => PathBuf::from(val),
        None => {
            // Fall back to current directory if PROJECT_ROOT not set
            env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        }
    }
}

pub fn read_csv(file_path: &Path) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(file_path.to_path_buf()))?
        .finish()
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

/// Fail with `ColumnNotFound` on the first column of `names` missing from `df`.
pub fn require_columns(df: &DataFrame, names: &[&str]) -> PolarsResult<()> {
    for &name in names {
        if !has_column(df, name) {
            return Err(PolarsError::ColumnNotFound(
                format!("required column `{}` is missing from the input", name).into(),
            ));
        }
    }
    Ok(())
}

/// Serialize `rows` to a CSV at `path` under `header`, replacing any existing file.
/// The header is written even when there are no rows.
pub fn write_rows_csv<T: Serialize>(
    path: &Path,
    header: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> PolarsResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent).map_err(|e| polars_err(Box::new(e)))?;
    }
    let file = File::create(path).map_err(|e| polars_err(Box::new(e)))?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    writer.write_record(header).map_err(|e| polars_err(Box::new(e)))?;
    for row in rows {
        writer.serialize(row).map_err(|e| polars_err(Box::new(e)))?;
    }
    writer.flush().map_err(|e| polars_err(Box::new(e)))?;
    Ok(())
}
