use std::fs::File;
use std::path::{Path, PathBuf};

use polars::error::PolarsResult;
use polars::prelude::{col, lit, Expr};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::polars_err;

pub const CONFIG_FILE_NAME: &str = "analysis_config.json";

pub const DEFAULT_INPUT: &str = "cell-count.csv";
pub const DEFAULT_FREQUENCIES_OUTPUT: &str = "relative_frequencies.csv";
pub const DEFAULT_BOXPLOT_OUTPUT: &str = "boxplots.png";

/// A single `field == value` restriction on the sample table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConstraint {
    pub field: String,
    pub value: String,
}

impl FieldConstraint {
    pub fn new(field: &str, value: &str) -> Self {
        Self {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

/// Conjunction of field constraints selecting the responder-analysis cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortFilter {
    pub constraints: Vec<FieldConstraint>,
}

impl Default for CohortFilter {
    fn default() -> Self {
        Self {
            constraints: vec![
                FieldConstraint::new("sample_type", "PBMC"),
                FieldConstraint::new("treatment", "tr1"),
            ],
        }
    }
}

impl CohortFilter {
    pub fn fields(&self) -> Vec<&str> {
        self.constraints.iter().map(|c| c.field.as_str()).collect()
    }

    /// The filter as a polars predicate, `None` when there is nothing to restrict.
    pub fn predicate(&self) -> Option<Expr> {
        self.constraints
            .iter()
            .map(|c| col(c.field.as_str()).eq(lit(c.value.clone())))
            .reduce(|acc, e| acc.and(e))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub input_path: PathBuf,
    pub frequencies_path: PathBuf,
    pub boxplot_path: PathBuf,
    pub cohort: CohortFilter,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from(DEFAULT_INPUT),
            frequencies_path: PathBuf::from(DEFAULT_FREQUENCIES_OUTPUT),
            boxplot_path: PathBuf::from(DEFAULT_BOXPLOT_OUTPUT),
            cohort: CohortFilter::default(),
        }
    }
}

impl AnalysisConfig {
    /// Defaults, overridden by `analysis_config.json` in `root` when present.
    /// Relative paths are resolved against `root`.
    pub fn load(root: &Path) -> PolarsResult<Self> {
        let config_path = root.join(CONFIG_FILE_NAME);
        let config = if config_path.is_file() {
            info!("Reading analysis configuration from {}", config_path.display());
            let file = File::open(&config_path).map_err(|e| polars_err(Box::new(e)))?;
            serde_json::from_reader(file).map_err(|e| polars_err(Box::new(e)))?
        } else {
            AnalysisConfig::default()
        };
        Ok(config.resolved_against(root))
    }

    pub fn resolved_against(mut self, root: &Path) -> Self {
        for path in [&mut self.input_path, &mut self.frequencies_path, &mut self.boxplot_path] {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
        self
    }
}
