use std::path::Path;

use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::analysis::relative_frequency::relative_frequencies;
use crate::config::CohortFilter;
use crate::data_handling::cell_counts::{CellCountDataset, RESPONSE_COL};
use crate::helper_functions::require_columns;
use crate::models::{Dataset, Observation};

/// Keep only the rows matching every constraint of `filter`.
pub fn filter_cohort(df: DataFrame, filter: &CohortFilter) -> PolarsResult<DataFrame> {
    require_columns(&df, &filter.fields())?;

    let Some(predicate) = filter.predicate() else {
        return Ok(df);
    };

    // constrained columns are compared as strings
    let mut lf = df.lazy();
    for field in filter.fields() {
        lf = lf.with_column(col(field).cast(DataType::String));
    }
    lf.filter(predicate).collect()
}

/// Restrict a validated frame to the cohort and reshape it, keeping `response`.
pub fn cohort_observations(df: DataFrame, filter: &CohortFilter) -> PolarsResult<Vec<Observation>> {
    require_columns(&df, &[RESPONSE_COL])?;

    let before = df.height();
    let cohort = filter_cohort(df, filter)?;
    debug!("Cohort filter kept {} of {} samples", cohort.height(), before);

    if cohort.height() == 0 {
        warn!("No samples match the cohort filter {:?}", filter.constraints);
    }

    relative_frequencies(cohort, true)
}

/// Task 2 input: load `input_path` and return the long-format cohort table.
pub fn cohort_frequencies(input_path: &Path, filter: &CohortFilter) -> PolarsResult<Vec<Observation>> {
    let df = CellCountDataset {
        path: input_path.to_path_buf(),
    }
    .load()?;

    let observations = cohort_observations(df, filter)?;
    info!("Cohort table has {} observations", observations.len());
    Ok(observations)
}
