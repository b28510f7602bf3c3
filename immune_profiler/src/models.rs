use std::fmt;

use polars::error::PolarsResult;
use polars::frame::DataFrame;
use polars::prelude::PolarsError;

/// Wrap any foreign error (io, csv, plotters, serde_json) into the polars error
/// type the pipeline stages return.
pub fn polars_err(e: Box<dyn std::error::Error>) -> PolarsError {
    PolarsError::ComputeError(format!("{}", e).into())
}

pub trait Dataset {
    fn load(&self) -> PolarsResult<DataFrame>;
}

/// The five immune-cell populations counted per sample, in column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Population {
    BCell,
    Cd8TCell,
    Cd4TCell,
    NkCell,
    Monocyte,
}

impl Population {
    pub const ALL: [Population; 5] = [
        Population::BCell,
        Population::Cd8TCell,
        Population::Cd4TCell,
        Population::NkCell,
        Population::Monocyte,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Population::BCell => "b_cell",
            Population::Cd8TCell => "cd8_t_cell",
            Population::Cd4TCell => "cd4_t_cell",
            Population::NkCell => "nk_cell",
            Population::Monocyte => "monocyte",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Population::BCell => 0,
            Population::Cd8TCell => 1,
            Population::Cd4TCell => 2,
            Population::NkCell => 3,
            Population::Monocyte => 4,
        }
    }
}

impl fmt::Display for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One biological sample in wide format.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub sample: String,
    pub response: Option<String>,
    pub counts: [i64; 5],
    pub total_count: i64,
}

impl SampleRecord {
    pub fn count(&self, population: Population) -> i64 {
        self.counts[population.index()]
    }

    /// Share of `population` in this sample, in percent. A zero total yields NaN.
    pub fn percentage(&self, population: Population) -> f64 {
        self.count(population) as f64 / self.total_count as f64 * 100.0
    }
}

/// One (sample, population) row of the long-format table.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub sample: String,
    pub total_count: i64,
    pub response: Option<String>,
    pub population: Population,
    pub count: i64,
    pub percentage: f64,
}

/// Outcome of the responder vs non-responder t-test for one population.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub population: Population,
    pub t_stat: f64,
    pub p_val: f64,
}
