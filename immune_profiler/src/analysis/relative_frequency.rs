use std::path::Path;

use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::data_handling::cell_counts::{records, with_total_count, CellCountDataset};
use crate::helper_functions::write_rows_csv;
use crate::models::{Dataset, Observation, Population, SampleRecord};

pub const FREQUENCY_HEADER: [&str; 5] = ["sample", "total_count", "population", "count", "percentage"];

/// Melt wide sample records into long observations.
///
/// Rows come out population-major: every sample (in input order) for `b_cell`,
/// then every sample for `cd8_t_cell`, and so on, giving exactly five rows per
/// sample. `response` is carried only when `keep_response` is set.
pub fn reshape_long(samples: &[SampleRecord], keep_response: bool) -> Vec<Observation> {
    let mut out = Vec::with_capacity(samples.len() * Population::ALL.len());
    for population in Population::ALL {
        for record in samples {
            out.push(Observation {
                sample: record.sample.clone(),
                total_count: record.total_count,
                response: if keep_response { record.response.clone() } else { None },
                population,
                count: record.count(population),
                percentage: record.percentage(population),
            });
        }
    }
    out
}

/// Populations in the order they first appear in `observations`.
pub fn populations_in_order(observations: &[Observation]) -> Vec<Population> {
    let mut seen = Vec::new();
    for obs in observations {
        if !seen.contains(&obs.population) {
            seen.push(obs.population);
        }
    }
    seen
}

/// Totals, reshape and percentages for an already validated frame.
pub fn relative_frequencies(df: DataFrame, keep_response: bool) -> PolarsResult<Vec<Observation>> {
    let df = with_total_count(df)?;
    let samples = records(&df)?;
    let zero_totals = samples.iter().filter(|s| s.total_count == 0).count();
    if zero_totals > 0 {
        debug!("{} samples have a zero total; their percentages are NaN", zero_totals);
    }
    Ok(reshape_long(&samples, keep_response))
}

#[derive(Serialize)]
struct FrequencyRow<'a> {
    sample: &'a str,
    total_count: i64,
    population: &'static str,
    count: i64,
    // NaN is written as an empty field
    percentage: Option<f64>,
}

impl<'a> From<&'a Observation> for FrequencyRow<'a> {
    fn from(obs: &'a Observation) -> Self {
        FrequencyRow {
            sample: &obs.sample,
            total_count: obs.total_count,
            population: obs.population.as_str(),
            count: obs.count,
            percentage: if obs.percentage.is_nan() { None } else { Some(obs.percentage) },
        }
    }
}

pub fn write_frequencies(observations: &[Observation], output_path: &Path) -> PolarsResult<()> {
    write_rows_csv(output_path, &FREQUENCY_HEADER, observations.iter().map(FrequencyRow::from))
}

/// Task 1: per-sample relative frequencies for every sample in `input_path`,
/// written to `output_path`.
pub fn calculate_relative_frequencies(input_path: &Path, output_path: &Path) -> PolarsResult<Vec<Observation>> {
    let df = CellCountDataset {
        path: input_path.to_path_buf(),
    }
    .load()?;

    let observations = relative_frequencies(df, false)?;
    write_frequencies(&observations, output_path)?;

    info!("Wrote {} frequency rows to {}", observations.len(), output_path.display());
    println!("Relative frequencies saved to {}", output_path.display());
    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    const HEADER: &str = "sample,sample_type,treatment,response,b_cell,cd8_t_cell,cd4_t_cell,nk_cell,monocyte";

    fn write_input(dir: &Path, rows: &[&str]) -> std::path::PathBuf {
        let path = dir.join("cell-count.csv");
        let mut body = format!("{}\n", HEADER);
        for row in rows {
            body.push_str(row);
            body.push('\n');
        }
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn five_rows_per_sample_with_every_population_once() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(
            dir.path(),
            &[
                "s1,PBMC,tr1,y,100,200,300,150,250",
                "s2,PBMC,tr2,n,5,5,5,5,5",
                "s3,tumor,tr1,,40,10,0,30,20",
            ],
        );
        let output = dir.path().join("relative_frequencies.csv");

        let obs = calculate_relative_frequencies(&input, &output).unwrap();
        assert_eq!(obs.len(), 15);

        let mut per_sample: HashMap<&str, Vec<Population>> = HashMap::new();
        for o in &obs {
            per_sample.entry(o.sample.as_str()).or_default().push(o.population);
            assert!(o.response.is_none());
        }
        assert_eq!(per_sample.len(), 3);
        for pops in per_sample.values() {
            assert_eq!(pops.as_slice(), &Population::ALL);
        }

        // population-major order
        assert_eq!(obs[0].sample, "s1");
        assert_eq!(obs[1].sample, "s2");
        assert_eq!(obs[2].sample, "s3");
        assert_eq!(obs[3].population, Population::Cd8TCell);
    }

    #[test]
    fn percentages_sum_to_one_hundred() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(
            dir.path(),
            &["s1,PBMC,tr1,y,7,13,29,3,11", "s2,PBMC,tr1,n,1,1,1,0,0"],
        );
        let obs = calculate_relative_frequencies(&input, &dir.path().join("out.csv")).unwrap();

        let mut sums: HashMap<&str, f64> = HashMap::new();
        for o in &obs {
            *sums.entry(o.sample.as_str()).or_default() += o.percentage;
        }
        for (sample, sum) in sums {
            assert!((sum - 100.0).abs() < 1e-6, "{} sums to {}", sample, sum);
        }
    }

    #[test]
    fn zero_total_gives_nan_without_disturbing_other_samples() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), &["empty,PBMC,tr1,y,0,0,0,0,0", "s2,PBMC,tr1,n,20,0,0,0,0"]);
        let output = dir.path().join("out.csv");
        let obs = calculate_relative_frequencies(&input, &output).unwrap();

        let empty: Vec<&Observation> = obs.iter().filter(|o| o.sample == "empty").collect();
        assert_eq!(empty.len(), 5);
        assert!(empty.iter().all(|o| o.percentage.is_nan()));

        let b_cell = obs
            .iter()
            .find(|o| o.sample == "s2" && o.population == Population::BCell)
            .unwrap();
        assert_eq!(b_cell.percentage, 100.0);

        let written = fs::read_to_string(&output).unwrap();
        assert!(written.contains("empty,0,b_cell,0,\n"));
    }

    #[test]
    fn output_file_has_expected_columns_and_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), &["s1,PBMC,tr1,y,10,10,10,10,10"]);
        let output = dir.path().join("relative_frequencies.csv");
        fs::write(&output, "stale contents\n").unwrap();

        calculate_relative_frequencies(&input, &output).unwrap();

        let mut reader = csv::Reader::from_path(&output).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(header, FREQUENCY_HEADER);
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 5);
        assert_eq!(&rows[0][0], "s1");
        assert_eq!(&rows[0][1], "50");
        assert_eq!(&rows[0][2], "b_cell");
        assert_eq!(rows[0][4].parse::<f64>().unwrap(), 20.0);
    }

    #[test]
    fn missing_column_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cell-count.csv");
        fs::write(&path, "sample,b_cell,cd8_t_cell\ns1,1,2\n").unwrap();
        let err = calculate_relative_frequencies(&path, &dir.path().join("out.csv")).unwrap_err();
        assert!(matches!(err, PolarsError::ColumnNotFound(_)));
    }
}
