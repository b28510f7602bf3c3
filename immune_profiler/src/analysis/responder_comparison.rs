//! Responder vs non-responder comparison of per-population percentages.
//!
//! Each population is tested with an unpaired Student t-test (pooled variance,
//! two-sided). Degenerate inputs never fail: a group with fewer than two
//! values, or any NaN percentage, yields NaN for both the statistic and the
//! p-value.

use ndarray::ArrayView1;
use polars::prelude::*;
use statrs::distribution::{ContinuousCDF, StudentsT};
use tracing::{debug, info, warn};

use crate::analysis::relative_frequency::populations_in_order;
use crate::models::{ComparisonResult, Observation, Population};

pub const RESPONDER: &str = "y";
pub const NON_RESPONDER: &str = "n";

/// Independent two-sample t-test assuming equal variances.
///
/// Returns `(t, p)` with `t` computed as `mean(a) - mean(b)` over the pooled
/// standard error and `p` two-sided.
pub fn ttest_ind(a: &[f64], b: &[f64]) -> (f64, f64) {
    if a.len() < 2 || b.len() < 2 {
        return (f64::NAN, f64::NAN);
    }

    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let n1 = a.len() as f64;
    let n2 = b.len() as f64;
    let (mean1, mean2) = match (a.mean(), b.mean()) {
        (Some(m1), Some(m2)) => (m1, m2),
        _ => return (f64::NAN, f64::NAN),
    };

    let dof = n1 + n2 - 2.0;
    let pooled_var = ((n1 - 1.0) * a.var(1.0) + (n2 - 1.0) * b.var(1.0)) / dof;
    let se = (pooled_var * (1.0 / n1 + 1.0 / n2)).sqrt();
    let t_stat = (mean1 - mean2) / se;

    let p_val = if t_stat.is_nan() {
        f64::NAN
    } else if t_stat.is_infinite() {
        0.0
    } else {
        match StudentsT::new(0.0, 1.0, dof) {
            Ok(dist) => 2.0 * dist.sf(t_stat.abs()),
            Err(e) => {
                warn!("Student t distribution with {} degrees of freedom rejected: {}", dof, e);
                f64::NAN
            }
        }
    };

    (t_stat, p_val)
}

fn percentages_for(observations: &[Observation], population: Population, response: &str) -> Vec<f64> {
    observations
        .iter()
        .filter(|o| o.population == population && o.response.as_deref() == Some(response))
        .map(|o| o.percentage)
        .collect()
}

pub fn compare_responders(observations: &[Observation]) -> Vec<ComparisonResult> {
    populations_in_order(observations)
        .into_iter()
        .map(|population| {
            let responders = percentages_for(observations, population, RESPONDER);
            let non_responders = percentages_for(observations, population, NON_RESPONDER);
            let (t_stat, p_val) = ttest_ind(&responders, &non_responders);

            if responders.len() < 2 || non_responders.len() < 2 {
                warn!(
                    "{}: {} responders vs {} non-responders is too few for a t-test",
                    population,
                    responders.len(),
                    non_responders.len()
                );
            }
            debug!("{}: t = {:.4}, p = {:.4}", population, t_stat, p_val);

            ComparisonResult {
                population,
                t_stat,
                p_val,
            }
        })
        .collect()
}

pub fn results_frame(results: &[ComparisonResult]) -> PolarsResult<DataFrame> {
    let populations: Vec<&str> = results.iter().map(|r| r.population.as_str()).collect();
    let t_stats: Vec<f64> = results.iter().map(|r| r.t_stat).collect();
    let p_vals: Vec<f64> = results.iter().map(|r| r.p_val).collect();

    DataFrame::new(vec![
        Column::new("population".into(), populations),
        Column::new("t_stat".into(), t_stats),
        Column::new("p_val".into(), p_vals),
    ])
}

pub fn print_results(results: &[ComparisonResult]) -> PolarsResult<()> {
    let df = results_frame(results)?;
    println!("Statistical Analysis Results:");
    println!("{}", df);
    info!("Compared {} populations between responders and non-responders", results.len());
    Ok(())
}

/// Task 2 statistics: compare the cohort and print the table.
pub fn perform_statistical_analysis(observations: &[Observation]) -> PolarsResult<Vec<ComparisonResult>> {
    let results = compare_responders(observations);
    print_results(&results)?;
    Ok(results)
}
