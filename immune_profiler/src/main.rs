use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::analysis::boxplot::plot_boxplots;
use crate::analysis::cohort::cohort_frequencies;
use crate::analysis::relative_frequency::calculate_relative_frequencies;
use crate::analysis::responder_comparison::perform_statistical_analysis;
use crate::config::AnalysisConfig;
use crate::helper_functions::project_root;

mod analysis;
mod config;
mod data_handling;
mod helper_functions;
mod models;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting the cell population analysis");

    let root = project_root();
    let config = AnalysisConfig::load(&root).context("loading analysis configuration")?;
    info!("Using {:?}", config);

    // Task 1: counts to percentages for every sample
    println!("\n---Task 1: Converting cell counts to percentages and analyzing relative frequencies---");
    calculate_relative_frequencies(&config.input_path, &config.frequencies_path)
        .with_context(|| format!("computing relative frequencies from {}", config.input_path.display()))?;

    // Task 2: responders vs non-responders within the cohort.
    // The cohort is loaded once and shared by the plot and the t-tests.
    println!("\n---Task 2: Analyzing responders vs non-responders---");
    let cohort = cohort_frequencies(&config.input_path, &config.cohort)
        .with_context(|| format!("building the responder cohort from {}", config.input_path.display()))?;
    plot_boxplots(&cohort, &config.boxplot_path)
        .with_context(|| format!("rendering box plots to {}", config.boxplot_path.display()))?;
    perform_statistical_analysis(&cohort).context("comparing responders and non-responders")?;

    Ok(())
}
