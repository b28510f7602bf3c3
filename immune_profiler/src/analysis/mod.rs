pub mod boxplot;
pub mod cohort;
pub mod relative_frequency;
pub mod responder_comparison;
