pub mod cell_counts;
