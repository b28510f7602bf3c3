use std::fs::create_dir_all;
use std::path::Path;

use plotters::prelude::*;
use plotters_backend::FontTransform;
use polars::error::PolarsResult;
use tracing::info;

use crate::analysis::relative_frequency::populations_in_order;
use crate::models::{polars_err, Observation, Population};

const PLOT_WIDTH: u32 = 1200;
const PLOT_HEIGHT: u32 = 800;
const GROUP_WIDTH: f64 = 0.8;
const TITLE: &str = "Cell Population Relative Frequencies: Responders vs Non-Responders";

/// Five-number summary drawn for one box.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxStats {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    /// Most extreme values still within 1.5 IQR of the box.
    pub whisker_low: f64,
    pub whisker_high: f64,
    pub outliers: Vec<f64>,
}

impl BoxStats {
    /// `None` when there is no finite value to summarise.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }

        let quartiles = Quartiles::new(&finite);
        let [lower_fence, q1, median, q3, upper_fence] = quartiles.values().map(f64::from);

        let inside = finite.iter().copied().filter(|v| *v >= lower_fence && *v <= upper_fence);
        let whisker_low = inside.clone().fold(f64::INFINITY, f64::min).min(q1);
        let whisker_high = inside.fold(f64::NEG_INFINITY, f64::max).max(q3);
        let outliers = finite
            .iter()
            .copied()
            .filter(|v| *v < lower_fence || *v > upper_fence)
            .collect();

        Some(BoxStats {
            q1,
            median,
            q3,
            whisker_low,
            whisker_high,
            outliers,
        })
    }
}

/// Response labels in order of first appearance. Rows without a response
/// have no hue and are left out of the plot.
fn hue_levels(observations: &[Observation]) -> Vec<String> {
    let mut levels: Vec<String> = Vec::new();
    for response in observations.iter().filter_map(|o| o.response.as_ref()) {
        if !levels.contains(response) {
            levels.push(response.clone());
        }
    }
    levels
}

/// One box per (population, response) pair; only non-empty groups are kept.
pub fn grouped_box_stats(observations: &[Observation]) -> Vec<(Population, String, BoxStats)> {
    let mut out = Vec::new();
    let skipped = observations.iter().filter(|o| !o.percentage.is_finite()).count();
    if skipped > 0 {
        log::warn!("Skipped {} non-finite percentages while building box plots", skipped);
    }
    for population in populations_in_order(observations) {
        for level in hue_levels(observations) {
            let values: Vec<f64> = observations
                .iter()
                .filter(|o| o.population == population && o.response.as_deref() == Some(level.as_str()))
                .map(|o| o.percentage)
                .collect();
            if let Some(stats) = BoxStats::from_values(&values) {
                out.push((population, level, stats));
            }
        }
    }
    out
}

pub fn plot_boxplots(observations: &[Observation], output_path: &Path) -> PolarsResult<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent).map_err(|e| polars_err(Box::new(e)))?;
    }

    let populations = populations_in_order(observations);
    let levels = hue_levels(observations);
    let boxes = grouped_box_stats(observations);

    let y_max = boxes
        .iter()
        .flat_map(|(_, _, s)| s.outliers.iter().copied().chain(std::iter::once(s.whisker_high)))
        .fold(0.0_f64, f64::max);
    let y_hi = if y_max > 0.0 { y_max * 1.05 } else { 100.0 };
    let n_pops = populations.len().max(1) as f64;

    let palette = [
        RGBColor(31, 119, 180),
        RGBColor(255, 127, 14),
        RGBColor(44, 160, 44),
        RGBColor(214, 39, 40),
        RGBColor(148, 103, 189),
    ];

    let root = BitMapBackend::new(output_path, (PLOT_WIDTH, PLOT_HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| polars_err(Box::new(e)))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(TITLE, ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(110)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5..(n_pops - 0.5), 0.0..y_hi)
        .map_err(|e| polars_err(Box::new(e)))?;

    let x_label_style = TextStyle::from(("sans-serif", 16)).transform(FontTransform::Rotate90);
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(populations.len().max(1))
        .x_label_style(x_label_style)
        .x_label_formatter(&|val: &f64| {
            let idx = val.round();
            if idx >= 0.0 && (idx as usize) < populations.len() && (val - idx).abs() < 1e-6 {
                populations[idx as usize].to_string()
            } else {
                String::new()
            }
        })
        .x_desc("population")
        .y_desc("percentage")
        .axis_desc_style(("sans-serif", 18))
        .draw()
        .map_err(|e| polars_err(Box::new(e)))?;

    let n_levels = levels.len().max(1) as f64;
    let box_width = GROUP_WIDTH / n_levels;

    for (h, level) in levels.iter().enumerate() {
        let colour = palette[h % palette.len()];
        let placed: Vec<(f64, &BoxStats)> = boxes
            .iter()
            .filter(|(_, l, _)| l == level)
            .filter_map(|(pop, _, stats)| {
                let p = populations.iter().position(|x| x == pop)? as f64;
                let centre = p - GROUP_WIDTH / 2.0 + box_width * (h as f64 + 0.5);
                Some((centre, stats))
            })
            .collect();

        let half = box_width * 0.45;
        chart
            .draw_series(placed.iter().map(|(c, s)| {
                Rectangle::new([(c - half, s.q1), (c + half, s.q3)], colour.mix(0.8).filled())
            }))
            .map_err(|e| polars_err(Box::new(e)))?
            .label(format!("response = {}", level))
            .legend(move |(x, y)| Rectangle::new([(x, y - 6), (x + 16, y + 6)], colour.filled()));

        for (c, s) in &placed {
            let lines = vec![
                vec![(c - half, s.q1), (c + half, s.q1), (c + half, s.q3), (c - half, s.q3), (c - half, s.q1)],
                vec![(c - half, s.median), (c + half, s.median)],
                vec![(*c, s.q3), (*c, s.whisker_high)],
                vec![(*c, s.q1), (*c, s.whisker_low)],
                vec![(c - half / 2.0, s.whisker_high), (c + half / 2.0, s.whisker_high)],
                vec![(c - half / 2.0, s.whisker_low), (c + half / 2.0, s.whisker_low)],
            ];
            chart
                .draw_series(lines.into_iter().map(|l| PathElement::new(l, BLACK.stroke_width(1))))
                .map_err(|e| polars_err(Box::new(e)))?;
            chart
                .draw_series(s.outliers.iter().map(|v| Circle::new((*c, *v), 3, BLACK.stroke_width(1))))
                .map_err(|e| polars_err(Box::new(e)))?;
        }
    }

    if !levels.is_empty() {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(&BLACK)
            .position(SeriesLabelPosition::UpperRight)
            .draw()
            .map_err(|e| polars_err(Box::new(e)))?;
    }

    root.present().map_err(|e| polars_err(Box::new(e)))?;

    info!("Drew {} boxes for {} populations", boxes.len(), populations.len());
    println!("Boxplots saved to {}\n", output_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn obs(response: Option<&str>, population: Population, percentage: f64) -> Observation {
        Observation {
            sample: "s".to_string(),
            total_count: 100,
            response: response.map(str::to_string),
            population,
            count: 0,
            percentage,
        }
    }

    #[test]
    fn box_stats_of_a_simple_series() {
        let stats = BoxStats::from_values(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(stats.median, 3.0);
        assert_eq!(stats.q1, 2.0);
        assert_eq!(stats.q3, 4.0);
        assert_eq!(stats.whisker_low, 1.0);
        assert_eq!(stats.whisker_high, 5.0);
        assert!(stats.outliers.is_empty());
    }

    #[test]
    fn far_value_is_an_outlier() {
        let stats = BoxStats::from_values(&[10.0, 11.0, 12.0, 13.0, 14.0, 95.0]).unwrap();
        assert_eq!(stats.outliers, vec![95.0]);
        assert!(stats.whisker_high < 95.0);
    }

    #[test]
    fn non_finite_values_are_dropped() {
        assert!(BoxStats::from_values(&[f64::NAN, f64::NAN]).is_none());
        assert!(BoxStats::from_values(&[]).is_none());
        let stats = BoxStats::from_values(&[f64::NAN, 7.0]).unwrap();
        assert_eq!(stats.median, 7.0);
    }

    #[test]
    fn groups_follow_population_then_response_order() {
        let data = vec![
            obs(Some("n"), Population::BCell, 10.0),
            obs(Some("y"), Population::BCell, 20.0),
            obs(Some("n"), Population::NkCell, 30.0),
            obs(Some("y"), Population::NkCell, f64::NAN),
        ];
        let groups = grouped_box_stats(&data);
        let keys: Vec<(Population, &str)> = groups.iter().map(|(p, l, _)| (*p, l.as_str())).collect();
        assert_eq!(
            keys,
            vec![
                (Population::BCell, "n"),
                (Population::BCell, "y"),
                (Population::NkCell, "n"),
            ]
        );
    }

    #[test]
    fn rows_without_response_get_no_box() {
        let data = vec![
            obs(None, Population::BCell, 50.0),
            obs(Some("y"), Population::BCell, 20.0),
            obs(None, Population::Monocyte, 40.0),
        ];
        assert_eq!(hue_levels(&data), vec!["y".to_string()]);

        let groups = grouped_box_stats(&data);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, Population::BCell);
        assert_eq!(groups[0].1, "y");
        assert_eq!(groups[0].2.median, 20.0);
    }

    #[test]
    fn renders_cohort_to_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("figures").join("boxplots.png");
        let mut data = Vec::new();
        for (response, shift) in [("y", 0.0), ("n", 5.0)] {
            for population in Population::ALL {
                for k in 0..4 {
                    data.push(obs(Some(response), population, 10.0 + shift + k as f64));
                }
            }
        }

        plot_boxplots(&data, &path).unwrap();
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn empty_cohort_still_writes_a_plot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boxplots.png");
        assert!(grouped_box_stats(&[]).is_empty());

        plot_boxplots(&[], &path).unwrap();
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }
}
