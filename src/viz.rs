//! Chart data shaping and Plotters rendering: the frequency/recency
//! expected-purchases heatmap and the calibration-vs-holdout validation
//! chart.
//!
//! The data-shaping functions are the reproducible contract; rendering just
//! paints their output with Plotters.

use std::collections::BTreeMap;

use ndarray::Array2;
use plotters::prelude::*;

use crate::error::Error;
use crate::model::BgNbdModel;
use crate::summary::CustomerSummary;

/// Axis cap for both heatmap dimensions.
const AXIS_CAP: u32 = 50;

/// Frequency buckets shown on the validation chart; higher frequencies are
/// collapsed into the last bucket.
const MAX_COMPARISON_BUCKET: u32 = 9;

/// Expected-purchases matrix keyed by (recency, frequency) bucket.
#[derive(Debug, Clone)]
pub struct HeatmapData {
    /// Shape (max_recency + 1, max_frequency + 1); `cells[[i, j]]` is the
    /// expected purchase count for recency `i`, frequency `j`.
    pub cells: Array2<f64>,
    pub max_frequency: u32,
    pub max_recency: u32,
    pub horizon: f64,
}

/// Actual vs predicted holdout purchases per calibration-frequency bucket.
#[derive(Debug, Clone)]
pub struct ComparisonData {
    pub frequencies: Vec<u32>,
    pub actual: Vec<f64>,
    pub predicted: Vec<f64>,
    pub horizon: f64,
}

/// Shape the frequency/recency heatmap from a fitted model.
///
/// Axes span the observed frequency and observation-age ranges, capped at
/// 50 buckets each.
pub fn heatmap_matrix(
    model: &BgNbdModel,
    summaries: &[CustomerSummary],
    horizon: f64,
) -> crate::Result<HeatmapData> {
    if summaries.is_empty() {
        return Err(Error::EmptyInput);
    }

    let max_frequency = summaries
        .iter()
        .map(|s| s.frequency)
        .max()
        .unwrap_or(0)
        .min(AXIS_CAP);
    let max_recency = summaries
        .iter()
        .map(|s| s.t as u32)
        .max()
        .unwrap_or(0)
        .min(AXIS_CAP);

    let cells = Array2::from_shape_fn(
        (max_recency as usize + 1, max_frequency as usize + 1),
        |(recency, frequency)| {
            model.expected_purchases(
                horizon,
                frequency as f64,
                recency as f64,
                max_recency as f64,
            )
        },
    );

    Ok(HeatmapData { cells, max_frequency, max_recency, horizon })
}

/// Shape the calibration-vs-holdout comparison: for each calibration
/// frequency bucket, the mean actual holdout purchase count against the
/// model's mean prediction over the holdout duration.
///
/// Fails with [`Error::InsufficientData`] when the holdout window is empty.
pub fn calibration_comparison(
    model: &BgNbdModel,
    calibration: &[CustomerSummary],
    holdout_counts: &BTreeMap<String, u32>,
    holdout_duration: f64,
) -> crate::Result<ComparisonData> {
    if calibration.is_empty() {
        return Err(Error::EmptyInput);
    }
    if holdout_counts.values().all(|&c| c == 0) {
        return Err(Error::InsufficientData);
    }

    let mut actual_sums: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    let mut predicted_sums: BTreeMap<u32, f64> = BTreeMap::new();

    for summary in calibration {
        let bucket = summary.frequency.min(MAX_COMPARISON_BUCKET);
        let actual = holdout_counts.get(&summary.customer_id).copied().unwrap_or(0) as f64;
        let predicted = model.expected_purchases(
            holdout_duration,
            summary.frequency as f64,
            summary.recency,
            summary.t,
        );

        let entry = actual_sums.entry(bucket).or_insert((0.0, 0));
        entry.0 += actual;
        entry.1 += 1;
        *predicted_sums.entry(bucket).or_insert(0.0) += predicted;
    }

    let mut frequencies = Vec::new();
    let mut actual = Vec::new();
    let mut predicted = Vec::new();
    for (bucket, (sum, count)) in actual_sums {
        frequencies.push(bucket);
        actual.push(sum / count as f64);
        predicted.push(predicted_sums[&bucket] / count as f64);
    }

    Ok(ComparisonData { frequencies, actual, predicted, horizon: holdout_duration })
}

/// Render the heatmap to a PNG file.
pub fn render_heatmap(data: &HeatmapData, output_path: &str) -> crate::Result<()> {
    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let max_value = data.cells.iter().cloned().fold(f64::MIN, f64::max).max(f64::MIN_POSITIVE);

    let mut chart = ChartBuilder::on(&root)
        .caption("Frequency-Recency Matrix", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(
            0f64..(data.max_frequency as f64 + 1.0),
            0f64..(data.max_recency as f64 + 1.0),
        )
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Frequency")
        .y_desc("Recency")
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(chart_err)?;

    for ((recency, frequency), &value) in data.cells.indexed_iter() {
        let x = frequency as f64;
        let y = recency as f64;
        let color = heat_color(value / max_value);
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(x, y), (x + 1.0, y + 1.0)],
                color.filled(),
            )))
            .map_err(chart_err)?;
    }

    root.present().map_err(chart_err)?;
    println!("Frequency-recency heatmap saved to: {}", output_path);
    Ok(())
}

/// Render the calibration-vs-holdout comparison chart to a PNG file.
pub fn render_comparison(data: &ComparisonData, output_path: &str) -> crate::Result<()> {
    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let y_max = data
        .actual
        .iter()
        .chain(&data.predicted)
        .cloned()
        .fold(f64::MIN, f64::max)
        .max(1.0);
    let x_max = *data.frequencies.last().unwrap_or(&1) as f64;

    let mut chart = ChartBuilder::on(&root)
        .caption("Actual vs Predicted Holdout Purchases", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..(x_max + 0.5), 0f64..(y_max * 1.1))
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .x_desc("Purchases in Calibration Window")
        .y_desc("Mean Purchases in Holdout Window")
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(chart_err)?;

    let actual_points: Vec<(f64, f64)> = data
        .frequencies
        .iter()
        .zip(&data.actual)
        .map(|(&f, &v)| (f as f64, v))
        .collect();
    let predicted_points: Vec<(f64, f64)> = data
        .frequencies
        .iter()
        .zip(&data.predicted)
        .map(|(&f, &v)| (f as f64, v))
        .collect();

    chart
        .draw_series(LineSeries::new(actual_points.clone(), BLUE.stroke_width(2)))
        .map_err(chart_err)?
        .label("Actual")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], BLUE.stroke_width(2)));
    chart
        .draw_series(LineSeries::new(predicted_points.clone(), RED.stroke_width(2)))
        .map_err(chart_err)?
        .label("Model")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], RED.stroke_width(2)));

    chart
        .draw_series(actual_points.iter().map(|&p| Circle::new(p, 3, BLUE.filled())))
        .map_err(chart_err)?;
    chart
        .draw_series(predicted_points.iter().map(|&p| Circle::new(p, 3, RED.filled())))
        .map_err(chart_err)?;

    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .draw()
        .map_err(chart_err)?;

    root.present().map_err(chart_err)?;
    println!("Validation chart saved to: {}", output_path);
    Ok(())
}

fn chart_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Chart(e.to_string())
}

/// Two-segment color ramp from dark purple through teal to yellow.
fn heat_color(t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    let (from, to, local) = if t < 0.5 {
        ((68.0, 1.0, 84.0), (33.0, 145.0, 140.0), t * 2.0)
    } else {
        ((33.0, 145.0, 140.0), (253.0, 231.0, 37.0), (t - 0.5) * 2.0)
    };
    RGBColor(
        (from.0 + (to.0 - from.0) * local) as u8,
        (from.1 + (to.1 - from.1) * local) as u8,
        (from.2 + (to.2 - from.2) * local) as u8,
    )
}
