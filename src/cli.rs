//! Command-line interface definitions and argument parsing

use chrono::NaiveDate;
use clap::Parser;

use crate::error::Error;
use crate::summary::TimeUnit;

/// Customer repeat-purchase forecasting CLI using a BG/NBD model
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file (columns: customer_id, date, optional
    /// monetary_value). When omitted, a synthetic dataset is generated.
    #[arg(short, long)]
    pub input: Option<String>,

    /// Number of customers in the generated sample dataset
    #[arg(long, default_value_t = 500)]
    pub sample_customers: usize,

    /// Seed for the sample-data generator
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Penalizer coefficient (L2 regularization strength, 0.0-1.0)
    #[arg(short, long, default_value_t = 0.0)]
    pub penalizer: f64,

    /// Prediction horizon in the chosen time unit
    #[arg(long, default_value_t = 60.0)]
    pub horizon: f64,

    /// Time unit for recency, T, and the horizon
    #[arg(long, value_enum, default_value_t = TimeUnit::Days)]
    pub unit: TimeUnit,

    /// Calibration/holdout split date (YYYY-MM-DD); enables the validation chart
    #[arg(long)]
    pub split_date: Option<NaiveDate>,

    /// Output path for the results archive
    #[arg(short, long, default_value = "predictions_and_model_params.zip")]
    pub bundle: String,

    /// Output path for the frequency-recency heatmap
    #[arg(long, default_value = "frequency_recency_matrix.png")]
    pub heatmap: String,

    /// Output path for the calibration/holdout validation chart
    #[arg(long, default_value = "model_validation.png")]
    pub validation: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Immutable per-run pipeline configuration, built once from the parsed
/// arguments and passed through the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub penalizer: f64,
    pub horizon: f64,
    pub unit: TimeUnit,
    pub split_date: Option<NaiveDate>,
}

impl Args {
    /// Validate the tunables and freeze them into a [`PipelineConfig`].
    pub fn config(&self) -> crate::Result<PipelineConfig> {
        if self.penalizer < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "penalizer coefficient must be non-negative (got {})",
                self.penalizer
            )));
        }
        if self.horizon < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "prediction horizon must be non-negative (got {})",
                self.horizon
            )));
        }
        Ok(PipelineConfig {
            penalizer: self.penalizer,
            horizon: self.horizon,
            unit: self.unit,
            split_date: self.split_date,
        })
    }
}
