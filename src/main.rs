//! RepeatCast: customer repeat-purchase forecasting CLI using a BG/NBD model
//!
//! This is the main entrypoint that orchestrates ingestion, aggregation,
//! model fitting, prediction, visualization, and export.

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use repeatcast::{
    summary::purchase_counts, viz, Args, BgNbdModel, PipelineConfig, ResultBundle,
    TransactionRecord,
};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = args.config()?;

    if args.verbose {
        println!("RepeatCast - Purchase Forecasting with BG/NBD");
        println!("=============================================\n");
    }

    run_pipeline(&args, config)
}

/// Run one synchronous pass: ingest -> aggregate -> fit -> predict ->
/// {visualize, export}.
fn run_pipeline(args: &Args, config: PipelineConfig) -> Result<()> {
    println!("=== Forecasting Pipeline ===\n");
    let start_time = Instant::now();

    // Step 1: Ingest transactions (file upload or synthetic sample)
    let records = load_or_generate(args)?;
    println!("✓ Transactions ingested: {} rows", records.len());

    // Step 2: Aggregate per-customer summaries
    if args.verbose {
        println!("\nStep 2: Aggregating customer summaries ({:?})", config.unit);
    }
    let summaries = repeatcast::summarize(&records, None, config.unit)?;
    println!("✓ Customers summarized: {}", summaries.len());
    if args.verbose {
        print_summary_preview(&summaries);
    }

    // Step 3: Fit the BG/NBD model
    if args.verbose {
        println!("\nStep 3: Fitting BG/NBD model");
        println!("  Penalizer coefficient: {}", config.penalizer);
    }
    let fit_start = Instant::now();
    let model = BgNbdModel::fit(&summaries, config.penalizer)?;
    println!("✓ Model fitted in {} iterations", model.iterations);
    println!(
        "  r={:.4}, alpha={:.4}, a={:.4}, b={:.4}",
        model.params.r, model.params.alpha, model.params.a, model.params.b
    );
    if args.verbose {
        println!("  Log-likelihood: {:.2}", model.log_likelihood);
        println!("  Fitting time: {:.2}s", fit_start.elapsed().as_secs_f64());
    }

    // Step 4: Predict over the configured horizon
    let predictions = model.predict(&summaries, config.horizon)?;
    println!(
        "\n✓ Predictions computed for the next {} {:?}",
        config.horizon, config.unit
    );
    print_prediction_preview(&predictions);

    // Step 5: Charts
    let heatmap = viz::heatmap_matrix(&model, &summaries, 30.0)?;
    viz::render_heatmap(&heatmap, &args.heatmap)?;

    if let Some(cutoff) = config.split_date {
        render_validation(args, config, &records, cutoff)?;
    } else if args.verbose {
        println!("No split date given; skipping the validation chart");
    }

    // Step 6: Results bundle
    let bundle = ResultBundle {
        predictions,
        parameters: model.params,
        export_timestamp: chrono::Local::now().naive_local(),
    };
    repeatcast::write_archive(&bundle, &args.bundle)?;
    println!("Results bundle saved to: {}", args.bundle);

    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

fn load_or_generate(args: &Args) -> Result<Vec<TransactionRecord>> {
    if let Some(path) = &args.input {
        if args.verbose {
            println!("Step 1: Loading transactions from: {path}");
        }
        return Ok(repeatcast::load_transactions(path)?);
    }

    if args.verbose {
        println!(
            "Step 1: Generating {} sample customers (seed {})",
            args.sample_customers, args.seed
        );
    }
    let end = chrono::Local::now().date_naive();
    let start = end - chrono::Duration::days(365);
    Ok(repeatcast::generate_transactions(args.sample_customers, start, end, args.seed)?)
}

/// Fit on the calibration window only and compare against the held-out
/// transactions after the cutoff.
fn render_validation(
    args: &Args,
    config: PipelineConfig,
    records: &[TransactionRecord],
    cutoff: NaiveDate,
) -> Result<()> {
    if args.verbose {
        println!("\nValidation: calibration/holdout split at {cutoff}");
    }

    let (calibration, holdout) = repeatcast::split_transactions(records, cutoff)?;
    let calibration_summaries =
        repeatcast::summarize(&calibration, Some(cutoff), config.unit)?;
    let calibration_model = BgNbdModel::fit(&calibration_summaries, config.penalizer)?;

    let holdout_end = holdout.iter().map(|r| r.date).max().expect("holdout is non-empty");
    let holdout_duration = config.unit.delta(cutoff, holdout_end);
    let comparison = viz::calibration_comparison(
        &calibration_model,
        &calibration_summaries,
        &purchase_counts(&holdout),
        holdout_duration,
    )?;
    viz::render_comparison(&comparison, &args.validation)?;
    Ok(())
}

fn print_summary_preview(summaries: &[repeatcast::CustomerSummary]) {
    println!("\n  customer_id | frequency | recency |       T");
    println!("  ------------|-----------|---------|--------");
    for s in summaries.iter().take(5) {
        println!(
            "  {:11} | {:9} | {:7.1} | {:7.1}",
            s.customer_id, s.frequency, s.recency, s.t
        );
    }
}

fn print_prediction_preview(predictions: &[repeatcast::PredictionRow]) {
    println!("\n  customer_id | predicted_purchases | probability_alive");
    println!("  ------------|---------------------|------------------");
    for p in predictions.iter().take(5) {
        println!(
            "  {:11} | {:19.4} | {:17.4}",
            p.customer_id, p.predicted_purchases, p.probability_alive
        );
    }
}
