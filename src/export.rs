//! Result bundle export: predictions CSV, model parameter JSON, and the
//! downloadable ZIP archive.
//!
//! The archive is byte-deterministic for identical inputs: numeric fields
//! are formatted at fixed precision and the timestamp is injected by the
//! caller rather than read from the wall clock here.

use std::io::{Cursor, Write};
use std::path::Path;

use chrono::{Datelike, NaiveDateTime, Timelike};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Error;
use crate::model::{ModelParameters, PredictionRow};

/// Everything one pipeline run exports. Transient; lives only as long as
/// the produced archive.
#[derive(Debug, Clone)]
pub struct ResultBundle {
    pub predictions: Vec<PredictionRow>,
    pub parameters: ModelParameters,
    pub export_timestamp: NaiveDateTime,
}

/// Serialize prediction rows as CSV with four-decimal numeric fields.
pub fn predictions_csv(rows: &[PredictionRow]) -> crate::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["customer_id", "predicted_purchases", "probability_alive"])?;
    for row in rows {
        let predicted = format!("{:.4}", row.predicted_purchases);
        let alive = format!("{:.4}", row.probability_alive);
        writer.write_record([row.customer_id.as_str(), predicted.as_str(), alive.as_str()])?;
    }
    let bytes = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    // The writer only ever received UTF-8 input.
    Ok(String::from_utf8(bytes).expect("csv output is valid UTF-8"))
}

/// Serialize model parameters as a flat JSON object
/// `{r, alpha, a, b, penalizer_coef}`.
pub fn params_json(parameters: &ModelParameters) -> crate::Result<String> {
    Ok(serde_json::to_string_pretty(parameters)?)
}

/// Build the in-memory ZIP archive containing exactly `predictions.csv`
/// and `model_params.json`.
pub fn build_archive(bundle: &ResultBundle) -> crate::Result<Vec<u8>> {
    let timestamp = zip_timestamp(bundle.export_timestamp)?;
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(timestamp);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file("predictions.csv", options)?;
    writer.write_all(predictions_csv(&bundle.predictions)?.as_bytes())?;
    writer.start_file("model_params.json", options)?;
    writer.write_all(params_json(&bundle.parameters)?.as_bytes())?;

    let cursor = writer.finish()?;
    let bytes = cursor.into_inner();
    debug!(size = bytes.len(), rows = bundle.predictions.len(), "archive built");
    Ok(bytes)
}

/// Build the archive and write it to disk.
pub fn write_archive(bundle: &ResultBundle, path: impl AsRef<Path>) -> crate::Result<()> {
    let bytes = build_archive(bundle)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn zip_timestamp(timestamp: NaiveDateTime) -> crate::Result<zip::DateTime> {
    let out_of_range = || {
        Error::InvalidArgument(format!(
            "export timestamp {timestamp} is outside the zip datetime range"
        ))
    };
    let year = u16::try_from(timestamp.year()).map_err(|_| out_of_range())?;
    zip::DateTime::from_date_and_time(
        year,
        timestamp.month() as u8,
        timestamp.day() as u8,
        timestamp.hour() as u8,
        timestamp.minute() as u8,
        timestamp.second() as u8,
    )
    .map_err(|_| out_of_range())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Read;

    fn sample_bundle() -> ResultBundle {
        ResultBundle {
            predictions: vec![
                PredictionRow {
                    customer_id: "A".to_string(),
                    predicted_purchases: 1.23456,
                    probability_alive: 0.9,
                },
                PredictionRow {
                    customer_id: "B".to_string(),
                    predicted_purchases: 0.0,
                    probability_alive: 1.0,
                },
            ],
            parameters: ModelParameters {
                r: 0.2426,
                alpha: 4.4135,
                a: 0.7929,
                b: 2.4259,
                penalizer_coef: 0.01,
            },
            export_timestamp: NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(12, 30, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_predictions_csv_fixed_precision() {
        let bundle = sample_bundle();
        let csv = predictions_csv(&bundle.predictions).unwrap();
        assert_eq!(
            csv,
            "customer_id,predicted_purchases,probability_alive\n\
             A,1.2346,0.9000\n\
             B,0.0000,1.0000\n"
        );
    }

    #[test]
    fn test_params_json_is_flat() {
        let bundle = sample_bundle();
        let json = params_json(&bundle.parameters).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 5);
        for key in ["r", "alpha", "a", "b", "penalizer_coef"] {
            assert!(object[key].is_f64(), "missing or non-numeric key {key}");
        }
        assert_eq!(object["penalizer_coef"].as_f64(), Some(0.01));
    }

    #[test]
    fn test_archive_members_and_contents() {
        let bundle = sample_bundle();
        let bytes = build_archive(&bundle).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut csv = String::new();
        archive.by_name("predictions.csv").unwrap().read_to_string(&mut csv).unwrap();
        assert_eq!(csv, predictions_csv(&bundle.predictions).unwrap());

        let mut json = String::new();
        archive.by_name("model_params.json").unwrap().read_to_string(&mut json).unwrap();
        assert_eq!(json, params_json(&bundle.parameters).unwrap());
    }

    #[test]
    fn test_archive_is_byte_deterministic() {
        let bundle = sample_bundle();
        assert_eq!(build_archive(&bundle).unwrap(), build_archive(&bundle).unwrap());
    }

    #[test]
    fn test_prehistoric_timestamp_rejected() {
        let mut bundle = sample_bundle();
        bundle.export_timestamp = NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let err = build_archive(&bundle).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
