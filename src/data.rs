//! Transaction ingestion: CSV loading, schema validation, and the seeded
//! sample-data generator.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::Error;

/// One raw sales transaction.
///
/// Multiple records may share a `customer_id`, and repeat purchases on the
/// same calendar day are valid input.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub customer_id: String,
    pub date: NaiveDate,
    pub monetary_value: Option<f64>,
}

/// Date formats accepted for the `date` column, tried in order.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Load and validate transactions from a CSV file on disk.
///
/// Required columns: `customer_id`, `date`. Optional: `monetary_value`.
pub fn load_transactions(path: impl AsRef<Path>) -> crate::Result<Vec<TransactionRecord>> {
    let file = File::open(path.as_ref())?;
    read_transactions(file)
}

/// Read and validate transactions from any CSV source.
///
/// Fails with [`Error::Schema`] when a required column is missing and with
/// [`Error::Parse`] on the first malformed cell (fail-fast: a single bad
/// date or negative monetary value rejects the upload). Returns
/// [`Error::EmptyInput`] when the file has a header but no data rows.
pub fn read_transactions(reader: impl Read) -> crate::Result<Vec<TransactionRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let id_col = column_index(&headers, "customer_id")?;
    let date_col = column_index(&headers, "date")?;
    let monetary_col = headers.iter().position(|h| h == "monetary_value");

    let mut records = Vec::new();
    for (i, row) in csv_reader.records().enumerate() {
        // Header is line 1; first data row is line 2.
        let line = i + 2;
        let row = row?;

        let customer_id = row
            .get(id_col)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::parse(line, "empty customer_id"))?
            .to_string();

        let raw_date = row
            .get(date_col)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::parse(line, "empty date"))?;
        let date = parse_date(raw_date)
            .ok_or_else(|| Error::parse(line, format!("unparseable date `{raw_date}`")))?;

        let monetary_value = match monetary_col.and_then(|c| row.get(c)).filter(|s| !s.is_empty()) {
            Some(raw) => {
                let value: f64 = raw.parse().map_err(|_| {
                    Error::parse(line, format!("unparseable monetary_value `{raw}`"))
                })?;
                if value < 0.0 {
                    return Err(Error::parse(line, format!("negative monetary_value `{raw}`")));
                }
                Some(value)
            }
            None => None,
        };

        records.push(TransactionRecord { customer_id, date, monetary_value });
    }

    if records.is_empty() {
        return Err(Error::EmptyInput);
    }

    debug!(rows = records.len(), "transactions ingested");
    Ok(records)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> crate::Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| Error::Schema(name.to_string()))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
        if let Ok(datetime) = chrono::NaiveDateTime::parse_from_str(raw, format) {
            return Some(datetime.date());
        }
    }
    None
}

/// Generate a reproducible synthetic transaction history.
///
/// Each customer makes an initial purchase early in the window followed by
/// up to eight repeats at random gaps; everything is driven by `seed`, so
/// identical arguments yield identical records.
pub fn generate_transactions(
    customers: usize,
    start: NaiveDate,
    end: NaiveDate,
    seed: u64,
) -> crate::Result<Vec<TransactionRecord>> {
    if customers == 0 {
        return Err(Error::EmptyInput);
    }
    let window_days = (end - start).num_days();
    if window_days <= 0 {
        return Err(Error::InvalidArgument(format!(
            "sample date range must be non-empty (got {start}..{end})"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::new();

    for customer in 0..customers {
        let customer_id = format!("C{customer:05}");

        // First purchase lands in the opening fifth of the window so most
        // customers have room for an observable repeat history.
        let first_offset = rng.gen_range(0..=(window_days / 5).max(1));
        let mut date = start + Duration::days(first_offset);
        records.push(sample_record(&customer_id, date, &mut rng));

        let repeats = rng.gen_range(0..=8);
        for _ in 0..repeats {
            date += Duration::days(rng.gen_range(1..=30));
            if date > end {
                break;
            }
            records.push(sample_record(&customer_id, date, &mut rng));
        }
    }

    debug!(rows = records.len(), customers, seed, "sample transactions generated");
    Ok(records)
}

fn sample_record(customer_id: &str, date: NaiveDate, rng: &mut StdRng) -> TransactionRecord {
    let value = (rng.gen_range(5.0f64..200.0) * 100.0).round() / 100.0;
    TransactionRecord {
        customer_id: customer_id.to_string(),
        date,
        monetary_value: Some(value),
    }
}
