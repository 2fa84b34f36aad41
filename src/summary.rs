//! Per-customer summary aggregation: frequency, recency, and observation age
//! in the chosen time unit, plus the calibration/holdout split.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use clap::ValueEnum;
use tracing::debug;

use crate::data::TransactionRecord;
use crate::error::Error;

/// Time unit used for recency, T, and prediction horizons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TimeUnit {
    #[default]
    Days,
    Weeks,
}

impl TimeUnit {
    /// Elapsed time from `from` to `to` in this unit. Week deltas are exact
    /// day-deltas divided by 7, never rounded.
    pub fn delta(self, from: NaiveDate, to: NaiveDate) -> f64 {
        let days = (to - from).num_days() as f64;
        match self {
            TimeUnit::Days => days,
            TimeUnit::Weeks => days / 7.0,
        }
    }
}

/// Sufficient statistics for one customer.
///
/// `frequency` counts repeat transactions (distinct purchase dates minus
/// one); `recency` spans first to last purchase; `t` spans first purchase to
/// the end of the observation window. Invariants: `0 <= recency <= t` and
/// `frequency == 0` implies `recency == 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerSummary {
    pub customer_id: String,
    pub frequency: u32,
    pub recency: f64,
    pub t: f64,
    /// Mean monetary value over repeat purchase dates (the first purchase
    /// date is excluded). `None` when the customer has no valued repeats.
    pub monetary_value: Option<f64>,
}

/// Aggregate raw transactions into one [`CustomerSummary`] per customer.
///
/// `window_end` defaults to the latest date present in `records`. Output is
/// ordered lexicographically by `customer_id` (stable across runs).
///
/// Fails with [`Error::EmptyInput`] on an empty slice and with
/// [`Error::InvalidArgument`] when `window_end` predates the latest
/// transaction (which would break `recency <= t`).
pub fn summarize(
    records: &[TransactionRecord],
    window_end: Option<NaiveDate>,
    unit: TimeUnit,
) -> crate::Result<Vec<CustomerSummary>> {
    if records.is_empty() {
        return Err(Error::EmptyInput);
    }

    let max_date = records.iter().map(|r| r.date).max().expect("records is non-empty");
    let window_end = window_end.unwrap_or(max_date);
    if window_end < max_date {
        return Err(Error::InvalidArgument(format!(
            "observation window end {window_end} predates the latest transaction {max_date}"
        )));
    }

    let mut groups: BTreeMap<&str, Vec<&TransactionRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.customer_id.as_str()).or_default().push(record);
    }

    let mut summaries = Vec::with_capacity(groups.len());
    for (customer_id, rows) in groups {
        let dates: BTreeSet<NaiveDate> = rows.iter().map(|r| r.date).collect();
        let first = *dates.iter().next().expect("group is non-empty");
        let last = *dates.iter().next_back().expect("group is non-empty");

        summaries.push(CustomerSummary {
            customer_id: customer_id.to_string(),
            frequency: (dates.len() - 1) as u32,
            recency: unit.delta(first, last),
            t: unit.delta(first, window_end),
            monetary_value: repeat_monetary_mean(&rows, first),
        });
    }

    debug!(customers = summaries.len(), ?unit, %window_end, "summaries aggregated");
    Ok(summaries)
}

/// Mean of per-date monetary totals over repeat purchase dates. Same-day
/// purchases sum into one date before averaging.
fn repeat_monetary_mean(rows: &[&TransactionRecord], first: NaiveDate) -> Option<f64> {
    let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    let mut seen_value = false;
    for row in rows {
        if row.date == first {
            continue;
        }
        let total = by_date.entry(row.date).or_insert(0.0);
        if let Some(value) = row.monetary_value {
            *total += value;
            seen_value = true;
        }
    }
    if by_date.is_empty() || !seen_value {
        return None;
    }
    Some(by_date.values().sum::<f64>() / by_date.len() as f64)
}

/// Split transactions into a calibration window (`date <= cutoff`) and a
/// holdout window (`date > cutoff`).
///
/// Fails with [`Error::InvalidArgument`] when the cutoff predates the first
/// transaction and with [`Error::InsufficientData`] when no transaction
/// falls after the cutoff.
pub fn split_transactions(
    records: &[TransactionRecord],
    cutoff: NaiveDate,
) -> crate::Result<(Vec<TransactionRecord>, Vec<TransactionRecord>)> {
    if records.is_empty() {
        return Err(Error::EmptyInput);
    }
    let min_date = records.iter().map(|r| r.date).min().expect("records is non-empty");
    if cutoff < min_date {
        return Err(Error::InvalidArgument(format!(
            "split date {cutoff} predates the first transaction {min_date}"
        )));
    }

    let (calibration, holdout): (Vec<_>, Vec<_>) =
        records.iter().cloned().partition(|r| r.date <= cutoff);
    if holdout.is_empty() {
        return Err(Error::InsufficientData);
    }
    Ok((calibration, holdout))
}

/// Count holdout-window purchases per customer. Customers absent from the
/// holdout window are simply not present in the map.
pub fn purchase_counts(records: &[TransactionRecord]) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.customer_id.clone()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn record(id: &str, d: &str, value: Option<f64>) -> TransactionRecord {
        TransactionRecord { customer_id: id.to_string(), date: date(d), monetary_value: value }
    }

    #[test]
    fn test_worked_example() {
        let records = vec![
            record("A", "2024-01-01", None),
            record("A", "2024-01-10", None),
            record("B", "2024-01-05", None),
        ];
        let summaries =
            summarize(&records, Some(date("2024-01-15")), TimeUnit::Days).unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].customer_id, "A");
        assert_eq!(summaries[0].frequency, 1);
        assert_eq!(summaries[0].recency, 9.0);
        assert_eq!(summaries[0].t, 14.0);
        assert_eq!(summaries[1].customer_id, "B");
        assert_eq!(summaries[1].frequency, 0);
        assert_eq!(summaries[1].recency, 0.0);
        assert_eq!(summaries[1].t, 10.0);
    }

    #[test]
    fn test_weekly_unit_divides_exactly() {
        let records = vec![
            record("A", "2024-01-01", None),
            record("A", "2024-01-10", None),
        ];
        let summaries =
            summarize(&records, Some(date("2024-01-15")), TimeUnit::Weeks).unwrap();
        assert_eq!(summaries[0].recency, 9.0 / 7.0);
        assert_eq!(summaries[0].t, 2.0);
    }

    #[test]
    fn test_same_day_repeat_counts_once() {
        // Two purchases on one day are one distinct purchase date.
        let records = vec![
            record("A", "2024-01-01", None),
            record("A", "2024-01-01", None),
        ];
        let summaries = summarize(&records, None, TimeUnit::Days).unwrap();
        assert_eq!(summaries[0].frequency, 0);
        assert_eq!(summaries[0].recency, 0.0);
    }

    #[test]
    fn test_recency_bounded_by_t() {
        let records = vec![
            record("A", "2024-01-01", None),
            record("A", "2024-02-01", None),
            record("B", "2024-01-15", None),
            record("C", "2024-01-10", None),
            record("C", "2024-03-01", None),
        ];
        let summaries = summarize(&records, None, TimeUnit::Days).unwrap();
        for s in &summaries {
            assert!(s.recency >= 0.0 && s.recency <= s.t, "{s:?}");
            if s.frequency == 0 {
                assert_eq!(s.recency, 0.0);
            }
        }
    }

    #[test]
    fn test_frequency_sum_property() {
        let records = crate::data::generate_transactions(
            40,
            date("2023-01-01"),
            date("2023-12-31"),
            11,
        )
        .unwrap();
        let summaries = summarize(&records, None, TimeUnit::Days).unwrap();

        let distinct_pairs: BTreeSet<(&str, NaiveDate)> =
            records.iter().map(|r| (r.customer_id.as_str(), r.date)).collect();
        let total: u32 = summaries.iter().map(|s| s.frequency).sum();
        assert_eq!(total as usize, distinct_pairs.len() - summaries.len());
    }

    #[test]
    fn test_monetary_mean_excludes_first_date() {
        let records = vec![
            record("A", "2024-01-01", Some(100.0)),
            record("A", "2024-01-10", Some(10.0)),
            record("A", "2024-01-20", Some(30.0)),
        ];
        let summaries = summarize(&records, None, TimeUnit::Days).unwrap();
        assert_eq!(summaries[0].monetary_value, Some(20.0));

        let single = vec![record("B", "2024-01-01", Some(100.0))];
        let summaries = summarize(&single, None, TimeUnit::Days).unwrap();
        assert_eq!(summaries[0].monetary_value, None);
    }

    #[test]
    fn test_empty_input() {
        let err = summarize(&[], None, TimeUnit::Days).unwrap_err();
        assert!(matches!(err, Error::EmptyInput));
    }

    #[test]
    fn test_window_end_before_latest_transaction() {
        let records = vec![record("A", "2024-01-10", None)];
        let err =
            summarize(&records, Some(date("2024-01-05")), TimeUnit::Days).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_split_produces_both_windows() {
        let records = vec![
            record("A", "2024-01-01", None),
            record("A", "2024-02-01", None),
            record("B", "2024-03-01", None),
        ];
        let (calibration, holdout) =
            split_transactions(&records, date("2024-02-15")).unwrap();
        assert_eq!(calibration.len(), 2);
        assert_eq!(holdout.len(), 1);
    }

    #[test]
    fn test_split_after_last_transaction_fails() {
        let records = vec![
            record("A", "2024-01-01", None),
            record("B", "2024-02-01", None),
        ];
        let err = split_transactions(&records, date("2024-06-01")).unwrap_err();
        assert!(matches!(err, Error::InsufficientData));
    }

    #[test]
    fn test_split_before_first_transaction_fails() {
        let records = vec![record("A", "2024-01-10", None)];
        let err = split_transactions(&records, date("2023-12-31")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
