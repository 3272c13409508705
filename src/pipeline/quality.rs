use crate::pipeline::derive::{DerivedRecord, DERIVED_COLUMNS};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::info;

/// Aggregate validation metrics over the derived dataset. Produced once per
/// run, never persisted back into records. Carries no wall-clock timestamp so
/// two runs over identical input produce identical reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub record_count: usize,
    pub column_count: usize,
    pub date_range: Option<DateRange>,
    /// Count of non-computable metric values across the dataset. These are
    /// excluded from the mean/sum aggregates below.
    pub invalid_value_count: usize,
    /// Exact-duplicate rows removed during normalization.
    pub duplicate_count: usize,
    /// Exact duplicates still present in the derived dataset; expected 0.
    pub residual_duplicate_count: usize,
    pub total_gross_sales: f64,
    pub total_net_sales: f64,
    pub total_profit: f64,
    pub mean_profit_margin: Option<f64>,
    pub mean_discount_rate: Option<f64>,
    pub high_performer_count: usize,
    pub high_performer_pct: f64,
    pub premium_product_count: usize,
    pub premium_product_pct: f64,
    pub segments: Vec<String>,
    pub countries: Vec<String>,
    pub products: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
}

/// Pure aggregation over the derived dataset. Tolerates an empty dataset;
/// non-computable metrics are excluded from means and counted as invalid.
pub fn assess(records: &[DerivedRecord], duplicates_removed: usize) -> QualityReport {
    let record_count = records.len();

    let mut invalid_value_count = 0;
    let mut total_gross_sales = 0.0;
    let mut total_net_sales = 0.0;
    let mut total_profit = 0.0;
    let mut margin_sum = 0.0;
    let mut margin_count = 0usize;
    let mut discount_sum = 0.0;
    let mut discount_count = 0usize;
    let mut high_performer_count = 0;
    let mut premium_product_count = 0;
    let mut earliest: Option<NaiveDate> = None;
    let mut latest: Option<NaiveDate> = None;
    let mut segments = BTreeSet::new();
    let mut countries = BTreeSet::new();
    let mut products = BTreeSet::new();
    let mut fingerprints = HashSet::with_capacity(record_count);
    let mut residual_duplicate_count = 0;

    for derived in records {
        let record = &derived.record;
        let features = &derived.features;

        total_gross_sales += record.gross_sales;
        total_net_sales += record.net_sales;
        total_profit += record.profit;

        match features.profit_margin.value() {
            Some(margin) => {
                margin_sum += margin;
                margin_count += 1;
            }
            None => invalid_value_count += 1,
        }
        match features.discount_rate.value() {
            Some(rate) => {
                discount_sum += rate;
                discount_count += 1;
            }
            None => invalid_value_count += 1,
        }
        if !features.revenue_per_unit.is_computable() {
            invalid_value_count += 1;
        }

        if features.high_performer {
            high_performer_count += 1;
        }
        if features.premium_product {
            premium_product_count += 1;
        }

        let date = record.transaction_date;
        earliest = Some(earliest.map_or(date, |d| d.min(date)));
        latest = Some(latest.map_or(date, |d| d.max(date)));

        segments.insert(record.segment.clone());
        countries.insert(record.country.clone());
        products.insert(record.product.clone());

        if !fingerprints.insert(record.fingerprint()) {
            residual_duplicate_count += 1;
        }
    }

    let pct = |count: usize| {
        if record_count == 0 {
            0.0
        } else {
            count as f64 / record_count as f64 * 100.0
        }
    };

    let report = QualityReport {
        record_count,
        column_count: DERIVED_COLUMNS.len(),
        date_range: earliest.zip(latest).map(|(earliest, latest)| DateRange {
            earliest,
            latest,
        }),
        invalid_value_count,
        duplicate_count: duplicates_removed,
        residual_duplicate_count,
        total_gross_sales,
        total_net_sales,
        total_profit,
        mean_profit_margin: (margin_count > 0).then(|| margin_sum / margin_count as f64),
        mean_discount_rate: (discount_count > 0).then(|| discount_sum / discount_count as f64),
        high_performer_count,
        high_performer_pct: pct(high_performer_count),
        premium_product_count,
        premium_product_pct: pct(premium_product_count),
        segments: segments.into_iter().collect(),
        countries: countries.into_iter().collect(),
        products: products.into_iter().collect(),
    };

    info!(
        "Quality assessment: {} records, {} invalid values, mean margin {}",
        report.record_count,
        report.invalid_value_count,
        report
            .mean_profit_margin
            .map(|m| format!("{m:.2}%"))
            .unwrap_or_else(|| "n/a".to_string())
    );

    report
}
