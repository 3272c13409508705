use crate::error::{PipelineError, Result};
use crate::types::NormalizedRecord;
use chrono::Datelike;
use serde::{Serialize, Serializer};
use tracing::info;

/// Sale price above which a transaction counts as a premium product.
pub const PREMIUM_PRICE_THRESHOLD: f64 = 100.0;

/// The full derived-table column set, in persistence order. Shared by the
/// flat-file exporter and the relational mapping audit so the two sinks can
/// never drift apart.
pub const DERIVED_COLUMNS: [&str; 25] = [
    "segment",
    "country",
    "product",
    "discount_band",
    "units_sold",
    "manufacturing_price",
    "sale_price",
    "gross_sales",
    "discounts",
    "net_sales",
    "cogs",
    "profit",
    "transaction_date",
    "month_number",
    "month_name",
    "year",
    "quarter",
    "day_of_week",
    "profit_margin",
    "discount_rate",
    "revenue_per_unit",
    "sales_category",
    "units_category",
    "high_performer",
    "premium_product",
];

/// Result of a ratio whose denominator may be zero. A zero denominator
/// yields `NotComputable`, a defined sentinel distinct from an ordinary
/// missing value; it is never silently coerced to a number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    Value(f64),
    NotComputable,
}

impl Metric {
    pub fn ratio(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 {
            Metric::NotComputable
        } else {
            Metric::Value(numerator / denominator)
        }
    }

    /// Ratio expressed as a percentage.
    pub fn percent(numerator: f64, denominator: f64) -> Self {
        match Self::ratio(numerator, denominator) {
            Metric::Value(v) => Metric::Value(v * 100.0),
            Metric::NotComputable => Metric::NotComputable,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Metric::Value(v) => Some(*v),
            Metric::NotComputable => None,
        }
    }

    pub fn is_computable(&self) -> bool {
        matches!(self, Metric::Value(_))
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.value().serialize(serializer)
    }
}

/// Net-sales bucket. Bins are right-inclusive `(lo, hi]`: a value exactly on
/// an edge belongs to the lower bucket. Values at or below zero clamp into
/// `Low` so every record lands in exactly one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SalesCategory {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl SalesCategory {
    pub const EDGES: [f64; 3] = [50_000.0, 100_000.0, 200_000.0];

    pub fn from_net_sales(net_sales: f64) -> Self {
        if net_sales <= Self::EDGES[0] {
            SalesCategory::Low
        } else if net_sales <= Self::EDGES[1] {
            SalesCategory::Medium
        } else if net_sales <= Self::EDGES[2] {
            SalesCategory::High
        } else {
            SalesCategory::VeryHigh
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SalesCategory::Low => "Low",
            SalesCategory::Medium => "Medium",
            SalesCategory::High => "High",
            SalesCategory::VeryHigh => "Very High",
        }
    }
}

/// Units-sold bucket, same `(lo, hi]` convention as [`SalesCategory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitsCategory {
    LowVolume,
    MediumVolume,
    HighVolume,
    VeryHighVolume,
}

impl UnitsCategory {
    pub const EDGES: [f64; 3] = [1_000.0, 2_000.0, 3_000.0];

    pub fn from_units_sold(units_sold: f64) -> Self {
        if units_sold <= Self::EDGES[0] {
            UnitsCategory::LowVolume
        } else if units_sold <= Self::EDGES[1] {
            UnitsCategory::MediumVolume
        } else if units_sold <= Self::EDGES[2] {
            UnitsCategory::HighVolume
        } else {
            UnitsCategory::VeryHighVolume
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UnitsCategory::LowVolume => "Low Volume",
            UnitsCategory::MediumVolume => "Medium Volume",
            UnitsCategory::HighVolume => "High Volume",
            UnitsCategory::VeryHighVolume => "Very High Volume",
        }
    }
}

/// Computed analytical fields for one transaction.
#[derive(Debug, Clone, Serialize)]
pub struct DerivedFeatures {
    pub profit_margin: Metric,
    pub discount_rate: Metric,
    /// Calendar quarter, 1 through 4.
    pub quarter: u8,
    /// Day of week, 0 through 6 with 0 = Monday.
    pub day_of_week: u8,
    pub revenue_per_unit: Metric,
    pub sales_category: SalesCategory,
    pub units_category: UnitsCategory,
    pub high_performer: bool,
    pub premium_product: bool,
}

/// A normalized record together with its derived features.
#[derive(Debug, Clone, Serialize)]
pub struct DerivedRecord {
    pub record: NormalizedRecord,
    pub features: DerivedFeatures,
}

/// Derives analytical features for the whole dataset.
///
/// Two-phase by design: phase one computes the row-local fields, then the
/// dataset-wide median of computable profit margins is taken as an immutable
/// barrier value, and phase two assigns `high_performer` against it. Rows
/// whose margin is not computable are never high performers.
pub fn derive(records: &[NormalizedRecord]) -> Result<Vec<DerivedRecord>> {
    let mut derived: Vec<DerivedRecord> = records
        .iter()
        .enumerate()
        .map(|(row, record)| row_features(row, record))
        .collect::<Result<_>>()?;

    let median = median_profit_margin(&derived);

    if let Some(median) = median {
        for item in &mut derived {
            if let Metric::Value(margin) = item.features.profit_margin {
                item.features.high_performer = margin > median;
            }
        }
    }

    info!(
        "Derived features for {} records (median profit margin: {})",
        derived.len(),
        median.map(|m| format!("{m:.2}%")).unwrap_or_else(|| "n/a".to_string())
    );

    Ok(derived)
}

/// Phase one: everything except `high_performer`, which needs the full
/// dataset and is left at its default here.
fn row_features(row: usize, record: &NormalizedRecord) -> Result<DerivedRecord> {
    require_finite(row, "units_sold", record.units_sold)?;
    require_finite(row, "sale_price", record.sale_price)?;
    require_finite(row, "gross_sales", record.gross_sales)?;
    require_finite(row, "discounts", record.discounts)?;
    require_finite(row, "net_sales", record.net_sales)?;
    require_finite(row, "profit", record.profit)?;

    let features = DerivedFeatures {
        profit_margin: Metric::percent(record.profit, record.gross_sales),
        discount_rate: Metric::percent(record.discounts, record.gross_sales),
        quarter: (record.transaction_date.month0() / 3 + 1) as u8,
        day_of_week: record.transaction_date.weekday().num_days_from_monday() as u8,
        revenue_per_unit: Metric::ratio(record.net_sales, record.units_sold),
        sales_category: SalesCategory::from_net_sales(record.net_sales),
        units_category: UnitsCategory::from_units_sold(record.units_sold),
        high_performer: false,
        premium_product: record.sale_price > PREMIUM_PRICE_THRESHOLD,
    };

    Ok(DerivedRecord {
        record: record.clone(),
        features,
    })
}

fn require_finite(row: usize, field: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PipelineError::Derivation {
            field: field.to_string(),
            row,
        })
    }
}

/// Median over the computable profit margins; `None` when no row has one.
fn median_profit_margin(derived: &[DerivedRecord]) -> Option<f64> {
    let margins: Vec<f64> = derived
        .iter()
        .filter_map(|d| d.features.profit_margin.value())
        .collect();
    median_of(margins)
}

pub(crate) fn median_of(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}
