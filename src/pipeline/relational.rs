use crate::error::{PipelineError, Result};
use crate::pipeline::derive::{DerivedRecord, DERIVED_COLUMNS};
use crate::sink::RelationalSink;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

/// Fixed source-column → stored-column mapping for `sales_transactions`.
/// The store additionally generates `transaction_id` and
/// `created_timestamp`; those never appear on the source side.
pub const COLUMN_MAPPING: [(&str, &str); 25] = [
    ("segment", "segment"),
    ("country", "country"),
    ("product", "product"),
    ("discount_band", "discount_band"),
    ("units_sold", "units_sold"),
    ("manufacturing_price", "manufacturing_price"),
    ("sale_price", "sale_price"),
    ("gross_sales", "gross_sales"),
    ("discounts", "discounts"),
    ("net_sales", "net_sales"),
    ("cogs", "cogs"),
    ("profit", "profit"),
    ("transaction_date", "transaction_date"),
    ("month_number", "month_number"),
    ("month_name", "month_name"),
    ("year", "year"),
    ("quarter", "quarter"),
    ("day_of_week", "day_of_week"),
    ("profit_margin", "profit_margin"),
    ("discount_rate", "discount_rate"),
    ("revenue_per_unit", "revenue_per_unit"),
    ("sales_category", "sales_category"),
    ("units_category", "units_category"),
    ("high_performer", "high_performer"),
    ("premium_product", "premium_product"),
];

/// Derived columns with no mapping entry. They are dropped from the
/// relational load, which is allowed, but each run logs them for audit.
static UNMAPPED_COLUMNS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    DERIVED_COLUMNS
        .iter()
        .filter(|column| !COLUMN_MAPPING.iter().any(|(source, _)| source == *column))
        .copied()
        .collect()
});

/// One row of the `sales_transactions` table, keyed under the stored column
/// names. Created at load time and never mutated; each run replaces the
/// entire prior table contents.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationalRow {
    pub segment: String,
    pub country: String,
    pub product: String,
    pub discount_band: String,
    pub units_sold: f64,
    pub manufacturing_price: f64,
    pub sale_price: f64,
    pub gross_sales: f64,
    pub discounts: f64,
    pub net_sales: f64,
    pub cogs: f64,
    pub profit: f64,
    pub transaction_date: NaiveDate,
    pub month_number: u32,
    pub month_name: String,
    pub year: i32,
    pub quarter: u8,
    pub day_of_week: u8,
    pub profit_margin: Option<f64>,
    pub discount_rate: Option<f64>,
    pub revenue_per_unit: Option<f64>,
    pub sales_category: String,
    pub units_category: String,
    pub high_performer: i64,
    pub premium_product: i64,
}

/// Re-keys derived records under the fixed mapping. Logs the unmapped-column
/// omission list once per call.
pub fn to_relational_rows(records: &[DerivedRecord]) -> Vec<RelationalRow> {
    if UNMAPPED_COLUMNS.is_empty() {
        debug!("All derived columns are mapped to the relational schema");
    } else {
        warn!(
            "Derived columns dropped from the relational load: {}",
            UNMAPPED_COLUMNS.join(", ")
        );
    }

    records
        .iter()
        .map(|derived| {
            let record = &derived.record;
            let features = &derived.features;
            RelationalRow {
                segment: record.segment.clone(),
                country: record.country.clone(),
                product: record.product.clone(),
                discount_band: record.discount_band.clone(),
                units_sold: record.units_sold,
                manufacturing_price: record.manufacturing_price,
                sale_price: record.sale_price,
                gross_sales: record.gross_sales,
                discounts: record.discounts,
                net_sales: record.net_sales,
                cogs: record.cogs,
                profit: record.profit,
                transaction_date: record.transaction_date,
                month_number: record.month_number,
                month_name: record.month_name.clone(),
                year: record.year,
                quarter: features.quarter,
                day_of_week: features.day_of_week,
                profit_margin: features.profit_margin.value(),
                discount_rate: features.discount_rate.value(),
                revenue_per_unit: features.revenue_per_unit.value(),
                sales_category: features.sales_category.label().to_string(),
                units_category: features.units_category.label().to_string(),
                high_performer: features.high_performer as i64,
                premium_product: features.premium_product as i64,
            }
        })
        .collect()
}

/// Idempotent schema creation followed by a full-table replace.
///
/// Not atomic: the prior contents are discarded before the batch insert, so
/// a failure mid-batch can leave the table empty or partially populated.
/// Re-running the pipeline is the recovery path.
pub fn persist(rows: &[RelationalRow], sink: &mut dyn RelationalSink) -> Result<usize> {
    for (row_index, row) in rows.iter().enumerate() {
        validate_not_null(row_index, row)?;
    }

    sink.create_schema()?;
    let inserted = sink.bulk_insert(rows)?;

    info!("Persisted {inserted} rows (full replace)");
    Ok(inserted)
}

/// Enforces the table's NOT-NULL constraints before touching the sink, so a
/// bad row is reported with its index instead of surfacing as a mid-batch
/// database failure.
fn validate_not_null(row_index: usize, row: &RelationalRow) -> Result<()> {
    let mut missing: Option<&str> = None;

    if row.segment.is_empty() {
        missing = Some("segment");
    } else if row.country.is_empty() {
        missing = Some("country");
    } else if row.product.is_empty() {
        missing = Some("product");
    } else if !row.units_sold.is_finite() {
        missing = Some("units_sold");
    } else if !row.manufacturing_price.is_finite() {
        missing = Some("manufacturing_price");
    } else if !row.sale_price.is_finite() {
        missing = Some("sale_price");
    } else if !row.gross_sales.is_finite() {
        missing = Some("gross_sales");
    } else if !row.net_sales.is_finite() {
        missing = Some("net_sales");
    } else if !row.cogs.is_finite() {
        missing = Some("cogs");
    } else if !row.profit.is_finite() {
        missing = Some("profit");
    }

    match missing {
        Some(column) => Err(PipelineError::Persistence {
            message: format!("row {row_index} violates NOT NULL on '{column}'"),
        }),
        None => Ok(()),
    }
}
