use crate::error::{PipelineError, Result};
use crate::types::{NormalizedRecord, RawRecord};
use std::collections::HashSet;
use tracing::info;

/// Sentinel stored in `discount_band` when the source value is absent. This
/// is a definite string value, not a null; downstream stages never re-treat
/// it as missing.
pub const NO_DISCOUNT_BAND: &str = "None";

/// Result of a normalization pass.
#[derive(Debug)]
pub struct NormalizeOutcome {
    pub records: Vec<NormalizedRecord>,
    pub duplicates_removed: usize,
}

/// Repairs the raw schema: removes exact-duplicate rows (stable on
/// first-seen order), fills the missing discount band with the `"None"`
/// sentinel, and resolves the defectively-named sales column into
/// `net_sales`. A row with no sales amount under any accepted header is a
/// schema error.
pub fn normalize(raw_records: &[RawRecord]) -> Result<NormalizeOutcome> {
    let mut seen = HashSet::with_capacity(raw_records.len());
    let mut records = Vec::with_capacity(raw_records.len());
    let mut duplicates_removed = 0;

    for (row, raw) in raw_records.iter().enumerate() {
        if !seen.insert(raw.fingerprint()) {
            duplicates_removed += 1;
            continue;
        }

        let net_sales = raw.sales.ok_or_else(|| PipelineError::Schema {
            column: "net_sales".to_string(),
            row,
        })?;

        let discount_band = match &raw.discount_band {
            Some(band) if !band.is_empty() => band.clone(),
            _ => NO_DISCOUNT_BAND.to_string(),
        };

        records.push(NormalizedRecord {
            segment: raw.segment.clone(),
            country: raw.country.clone(),
            product: raw.product.clone(),
            discount_band,
            units_sold: raw.units_sold,
            manufacturing_price: raw.manufacturing_price,
            sale_price: raw.sale_price,
            gross_sales: raw.gross_sales,
            discounts: raw.discounts,
            net_sales,
            cogs: raw.cogs,
            profit: raw.profit,
            transaction_date: raw.transaction_date,
            month_number: raw.month_number,
            month_name: raw.month_name.clone(),
            year: raw.year,
        });
    }

    info!(
        "Normalized {} records ({} duplicates removed)",
        records.len(),
        duplicates_removed
    );

    Ok(NormalizeOutcome {
        records,
        duplicates_removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::sample_raw;

    #[test]
    fn fills_missing_discount_band_with_sentinel() {
        let mut raw = sample_raw();
        raw.discount_band = None;

        let outcome = normalize(&[raw]).unwrap();
        assert_eq!(outcome.records[0].discount_band, NO_DISCOUNT_BAND);
    }

    #[test]
    fn keeps_present_discount_band() {
        let mut raw = sample_raw();
        raw.discount_band = Some("High".to_string());

        let outcome = normalize(&[raw]).unwrap();
        assert_eq!(outcome.records[0].discount_band, "High");
    }

    #[test]
    fn collapses_exact_duplicates_and_reports_count() {
        let raw = sample_raw();
        let input = vec![raw.clone(), raw.clone(), raw];

        let outcome = normalize(&input).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.duplicates_removed, 2);
    }

    #[test]
    fn duplicate_removal_is_stable_on_first_seen_order() {
        let first = sample_raw();
        let mut second = sample_raw();
        second.country = "Germany".to_string();

        let input = vec![first.clone(), second, first];
        let outcome = normalize(&input).unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].country, "Canada");
        assert_eq!(outcome.records[1].country, "Germany");
        assert_eq!(outcome.duplicates_removed, 1);
    }

    #[test]
    fn missing_sales_column_is_a_schema_error() {
        let mut raw = sample_raw();
        raw.sales = None;

        let err = normalize(&[raw]).unwrap_err();
        match err {
            PipelineError::Schema { column, row } => {
                assert_eq!(column, "net_sales");
                assert_eq!(row, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
