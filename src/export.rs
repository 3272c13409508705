use crate::error::Result;
use crate::pipeline::derive::{DerivedRecord, DERIVED_COLUMNS};
use crate::pipeline::quality::QualityReport;
use chrono::Utc;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Flat-file output flavor. `Tabular` is plain UTF-8 CSV for downstream
/// analysis; `Spreadsheet` is the same table with a UTF-8 BOM and CRLF line
/// endings so spreadsheet applications open it cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Tabular,
    Spreadsheet,
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Writes the derived table and the quality summary into the output
/// directory.
pub struct FlatFileExporter {
    out_dir: PathBuf,
}

impl FlatFileExporter {
    pub fn new<P: AsRef<Path>>(out_dir: P) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_path_buf(),
        }
    }

    /// Writes the full derived table in the requested format and returns the
    /// output path.
    pub fn write_table(&self, records: &[DerivedRecord], format: TableFormat) -> Result<PathBuf> {
        fs::create_dir_all(&self.out_dir)?;

        let (file_name, terminator) = match format {
            TableFormat::Tabular => ("cleaned_financial_data.csv", csv::Terminator::Any(b'\n')),
            TableFormat::Spreadsheet => ("cleaned_financial_data_excel.csv", csv::Terminator::CRLF),
        };
        let path = self.out_dir.join(file_name);

        let mut file = File::create(&path)?;
        if format == TableFormat::Spreadsheet {
            file.write_all(UTF8_BOM)?;
        }

        let mut writer = csv::WriterBuilder::new()
            .terminator(terminator)
            .from_writer(file);

        writer.write_record(DERIVED_COLUMNS)?;
        for record in records {
            writer.write_record(csv_fields(record))?;
        }
        writer.flush()?;

        info!("Wrote {} records to {}", records.len(), path.display());
        Ok(path)
    }

    /// Writes the human-readable summary plus a JSON rendition of the
    /// quality report. Returns the text summary path.
    pub fn write_summary(&self, report: &QualityReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.out_dir)?;

        let text_path = self.out_dir.join("cleaned_financial_data_summary.txt");
        fs::write(&text_path, render_summary(report))?;

        let json_path = self.out_dir.join("quality_report.json");
        let json = serde_json::to_string_pretty(report)?;
        fs::write(&json_path, json)?;

        info!("Wrote quality summary to {}", text_path.display());
        Ok(text_path)
    }
}

/// One derived record as flat CSV fields, in [`DERIVED_COLUMNS`] order.
/// Non-computable metrics serialize as empty fields.
fn csv_fields(derived: &DerivedRecord) -> Vec<String> {
    let record = &derived.record;
    let features = &derived.features;
    let metric = |m: crate::pipeline::derive::Metric| {
        m.value().map(|v| v.to_string()).unwrap_or_default()
    };

    vec![
        record.segment.clone(),
        record.country.clone(),
        record.product.clone(),
        record.discount_band.clone(),
        record.units_sold.to_string(),
        record.manufacturing_price.to_string(),
        record.sale_price.to_string(),
        record.gross_sales.to_string(),
        record.discounts.to_string(),
        record.net_sales.to_string(),
        record.cogs.to_string(),
        record.profit.to_string(),
        record.transaction_date.format("%Y-%m-%d").to_string(),
        record.month_number.to_string(),
        record.month_name.clone(),
        record.year.to_string(),
        features.quarter.to_string(),
        features.day_of_week.to_string(),
        metric(features.profit_margin),
        metric(features.discount_rate),
        metric(features.revenue_per_unit),
        features.sales_category.label().to_string(),
        features.units_category.label().to_string(),
        (features.high_performer as u8).to_string(),
        (features.premium_product as u8).to_string(),
    ]
}

fn render_summary(report: &QualityReport) -> String {
    let mut out = String::new();
    out.push_str("BUSINESS INTELLIGENCE DATA CLEANING SUMMARY\n");
    out.push_str(&"=".repeat(50));
    out.push('\n');
    out.push_str(&format!(
        "Processing Date: {}\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str(&format!("Records: {}\n", report.record_count));
    out.push_str(&format!("Columns: {}\n", report.column_count));
    match &report.date_range {
        Some(range) => out.push_str(&format!(
            "Date range: {} to {}\n",
            range.earliest, range.latest
        )),
        None => out.push_str("Date range: n/a\n"),
    }
    out.push_str(&format!("Countries: {}\n", report.countries.join(", ")));
    out.push_str(&format!("Products: {}\n", report.products.join(", ")));
    out.push_str(&format!(
        "Customer Segments: {}\n",
        report.segments.join(", ")
    ));
    out.push_str(&format!(
        "Total Gross Sales: ${:.2}\n",
        report.total_gross_sales
    ));
    out.push_str(&format!("Total Net Sales: ${:.2}\n", report.total_net_sales));
    out.push_str(&format!("Total Profit: ${:.2}\n", report.total_profit));
    match report.mean_profit_margin {
        Some(mean) => out.push_str(&format!("Average Profit Margin: {mean:.2}%\n")),
        None => out.push_str("Average Profit Margin: n/a\n"),
    }
    match report.mean_discount_rate {
        Some(mean) => out.push_str(&format!("Average Discount Rate: {mean:.2}%\n")),
        None => out.push_str("Average Discount Rate: n/a\n"),
    }
    out.push_str(&format!(
        "High Performing Records: {} ({:.1}%)\n",
        report.high_performer_count, report.high_performer_pct
    ));
    out.push_str(&format!(
        "Premium Products: {} ({:.1}%)\n",
        report.premium_product_count, report.premium_product_pct
    ));
    out.push_str(&format!(
        "Invalid (non-computable) values: {}\n",
        report.invalid_value_count
    ));
    out.push_str(&format!(
        "Duplicate records removed: {}\n",
        report.duplicate_count
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::derive::derive;
    use crate::pipeline::quality::assess;
    use crate::types::NormalizedRecord;
    use chrono::NaiveDate;

    fn record(gross_sales: f64) -> NormalizedRecord {
        NormalizedRecord {
            segment: "Government".to_string(),
            country: "Canada".to_string(),
            product: "Carretera".to_string(),
            discount_band: "None".to_string(),
            units_sold: 1618.5,
            manufacturing_price: 3.0,
            sale_price: 20.0,
            gross_sales,
            discounts: 0.0,
            net_sales: gross_sales,
            cogs: 16185.0,
            profit: 16185.0,
            transaction_date: NaiveDate::from_ymd_opt(2014, 1, 1).unwrap(),
            month_number: 1,
            month_name: "January".to_string(),
            year: 2014,
        }
    }

    #[test]
    fn tabular_export_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = FlatFileExporter::new(dir.path());
        let derived = derive(&[record(32370.0)]).unwrap();

        let path = exporter.write_table(&derived, TableFormat::Tabular).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();

        assert_eq!(lines.next().unwrap(), DERIVED_COLUMNS.join(","));
        let row = lines.next().unwrap();
        assert!(row.starts_with("Government,Canada,Carretera,None,"));
        assert!(row.contains("2014-01-01"));
    }

    #[test]
    fn spreadsheet_export_is_bom_prefixed_with_crlf() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = FlatFileExporter::new(dir.path());
        let derived = derive(&[record(32370.0)]).unwrap();

        let path = exporter
            .write_table(&derived, TableFormat::Spreadsheet)
            .unwrap();
        let bytes = fs::read(&path).unwrap();

        assert!(bytes.starts_with(UTF8_BOM));
        assert!(bytes.windows(2).any(|w| w == b"\r\n"));
    }

    #[test]
    fn not_computable_metrics_export_as_empty_fields() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = FlatFileExporter::new(dir.path());
        let derived = derive(&[record(0.0)]).unwrap();

        let path = exporter.write_table(&derived, TableFormat::Tabular).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let row = content.lines().nth(1).unwrap();
        let fields: Vec<&str> = row.split(',').collect();

        // profit_margin and discount_rate positions in DERIVED_COLUMNS
        assert_eq!(fields[18], "");
        assert_eq!(fields[19], "");
    }

    #[test]
    fn summary_renders_report_fields_and_json_twin() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = FlatFileExporter::new(dir.path());
        let derived = derive(&[record(32370.0)]).unwrap();
        let report = assess(&derived, 1);

        let path = exporter.write_summary(&report).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("Records: 1"));
        assert!(text.contains("Countries: Canada"));
        assert!(text.contains("Duplicate records removed: 1"));

        let json = fs::read_to_string(dir.path().join("quality_report.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["record_count"], 1);
    }
}
