use anyhow::Result;
use std::fs;
use tempfile::tempdir;

use bi_pipeline::export::FlatFileExporter;
use bi_pipeline::pipeline::Pipeline;
use bi_pipeline::reader::CsvReader;
use bi_pipeline::sink::{RelationalSink, SqliteSink};

const HEADER: &str = "Segment,Country,Product,Discount Band,Units Sold,Manufacturing Price,Sale Price,Gross Sales,Discounts, Sales,COGS,Profit,Date,Month Number,Month Name,Year";

// Margins: A = 25%, B = 10%, C not computable. A is duplicated once.
const ROWS: [&str; 4] = [
    "Government,Canada,Carretera,,1000,3,120,100000,0,100000,75000,25000,2014-01-01,1,January,2014",
    "Government,Canada,Carretera,,1000,3,120,100000,0,100000,75000,25000,2014-01-01,1,January,2014",
    "Midmarket,France,Paseo,Low,2500,10,15,50000,0,50000,45000,5000,6/1/2014,6,June,2014",
    "Enterprise,Mexico,Velo,High,0,5,20,0,0,0,0,0,2014-09-15,9,September,2014",
];

fn write_fixture(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("financial_sample.csv");
    let mut content = String::from(HEADER);
    for row in ROWS {
        content.push('\n');
        content.push_str(row);
    }
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn full_pipeline_cleans_derives_exports_and_loads() -> Result<()> {
    let temp_dir = tempdir()?;
    let input = write_fixture(temp_dir.path());
    let out_dir = temp_dir.path().join("processed");

    let reader = CsvReader::new(&input);
    let exporter = FlatFileExporter::new(&out_dir);
    let mut sink = SqliteSink::open(temp_dir.path().join("bi.db"))?;

    let result = Pipeline::run(&reader, Some(&exporter), Some(&mut sink))?;

    assert_eq!(result.raw_count, 4);
    assert_eq!(result.duplicates_removed, 1);
    assert_eq!(result.derived_count, 3);
    assert!(result.sink_errors.is_empty());

    // Median over computable margins {25, 10} is 17.5: only row A exceeds it.
    assert_eq!(result.report.high_performer_count, 1);
    // Row C contributes a non-computable margin, discount rate, and
    // revenue per unit.
    assert_eq!(result.report.invalid_value_count, 3);
    // Only row A has sale_price > 100.
    assert_eq!(result.report.premium_product_count, 1);
    assert_eq!(result.report.duplicate_count, 1);
    assert_eq!(result.report.total_gross_sales, 150_000.0);

    let range = result.report.date_range.unwrap();
    assert_eq!(range.earliest.to_string(), "2014-01-01");
    assert_eq!(range.latest.to_string(), "2014-09-15");

    // Both flat-file formats plus the text summary were written.
    assert!(out_dir.join("cleaned_financial_data.csv").exists());
    assert!(out_dir.join("cleaned_financial_data_excel.csv").exists());
    assert!(out_dir.join("cleaned_financial_data_summary.txt").exists());
    assert!(out_dir.join("quality_report.json").exists());

    // The exported table reflects the high-performer assignment per row.
    let table = fs::read_to_string(out_dir.join("cleaned_financial_data.csv"))?;
    let flags: Vec<&str> = table
        .lines()
        .skip(1)
        .map(|line| line.rsplit(',').nth(1).unwrap())
        .collect();
    assert_eq!(flags, vec!["1", "0", "0"]);

    assert_eq!(result.persisted_rows, Some(3));
    assert_eq!(sink.row_count()?, 3);

    Ok(())
}

#[test]
fn pipeline_is_idempotent_across_runs() -> Result<()> {
    let temp_dir = tempdir()?;
    let input = write_fixture(temp_dir.path());
    let reader = CsvReader::new(&input);

    let out_a = temp_dir.path().join("a");
    let out_b = temp_dir.path().join("b");
    let first = Pipeline::run(&reader, Some(&FlatFileExporter::new(&out_a)), None)?;
    let second = Pipeline::run(&reader, Some(&FlatFileExporter::new(&out_b)), None)?;

    // Identical derived table bytes and an identical quality report
    // (timestamps live only in the text summary).
    let table_a = fs::read(out_a.join("cleaned_financial_data.csv"))?;
    let table_b = fs::read(out_b.join("cleaned_financial_data.csv"))?;
    assert_eq!(table_a, table_b);
    assert_eq!(first.report, second.report);

    Ok(())
}

#[test]
fn reloading_replaces_prior_database_contents() -> Result<()> {
    let temp_dir = tempdir()?;
    let input = write_fixture(temp_dir.path());
    let reader = CsvReader::new(&input);
    let db_path = temp_dir.path().join("bi.db");

    {
        let mut sink = SqliteSink::open(&db_path)?;
        Pipeline::run(&reader, None, Some(&mut sink))?;
        assert_eq!(sink.row_count()?, 3);
    }

    // A second run against the already-populated database ends with exactly
    // the new row count, not six.
    let mut sink = SqliteSink::open(&db_path)?;
    let result = Pipeline::run(&reader, None, Some(&mut sink))?;
    assert_eq!(result.persisted_rows, Some(3));
    assert_eq!(sink.row_count()?, 3);

    let summary = sink.summary()?;
    assert_eq!(summary.distinct_countries, 3);
    assert_eq!(summary.total_net_sales, 150_000.0);

    Ok(())
}

#[test]
fn missing_input_aborts_before_any_sink_is_touched() {
    let temp_dir = tempdir().unwrap();
    let reader = CsvReader::new(temp_dir.path().join("absent.csv"));
    let mut sink = SqliteSink::open(temp_dir.path().join("bi.db")).unwrap();

    let result = Pipeline::run(&reader, None, Some(&mut sink));
    assert!(result.is_err());
    // The schema was never created, so the sink has no table to count.
    assert!(sink.row_count().is_err());
}
