use clap::{Parser, Subcommand};
use tracing::{info, warn};

use bi_pipeline::config::Config;
use bi_pipeline::export::FlatFileExporter;
use bi_pipeline::logging;
use bi_pipeline::pipeline::{Pipeline, PipelineRunResult};
use bi_pipeline::reader::CsvReader;
use bi_pipeline::sink::SqliteSink;

#[derive(Parser)]
#[command(name = "bi_pipeline")]
#[command(about = "Financial Sample sales data cleaning and loading pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Override the raw input CSV path
    #[arg(long)]
    input: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean the raw dataset and export the derived table plus summary
    Clean {
        /// Override the output directory for exported files
        #[arg(long)]
        output_dir: Option<String>,
    },
    /// Clean the raw dataset and load it into the SQLite store
    Load {
        /// Override the SQLite database path
        #[arg(long)]
        db: Option<String>,
    },
    /// Run the full pipeline: clean, export, and load
    Run {
        /// Override the output directory for exported files
        #[arg(long)]
        output_dir: Option<String>,
        /// Override the SQLite database path
        #[arg(long)]
        db: Option<String>,
    },
}

fn print_result(result: &PipelineRunResult) {
    println!("\n📊 Pipeline Results (run {}):", result.run_id);
    println!("   Raw records: {}", result.raw_count);
    println!("   Duplicates removed: {}", result.duplicates_removed);
    println!("   Derived records: {}", result.derived_count);
    println!(
        "   Invalid (non-computable) values: {}",
        result.report.invalid_value_count
    );
    if let Some(mean) = result.report.mean_profit_margin {
        println!("   Average profit margin: {mean:.2}%");
    }
    println!(
        "   High performers: {} ({:.1}%)",
        result.report.high_performer_count, result.report.high_performer_pct
    );
    println!(
        "   Premium products: {} ({:.1}%)",
        result.report.premium_product_count, result.report.premium_product_pct
    );
    for path in &result.export_files {
        println!("   Output file: {}", path.display());
    }
    if let Some(count) = result.persisted_rows {
        println!("   Rows loaded: {count}");
    }

    if !result.sink_errors.is_empty() {
        warn!(
            "{} sink errors encountered during pipeline run",
            result.sink_errors.len()
        );
        println!("\n⚠️  Sink errors encountered:");
        for error in &result.sink_errors {
            println!("   - {error}");
        }
    }
}

fn print_sink_summary(sink: &SqliteSink) -> Result<(), Box<dyn std::error::Error>> {
    let summary = sink.summary()?;
    println!("\n📈 Database Summary:");
    println!("   Records: {}", summary.row_count);
    println!("   Countries: {}", summary.distinct_countries);
    println!("   Products: {}", summary.distinct_products);
    println!("   Customer Segments: {}", summary.distinct_segments);
    println!("   Total Sales: ${:.2}", summary.total_net_sales);
    println!("   Total Profit: ${:.2}", summary.total_profit);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let input = cli.input.unwrap_or_else(|| config.input.path.clone());
    info!("Using input file {input}");
    let reader = CsvReader::new(&input);

    let mut failed = false;
    match cli.command {
        Commands::Clean { output_dir } => {
            println!("🧹 Running cleaning pipeline...");
            let exporter =
                FlatFileExporter::new(output_dir.unwrap_or_else(|| config.output.dir.clone()));
            let result = Pipeline::run(&reader, Some(&exporter), None)?;
            print_result(&result);
            failed = !result.sink_errors.is_empty();
        }
        Commands::Load { db } => {
            println!("🗄️  Running load pipeline...");
            let mut sink =
                SqliteSink::open(db.unwrap_or_else(|| config.database.path.clone()))?;
            let result = Pipeline::run(&reader, None, Some(&mut sink))?;
            print_result(&result);
            if result.persisted_rows.is_some() {
                print_sink_summary(&sink)?;
            }
            failed = !result.sink_errors.is_empty();
        }
        Commands::Run { output_dir, db } => {
            println!("🚀 Running full pipeline...");
            let exporter =
                FlatFileExporter::new(output_dir.unwrap_or_else(|| config.output.dir.clone()));
            let mut sink =
                SqliteSink::open(db.unwrap_or_else(|| config.database.path.clone()))?;
            let result = Pipeline::run(&reader, Some(&exporter), Some(&mut sink))?;
            print_result(&result);
            if result.persisted_rows.is_some() {
                print_sink_summary(&sink)?;
            }
            failed = !result.sink_errors.is_empty();
        }
    }

    if failed {
        std::process::exit(1);
    }
    println!("\n✅ Done");
    Ok(())
}
