pub mod derive;
pub mod normalize;
pub mod quality;
pub mod relational;

use crate::error::Result;
use crate::export::{FlatFileExporter, TableFormat};
use crate::pipeline::quality::QualityReport;
use crate::reader::RecordReader;
use crate::sink::RelationalSink;
use std::path::PathBuf;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Result of a complete pipeline run.
#[derive(Debug)]
pub struct PipelineRunResult {
    pub run_id: Uuid,
    pub raw_count: usize,
    pub duplicates_removed: usize,
    pub derived_count: usize,
    pub report: QualityReport,
    pub export_files: Vec<PathBuf>,
    pub persisted_rows: Option<usize>,
    /// Failures from the flat-file and relational sinks. Each sink fails in
    /// isolation; an error here never rolls back the other outputs.
    pub sink_errors: Vec<String>,
}

pub struct Pipeline;

impl Pipeline {
    /// Runs normalize → derive → { assess, flat-file export, relational
    /// persist }. Ingest, schema, and derivation failures abort the run;
    /// sink failures are collected into the result instead.
    #[instrument(skip_all)]
    pub fn run(
        reader: &dyn RecordReader,
        exporter: Option<&FlatFileExporter>,
        sink: Option<&mut dyn RelationalSink>,
    ) -> Result<PipelineRunResult> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "Starting pipeline run");

        let raw_records = reader.read_all()?;
        let raw_count = raw_records.len();

        let outcome = normalize::normalize(&raw_records)?;
        let derived = derive::derive(&outcome.records)?;

        // The three downstream consumers all read the same derived dataset
        // and never feed back into earlier stages.
        let report = quality::assess(&derived, outcome.duplicates_removed);

        let mut export_files = Vec::new();
        let mut sink_errors = Vec::new();

        if let Some(exporter) = exporter {
            for format in [TableFormat::Tabular, TableFormat::Spreadsheet] {
                match exporter.write_table(&derived, format) {
                    Ok(path) => export_files.push(path),
                    Err(e) => {
                        error!("Flat-file export ({format:?}) failed: {e}");
                        sink_errors.push(format!("export ({format:?}): {e}"));
                    }
                }
            }
            match exporter.write_summary(&report) {
                Ok(path) => export_files.push(path),
                Err(e) => {
                    error!("Summary export failed: {e}");
                    sink_errors.push(format!("summary: {e}"));
                }
            }
        }

        let mut persisted_rows = None;
        if let Some(sink) = sink {
            let rows = relational::to_relational_rows(&derived);
            match relational::persist(&rows, sink) {
                Ok(count) => persisted_rows = Some(count),
                Err(e) => {
                    error!("Relational persist failed: {e}");
                    sink_errors.push(format!("relational: {e}"));
                }
            }
        }

        info!(
            %run_id,
            raw = raw_count,
            derived = derived.len(),
            duplicates = outcome.duplicates_removed,
            "Pipeline run finished"
        );

        Ok(PipelineRunResult {
            run_id,
            raw_count,
            duplicates_removed: outcome.duplicates_removed,
            derived_count: derived.len(),
            report,
            export_files,
            persisted_rows,
            sink_errors,
        })
    }
}
