use crate::error::{PipelineError, Result};
use crate::types::RawRecord;
use std::path::{Path, PathBuf};
use tracing::info;

/// Source of raw transaction records. The pipeline only depends on this
/// seam, so alternative ingests (spreadsheets, APIs) can be swapped in.
pub trait RecordReader {
    fn read_all(&self) -> Result<Vec<RawRecord>>;
}

/// CSV-backed reader for the Financial Sample export.
pub struct CsvReader {
    path: PathBuf,
}

impl CsvReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RecordReader for CsvReader {
    fn read_all(&self) -> Result<Vec<RawRecord>> {
        if !self.path.exists() {
            return Err(PipelineError::Ingest(format!(
                "source file not found: {}",
                self.path.display()
            )));
        }

        // Field values are trimmed; headers are left untouched so the
        // defective leading-space sales header is observed as-is.
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Fields)
            .from_path(&self.path)
            .map_err(|e| {
                PipelineError::Ingest(format!("failed to open {}: {e}", self.path.display()))
            })?;

        let mut records = Vec::new();
        for (idx, result) in reader.deserialize().enumerate() {
            // +2: one for the header line, one for 1-based numbering
            let record: RawRecord = result
                .map_err(|e| PipelineError::Ingest(format!("line {}: {e}", idx + 2)))?;
            records.push(record);
        }

        info!("Read {} raw records from {}", records.len(), self.path.display());
        Ok(records)
    }
}
