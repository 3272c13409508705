use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Ingest failed: {0}")]
    Ingest(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: column '{column}' is missing (first offending row {row})")]
    Schema { column: String, row: usize },

    #[error("Derivation error: required input '{field}' is not usable at row {row}")]
    Derivation { field: String, row: usize },

    #[error("Persistence error: {message}")]
    Persistence { message: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
