use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised by the assembly and analysis pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A spectrum file does not have the expected instrument layout.
    #[error("cannot parse {file}: {reason}")]
    Parse { file: String, reason: String },

    /// Too few points to fit a baseline of the requested order.
    #[error("{file}: {points} point(s) are not enough for a baseline of order {order}")]
    InsufficientData {
        file: String,
        points: usize,
        order: usize,
    },

    #[error("assembly failed: {0}")]
    Assembly(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("export failed: {0}")]
    Export(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet read error: {0}")]
    SpreadsheetRead(#[from] calamine::Error),

    #[error("spreadsheet write error: {0}")]
    SpreadsheetWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Wrap an I/O error together with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn parse(file: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Parse {
            file: file.into(),
            reason: reason.into(),
        }
    }
}
