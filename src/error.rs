//! Error types for deseq_report

use thiserror::Error;

/// Main error type for the report pipeline
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Input file not found: {path}")]
    MissingInput { path: String },

    #[error("Invalid count matrix: {reason}")]
    InvalidCountMatrix { reason: String },

    #[error("Invalid sample design: {reason}")]
    InvalidDesign { reason: String },

    #[error(
        "Sample IDs do not match between counts and design. \
         In design but not counts: {missing_in_counts:?}. In counts but not design: {missing_in_design:?}"
    )]
    SampleMismatch {
        missing_in_counts: Vec<String>,
        missing_in_design: Vec<String>,
    },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Dispersion estimation failed for gene {gene_id}: {reason}")]
    DispersionEstimationFailed { gene_id: String, reason: String },

    #[error("Invalid design matrix: {reason}")]
    InvalidDesignMatrix { reason: String },

    #[error("Invalid contrast specification: {reason}")]
    InvalidContrast { reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    #[error("Size factor estimation failed: {reason}")]
    SizeFactorFailed { reason: String },

    #[error("Trend fitting failed: {reason}")]
    TrendFittingFailed { reason: String },

    #[error("Plot rendering failed: {reason}")]
    Plot { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },
}

impl<E> From<plotters::drawing::DrawingAreaErrorKind<E>> for ReportError
where
    E: std::error::Error + Send + Sync,
{
    fn from(err: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        ReportError::Plot {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for report operations
pub type Result<T> = std::result::Result<T, ReportError>;
