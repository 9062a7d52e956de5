use thiserror::Error;

/// Failures surfaced by report computation. Any storage failure aborts the
/// whole computation; there is no partial report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("storage read failed: {0}")]
    Storage(#[from] sqlx::Error),
}
