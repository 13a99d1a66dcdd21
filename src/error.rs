//! # Report Errors
//!
//! Library-level failures while reading statistics or rendering a report.
//! Library functions return [`Result`]; only the binary reaches for `anyhow`.

use thiserror::Error;

/// Errors raised while building or rendering a report
///
/// None of these are fatal to the process: the web layer turns every variant
/// into a `{"success": false, "message": ...}` body and the stores are left
/// untouched.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to create latency histogram: {0}")]
    HistogramCreation(#[from] hdrhistogram::CreationError),

    #[error("failed to record latency sample: {0}")]
    HistogramRecord(#[from] hdrhistogram::RecordError),

    #[error("failed to merge latency histograms: {0}")]
    HistogramMerge(#[from] hdrhistogram::AdditionError),

    /// Raised by a [`StatsSource`](crate::stats::StatsSource) that cannot
    /// produce a consistent read
    #[error("aggregation failed: {0}")]
    Aggregation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ReportError>;
