//! Fatal errors of report generation.
//!
//! Anything in here aborts the run with a non-zero exit. Per-metric problems
//! (bad statistics, unparsable thresholds) are recovered where they happen
//! and never reach this type.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort report generation.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to read metrics file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed JSON on line {line}: {source}")]
    MalformedLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write report to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ReportError {
    /// Short label for structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            ReportError::Read { .. } => "read_error",
            ReportError::MalformedLine { .. } => "malformed_line",
            ReportError::Write { .. } => "write_error",
        }
    }
}
