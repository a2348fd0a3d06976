//! Typed outcomes of table resolution.

use thiserror::Error;

use crate::document::ReportId;

/// Fatal resolution failures. Either one aborts the run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// No decoder could interpret the content.
    #[error("{report}: document could not be decoded as markup or spreadsheet")]
    UnparsableDocument { report: ReportId },

    /// The content decoded, but it holds no tabular region.
    #[error("{report}: no table found in document (decoded as {decoder})")]
    NoTableFound {
        report: ReportId,
        decoder: &'static str,
    },
}

/// Non-fatal findings handed back with a resolution.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum ResolveWarning {
    /// No header row could be located; the table was returned un-promoted.
    HeaderNotFound {
        report: ReportId,
        rows: usize,
        fallback_offset: usize,
    },
}

impl std::fmt::Display for ResolveWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveWarning::HeaderNotFound {
                report,
                rows,
                fallback_offset,
            } => write!(
                f,
                "{report}: header not found ({rows} rows, fallback offset {fallback_offset}); table left un-promoted"
            ),
        }
    }
}
