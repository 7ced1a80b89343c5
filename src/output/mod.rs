//! Export of archived articles
//!
//! Stored articles can be written out as CSV for spreadsheets and other
//! tools. The database stays the source of truth; exports are snapshots.

mod csv;

pub use csv::{export_articles_csv, write_articles_csv, CSV_HEADER};

use thiserror::Error;

/// Errors that can occur while exporting
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Nothing to export")]
    Empty,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
