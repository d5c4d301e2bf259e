//! Output module for exports and run reports
//!
//! This module handles:
//! - Exporting records as CSV, either from a run or from the database
//! - Generating markdown summaries of a run
//! - Reporting database statistics

pub mod csv;
pub mod markdown;
pub mod stats;

pub use self::csv::{
    category_csv_path, write_category_csvs, write_records, write_records_csv, CSV_HEADER,
};
pub use markdown::{format_summary, write_summary};
pub use stats::{load_statistics, print_statistics, HarvestStatistics};

use thiserror::Error;

/// Errors that can occur during output generation
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
