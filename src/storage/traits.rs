//! Sink trait and error types
//!
//! This module defines the interface the pipeline hands finished records to,
//! and the errors a sink may raise.

use crate::model::{ImageRef, ItemRecord, PageFailure, RecordKey};
use crate::storage::RunStatus;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while persisting records or images
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Run not found: {0}")]
    RunNotFound(i64),
}

impl SinkError {
    /// Whether the error means storage itself is exhausted
    ///
    /// Fatal errors abort the run; every other sink error only loses the
    /// record or image that triggered it.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Io(e) => matches!(e.kind(), ErrorKind::StorageFull | ErrorKind::OutOfMemory),
            Self::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DiskFull | rusqlite::ErrorCode::OutOfMemory
            ),
            _ => false,
        }
    }
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Destination for harvested records and images
///
/// Writes are idempotent: writing a record whose `(category, title)` already
/// exists replaces it, and writing an image for the same key overwrites the
/// same file.
///
/// The pipeline drives a sink from a single aggregator thread, so
/// implementations need `Send` but not `Sync`.
pub trait Sink: Send {
    /// Upserts one record
    fn write(&mut self, record: &ItemRecord) -> SinkResult<()>;

    /// Stores normalized image bytes for a record and returns where they went
    fn write_image(&mut self, key: &RecordKey, image: &ImageRef, bytes: &[u8]) -> SinkResult<PathBuf>;

    /// Called once before any write of a run
    fn begin_run(&mut self, _config_hash: &str) -> SinkResult<()> {
        Ok(())
    }

    /// Records a page that failed after all retries
    fn record_page_failure(&mut self, _failure: &PageFailure) -> SinkResult<()> {
        Ok(())
    }

    /// Called once after the last write of a run
    fn finish_run(&mut self, _status: RunStatus) -> SinkResult<()> {
        Ok(())
    }
}
