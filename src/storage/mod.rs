//! Storage module for persisting harvested records
//!
//! This module handles:
//! - The `Sink` trait the pipeline writes through
//! - SQLite schema and the SQLite-backed sink
//! - Cover image files on disk
//! - Run tracking and page failure history

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{safe_component, SqliteSink};
pub use traits::{Sink, SinkError, SinkResult};

use crate::config::Config;
use std::path::Path;

/// Opens the sink described by the output and image configuration
pub fn open_sink(config: &Config) -> SinkResult<SqliteSink> {
    SqliteSink::new(
        Path::new(&config.output.database_path),
        &config.images.directory,
    )
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
