//! Catalog-Harvest: a bounded-concurrency listing harvester
//!
//! This crate walks the paginated product listing of a catalog site across a
//! set of platform categories, extracts one record per listing card, downloads
//! and normalizes each card's cover image, and persists everything idempotently.

pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Catalog-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sink error: {0}")]
    Sink(#[from] storage::SinkError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors raised while fetching a document, after retries are exhausted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("request rejected with HTTP {0}")]
    ClientRejected(u16),

    #[error("server error HTTP {0}")]
    ServerError(u16),

    #[error("connection failed")]
    ConnectionFailed,
}

impl FetchError {
    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::ServerError(_) | Self::ConnectionFailed => true,
            Self::ClientRejected(status) => *status == 429,
        }
    }
}

/// Errors raised while extracting records from a document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("malformed document: {0}")]
    MalformedDocument(String),
}

/// Errors that degrade a single record's image
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("image decode failed: {0}")]
    DecodeFailed(String),

    #[error("image fetch failed: {0}")]
    FetchFailed(FetchError),
}

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_harvest, Pipeline, RunSummary};
pub use model::{Field, FetchTask, ImageRef, ImageStatus, ItemRecord, PageFailure, RecordKey};
pub use state::CategoryState;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_transient() {
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::ConnectionFailed.is_transient());
        assert!(FetchError::ServerError(503).is_transient());
        assert!(FetchError::ClientRejected(429).is_transient());
        assert!(!FetchError::ClientRejected(404).is_transient());
        assert!(!FetchError::ClientRejected(403).is_transient());
    }
}
