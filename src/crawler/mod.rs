//! Crawler module for listing harvesting
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching with retry logic
//! - Listing card extraction
//! - Cover image resolution and normalization
//! - Page task scheduling per category
//! - Overall pipeline coordination

mod coordinator;
mod fetcher;
mod image;
mod parser;
mod scheduler;

pub use coordinator::{run_harvest, Pipeline, PipelineResult, RunSummary};
pub use fetcher::{
    build_http_client, parse_retry_after, Document, DocumentSource, FetchGauge, Fetcher,
    HttpSource, RawResponse, RetryPolicy, TransportError,
};
pub use image::{canonical_image_url, normalize_image, ImageResolver, ResolvedImage};
pub use parser::{CardExtractor, CardSelectors, Extractor};
pub use scheduler::Scheduler;
