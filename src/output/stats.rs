//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the SQLite sink.

use crate::storage::{RunRecord, SinkResult, SqliteSink};
use std::collections::BTreeMap;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Total number of stored records
    pub total_records: u64,

    /// Count of records by category
    pub records_by_category: BTreeMap<String, u64>,

    /// Count of records by image status; `None` counts records without an image
    pub records_by_image_status: BTreeMap<Option<String>, u64>,

    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,

    /// Page failures recorded by the most recent run
    pub latest_run_failures: usize,
}

impl HarvestStatistics {
    /// Share of records whose image was downloaded, as a percentage
    pub fn image_coverage(&self) -> f64 {
        if self.total_records == 0 {
            return 0.0;
        }
        let downloaded = self
            .records_by_image_status
            .get(&Some("downloaded".to_string()))
            .copied()
            .unwrap_or(0);
        downloaded as f64 / self.total_records as f64 * 100.0
    }
}

/// Loads statistics from the database
pub fn load_statistics(sink: &SqliteSink) -> SinkResult<HarvestStatistics> {
    let latest_run = sink.get_latest_run()?;
    let latest_run_failures = match &latest_run {
        Some(run) => sink.load_page_failures(Some(run.id))?.len(),
        None => 0,
    };

    Ok(HarvestStatistics {
        total_records: sink.count_records()?,
        records_by_category: sink.count_by_category()?,
        records_by_image_status: sink.count_by_image_status()?,
        latest_run,
        latest_run_failures,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Total records: {}", stats.total_records);
    println!("  Categories: {}", stats.records_by_category.len());
    println!();

    println!("Records by Category:");
    let mut category_counts: Vec<_> = stats.records_by_category.iter().collect();
    category_counts.sort_by(|a, b| b.1.cmp(a.1));

    for (category, count) in category_counts {
        let percentage = if stats.total_records > 0 {
            (*count as f64 / stats.total_records as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", category, count, percentage);
    }
    println!();

    println!("Images:");
    for (status, count) in &stats.records_by_image_status {
        println!("  {}: {}", status.as_deref().unwrap_or("none"), count);
    }
    println!("  Coverage: {:.1}%", stats.image_coverage());
    println!();

    if let Some(run) = &stats.latest_run {
        println!("Latest Run:");
        println!("  Id: {}", run.id);
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!("  Status: {}", run.status.to_db_string());
        println!("  Failed pages: {}", stats.latest_run_failures);
    }
}
