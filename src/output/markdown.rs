//! Markdown summary generation
//!
//! This module generates a human-readable markdown report of one run:
//! totals, per-category progress, and the pages that failed.

use super::OutputResult;
use crate::config::Config;
use crate::crawler::PipelineResult;
use crate::model::ImageStatus;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Writes the markdown summary of a run to `output_path`
pub fn write_summary(output_path: &Path, result: &PipelineResult, config: &Config) -> OutputResult<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    fs::write(output_path, format_summary(result, config))?;
    Ok(())
}

/// Formats a run as markdown
pub fn format_summary(result: &PipelineResult, config: &Config) -> String {
    let summary = &result.summary;
    let mut md = String::new();

    md.push_str("# Catalog Harvest Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!(
        "- **Started**: {}\n",
        result.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        summary.duration.as_secs_f64()
    ));
    md.push_str(&format!(
        "- **Status**: {}\n",
        if summary.cancelled { "Cancelled" } else { "Completed" }
    ));
    md.push_str(&format!("- **Source**: {}\n", config.site.base_url));
    md.push_str(&format!(
        "- **Workers**: {} page, {} image\n\n",
        config.pipeline.concurrency, config.pipeline.image_concurrency
    ));

    md.push_str("## Totals\n\n");
    md.push_str(&format!(
        "- **Categories Processed**: {}\n",
        summary.categories_processed
    ));
    md.push_str(&format!("- **Records**: {}\n", summary.total_records));
    md.push_str(&format!("- **Failed Pages**: {}\n", summary.failed_pages));
    md.push_str(&format!("- **Failed Images**: {}\n\n", summary.failed_images));

    // Per-category breakdown
    let mut records_per_category: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for record in result.records.values() {
        let entry = records_per_category.entry(&record.category).or_default();
        entry.0 += 1;
        if record.image_status() == Some(ImageStatus::Downloaded) {
            entry.1 += 1;
        }
    }

    if !result.progress.is_empty() {
        md.push_str("## Categories\n\n");
        md.push_str("| Category | State | Pages | Failed Pages | Records | Images | Stopped Because |\n");
        md.push_str("|----------|-------|-------|--------------|---------|--------|-----------------|\n");

        for (category, progress) in &result.progress {
            let (records, images) = records_per_category
                .get(category.as_str())
                .copied()
                .unwrap_or_default();
            let reason = progress
                .exhaust_reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string());

            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} |\n",
                category,
                progress.state,
                progress.pages_succeeded,
                progress.pages_failed,
                records,
                images,
                reason
            ));
        }
        md.push('\n');
    }

    if !result.page_failures.is_empty() {
        md.push_str("## Failed Pages\n\n");
        for failure in &result.page_failures {
            md.push_str(&format!(
                "- {} page {}: {}\n",
                failure.task.category, failure.task.page, failure.error
            ));
        }
        md.push('\n');
    }

    md.push_str("---\n\n");
    md.push_str(&format!(
        "*Generated by catalog-harvest v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::RunSummary;
    use crate::model::{FetchTask, ItemRecord, PageFailure};
    use crate::state::CategoryProgress;
    use chrono::Utc;
    use std::time::Duration;

    fn result() -> PipelineResult {
        let record = ItemRecord::new("Hades", "pc", "https://site/game/hades/");
        let mut progress = CategoryProgress::new();
        let page = progress.issue(None).unwrap();
        progress.record_success(page, 1);

        PipelineResult {
            records: [(record.key(), record)].into_iter().collect(),
            page_failures: vec![PageFailure {
                task: FetchTask::new("pc", 2),
                error: "server error HTTP 503".to_string(),
            }],
            progress: [("pc".to_string(), progress)].into_iter().collect(),
            started_at: Utc::now(),
            summary: RunSummary {
                categories_processed: 1,
                total_records: 1,
                failed_pages: 1,
                failed_images: 0,
                cancelled: false,
                duration: Duration::from_secs(3),
            },
        }
    }

    #[test]
    fn test_format_summary_sections() {
        let md = format_summary(&result(), &Config::default());

        assert!(md.starts_with("# Catalog Harvest Summary"));
        assert!(md.contains("- **Records**: 1"));
        assert!(md.contains("| pc | in_progress | 1 | 0 | 1 | 0 | - |"));
        assert!(md.contains("- pc page 2: server error HTTP 503"));
    }

    #[test]
    fn test_write_summary() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("reports").join("summary.md");

        write_summary(&path, &result(), &Config::default()).unwrap();

        assert!(fs::read_to_string(&path).unwrap().contains("Failed Pages"));
    }
}
