//! Page task scheduling
//!
//! This module handles:
//! - One page cursor per category, driven by `CategoryProgress`
//! - Round-robin issuing across categories so none starves
//! - Stopping a category once a page comes back empty, the page cap is hit,
//!   or too many pages in a row fail
//! - Never issuing the same `(category, page)` twice: category keys are
//!   deduplicated and each page cursor only moves forward

use crate::config::PipelineConfig;
use crate::model::FetchTask;
use crate::state::CategoryProgress;
use std::collections::{BTreeMap, HashSet};

/// Generates fetch tasks and tracks per-category progress
///
/// The scheduler is owned by the dispatcher alone; workers report back
/// through the dispatcher, so no locking is needed here.
pub struct Scheduler {
    /// Categories in configured order with their progress
    categories: Vec<(String, CategoryProgress)>,

    /// Index of the category to try first on the next call
    cursor: usize,

    max_pages: Option<u32>,
    max_consecutive_failures: u32,
}

impl Scheduler {
    /// Creates a scheduler for the given categories
    ///
    /// Duplicate category keys are collapsed.
    pub fn new(categories: &[String], config: &PipelineConfig) -> Self {
        let mut seen = HashSet::new();
        let categories = categories
            .iter()
            .filter(|c| seen.insert(c.as_str()))
            .map(|c| (c.clone(), CategoryProgress::new()))
            .collect();

        Self {
            categories,
            cursor: 0,
            max_pages: config.max_pages,
            max_consecutive_failures: config.max_consecutive_failures.max(1),
        }
    }

    /// Returns the next task to run, or None if no category can issue one now
    ///
    /// None does not mean the run is over: pages in flight may still be
    /// reported. Use `is_finished` for that.
    pub fn next_task(&mut self) -> Option<FetchTask> {
        let count = self.categories.len();

        for offset in 0..count {
            let index = (self.cursor + offset) % count;
            let (category, progress) = &mut self.categories[index];

            if let Some(page) = progress.issue(self.max_pages) {
                let task = FetchTask::new(category.clone(), page);
                self.cursor = (index + 1) % count;
                tracing::trace!("Issuing {}", task);
                return Some(task);
            }
        }

        None
    }

    /// Records a fetched page and the number of cards it held
    pub fn record_success(&mut self, task: &FetchTask, cards: usize) {
        if let Some(progress) = self.progress_mut(&task.category) {
            let was_terminal = progress.state.is_terminal();
            progress.record_success(task.page, cards);
            if !was_terminal && progress.state.is_terminal() {
                tracing::info!(
                    "Category {} exhausted: {}",
                    task.category,
                    progress
                        .exhaust_reason
                        .map(|r| r.to_string())
                        .unwrap_or_default()
                );
            }
        }
    }

    /// Records a page that failed after all retries
    pub fn record_failure(&mut self, task: &FetchTask) {
        let limit = self.max_consecutive_failures;
        if let Some(progress) = self.progress_mut(&task.category) {
            let was_terminal = progress.state.is_terminal();
            progress.record_failure(limit);
            if !was_terminal && progress.state.is_terminal() {
                tracing::warn!(
                    "Category {} abandoned after {} consecutive page failures",
                    task.category,
                    progress.consecutive_failures
                );
            }
        }
    }

    /// Records a page dropped because the run was cancelled
    pub fn record_abandoned(&mut self, task: &FetchTask) {
        if let Some(progress) = self.progress_mut(&task.category) {
            progress.record_abandoned();
        }
    }

    /// True once every category is exhausted and nothing is in flight
    pub fn is_finished(&self) -> bool {
        self.categories.iter().all(|(_, p)| p.is_settled())
    }

    /// Number of tasks issued but not yet reported
    pub fn in_flight(&self) -> u32 {
        self.categories.iter().map(|(_, p)| p.in_flight).sum()
    }

    /// Snapshot of all category progress, keyed by category
    pub fn progress(&self) -> BTreeMap<String, CategoryProgress> {
        self.categories.iter().cloned().collect()
    }

    fn progress_mut(&mut self, category: &str) -> Option<&mut CategoryProgress> {
        self.categories
            .iter_mut()
            .find(|(c, _)| c == category)
            .map(|(_, p)| p)
    }
}
