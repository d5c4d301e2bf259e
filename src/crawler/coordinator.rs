//! Pipeline coordinator - main harvest orchestration logic
//!
//! A run is split into four stages connected by bounded channels:
//!
//! 1. The dispatcher (the task calling `Pipeline::run`) owns the `Scheduler`
//!    and keeps at most `concurrency` page tasks outstanding.
//! 2. The fetch stage runs up to `concurrency` page fetches at once. Each one
//!    fetches a listing page, extracts its cards, reports a `PageOutcome` back
//!    to the dispatcher and forwards the records.
//! 3. The processing stage resolves cover images, up to `image-concurrency`
//!    at a time, so image work never occupies a fetch slot.
//! 4. The aggregator runs on a blocking thread. It is the only owner of the
//!    `Sink` and of the collected records.

use crate::config::{Config, PipelineConfig, SiteConfig};
use crate::crawler::fetcher::{DocumentSource, FetchGauge, Fetcher, HttpSource, RetryPolicy};
use crate::crawler::image::ImageResolver;
use crate::crawler::parser::{CardExtractor, CardSelectors, Extractor};
use crate::crawler::scheduler::Scheduler;
use crate::model::{FetchTask, ImageStatus, ItemRecord, PageFailure, RecordKey};
use crate::output::{csv, markdown};
use crate::state::{CategoryProgress, CategoryState};
use crate::storage::{open_sink, RunStatus, Sink, SinkError, SqliteSink};
use crate::url::build_listing_url;
use crate::{ConfigError, FetchError, HarvestError};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Records buffered between stages before senders wait
const RECORD_BUFFER: usize = 256;

/// Totals for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Categories that had at least one page issued
    pub categories_processed: usize,
    pub total_records: usize,
    pub failed_pages: usize,
    pub failed_images: usize,
    pub cancelled: bool,
    pub duration: Duration,
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Records keyed by `(category, title)`, last write wins
    pub records: BTreeMap<RecordKey, ItemRecord>,
    pub page_failures: Vec<PageFailure>,
    pub progress: BTreeMap<String, CategoryProgress>,
    pub started_at: DateTime<Utc>,
    pub summary: RunSummary,
}

/// What a fetch slot reports back to the dispatcher
#[derive(Debug)]
enum PageOutcome {
    Fetched { task: FetchTask, cards: usize },
    Failed(PageFailure),
    Abandoned(FetchTask),
}

/// Messages handled by the aggregator
enum AggregatorMessage {
    Record {
        record: ItemRecord,
        image_bytes: Option<Vec<u8>>,
    },
    PageFailed(PageFailure),
}

/// State owned by the aggregator thread
#[derive(Default)]
struct Aggregate {
    records: BTreeMap<RecordKey, ItemRecord>,
    page_failures: Vec<PageFailure>,
    fatal: Option<SinkError>,
}

/// Bounded-concurrency harvest pipeline
pub struct Pipeline {
    pipeline: PipelineConfig,
    site: SiteConfig,
    categories: Vec<String>,
    fetcher: Fetcher,
    images: Option<ImageResolver>,
    extractor: Arc<dyn Extractor>,
}

impl Pipeline {
    /// Creates a pipeline over the given document source
    ///
    /// Pages and images share the source but keep separate in-flight gauges.
    pub fn new(config: &Config, source: Arc<dyn DocumentSource>) -> Result<Self, ConfigError> {
        let fetcher = Fetcher::new(source, RetryPolicy::from_config(&config.pipeline));
        let images = config
            .images
            .enabled
            .then(|| ImageResolver::new(fetcher.with_separate_gauge(), config.images.jpeg_quality));
        let extractor = CardExtractor::new(&CardSelectors::default())?;

        Ok(Self {
            pipeline: config.pipeline.clone(),
            site: config.site.clone(),
            categories: config.categories.clone(),
            fetcher,
            images,
            extractor: Arc::new(extractor),
        })
    }

    /// Creates a pipeline over HTTP
    pub fn from_config(config: &Config) -> Result<Self, HarvestError> {
        let source = HttpSource::from_config(&config.site, &config.pipeline)?;
        Ok(Self::new(config, Arc::new(source))?)
    }

    /// Replaces the card extractor
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// In-flight gauge of page fetches
    pub fn page_gauge(&self) -> Arc<FetchGauge> {
        self.fetcher.gauge()
    }

    /// Runs the pipeline to completion or cancellation
    ///
    /// Returns the sink back alongside the result so callers can keep
    /// querying it. A fatal sink error cancels the run and is returned
    /// once every stage has stopped.
    pub async fn run<S>(
        &self,
        sink: S,
        config_hash: &str,
        cancel: CancellationToken,
    ) -> Result<(PipelineResult, S), HarvestError>
    where
        S: Sink + 'static,
    {
        let started_at = Utc::now();
        let start = Instant::now();
        let width = self.pipeline.concurrency.max(1) as usize;
        let image_width = self.pipeline.image_concurrency.max(1) as usize;

        // Fatal sink errors cancel this token without touching the caller's
        let run_token = cancel.child_token();

        tracing::info!(
            "Starting harvest of {} categories with {} fetch workers",
            self.categories.len(),
            width
        );

        let (task_tx, task_rx) = mpsc::channel::<FetchTask>(width);
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<PageOutcome>(width);
        let (record_tx, record_rx) = mpsc::channel::<ItemRecord>(RECORD_BUFFER);
        let (aggregate_tx, aggregate_rx) = mpsc::channel::<AggregatorMessage>(RECORD_BUFFER);

        let aggregator = {
            let config_hash = config_hash.to_string();
            let run_token = run_token.clone();
            tokio::task::spawn_blocking(move || aggregate(sink, aggregate_rx, &config_hash, run_token))
        };

        let processing = tokio::spawn(process_records(
            record_rx,
            self.images.clone(),
            image_width,
            aggregate_tx.clone(),
        ));

        let fetching = tokio::spawn(fetch_pages(
            task_rx,
            width,
            PageWorker {
                fetcher: self.fetcher.clone(),
                extractor: self.extractor.clone(),
                site: self.site.clone(),
            },
            outcome_tx,
            record_tx,
            run_token.clone(),
        ));

        let mut scheduler = Scheduler::new(&self.categories, &self.pipeline);
        let mut cancel_logged = false;

        loop {
            if !run_token.is_cancelled() {
                while (scheduler.in_flight() as usize) < width {
                    let Some(task) = scheduler.next_task() else {
                        break;
                    };
                    if task_tx.send(task).await.is_err() {
                        return Err(HarvestError::Task("fetch stage stopped early".to_string()));
                    }
                }
            }

            // Nothing in flight with nothing issuable means every category is
            // settled, or the run was cancelled
            if scheduler.is_finished() || scheduler.in_flight() == 0 {
                break;
            }

            tokio::select! {
                outcome = outcome_rx.recv() => {
                    let Some(outcome) = outcome else {
                        break;
                    };

                    match outcome {
                        PageOutcome::Fetched { task, cards } => {
                            tracing::debug!("{}: {} cards", task, cards);
                            scheduler.record_success(&task, cards);
                        }
                        PageOutcome::Failed(failure) => {
                            tracing::warn!("Page failed: {}", failure);
                            scheduler.record_failure(&failure.task);
                            if aggregate_tx.send(AggregatorMessage::PageFailed(failure)).await.is_err() {
                                tracing::error!("Aggregator stopped before the run finished");
                            }
                        }
                        PageOutcome::Abandoned(task) => {
                            tracing::debug!("{} abandoned", task);
                            scheduler.record_abandoned(&task);
                        }
                    }
                }
                _ = run_token.cancelled(), if !cancel_logged => {
                    cancel_logged = true;
                    tracing::info!(
                        "Cancellation requested, waiting for {} in-flight pages",
                        scheduler.in_flight()
                    );
                }
            }
        }

        drop(task_tx);
        drop(aggregate_tx);

        fetching
            .await
            .map_err(|e| HarvestError::Task(format!("fetch stage: {}", e)))?;
        processing
            .await
            .map_err(|e| HarvestError::Task(format!("processing stage: {}", e)))?;
        let (sink, aggregate) = aggregator
            .await
            .map_err(|e| HarvestError::Task(format!("aggregator: {}", e)))?;

        if let Some(fatal) = aggregate.fatal {
            tracing::error!("Harvest aborted: {}", fatal);
            return Err(fatal.into());
        }

        let progress = scheduler.progress();
        let summary = RunSummary {
            categories_processed: progress
                .values()
                .filter(|p| p.state != CategoryState::NotStarted)
                .count(),
            total_records: aggregate.records.len(),
            failed_pages: aggregate.page_failures.len(),
            failed_images: aggregate
                .records
                .values()
                .filter(|r| r.image_status() == Some(ImageStatus::Failed))
                .count(),
            cancelled: cancel.is_cancelled(),
            duration: start.elapsed(),
        };

        tracing::info!(
            "Harvest {}: {} records from {} categories, {} failed pages, {} failed images in {:.1}s",
            if summary.cancelled { "cancelled" } else { "complete" },
            summary.total_records,
            summary.categories_processed,
            summary.failed_pages,
            summary.failed_images,
            summary.duration.as_secs_f64()
        );

        let result = PipelineResult {
            records: aggregate.records,
            page_failures: aggregate.page_failures,
            progress,
            started_at,
            summary,
        };

        Ok((result, sink))
    }
}

/// Everything a fetch slot needs to turn a task into records
#[derive(Clone)]
struct PageWorker {
    fetcher: Fetcher,
    extractor: Arc<dyn Extractor>,
    site: SiteConfig,
}

impl PageWorker {
    async fn fetch_page(&self, task: &FetchTask) -> Result<Vec<ItemRecord>, String> {
        let url = build_listing_url(&self.site, task).map_err(|e| e.to_string())?;
        let document = self
            .fetcher
            .fetch(&url)
            .await
            .map_err(|e: FetchError| e.to_string())?;

        match self.extractor.extract(&document, &task.category) {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::warn!("{}: {}; treating as empty", task, e);
                Ok(Vec::new())
            }
        }
    }
}

/// Fetch stage: at most `width` pages in flight
async fn fetch_pages(
    tasks: mpsc::Receiver<FetchTask>,
    width: usize,
    worker: PageWorker,
    outcomes: mpsc::Sender<PageOutcome>,
    records: mpsc::Sender<ItemRecord>,
    cancel: CancellationToken,
) {
    ReceiverStream::new(tasks)
        .for_each_concurrent(width, |task| {
            let worker = worker.clone();
            let outcomes = outcomes.clone();
            let records = records.clone();
            let cancel = cancel.clone();

            async move {
                let fetched = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = worker.fetch_page(&task) => Some(result),
                };

                let (outcome, extracted) = match fetched {
                    None => (PageOutcome::Abandoned(task), Vec::new()),
                    Some(Ok(extracted)) => (
                        PageOutcome::Fetched {
                            task,
                            cards: extracted.len(),
                        },
                        extracted,
                    ),
                    Some(Err(error)) => (PageOutcome::Failed(PageFailure { task, error }), Vec::new()),
                };

                if outcomes.send(outcome).await.is_err() {
                    tracing::debug!("Dispatcher gone, dropping page outcome");
                }

                for record in extracted {
                    if records.send(record).await.is_err() {
                        tracing::debug!("Processing stage gone, dropping records");
                        break;
                    }
                }
            }
        })
        .await;
}

/// Processing stage: resolves images for up to `width` records at once
async fn process_records(
    records: mpsc::Receiver<ItemRecord>,
    images: Option<ImageResolver>,
    width: usize,
    aggregator: mpsc::Sender<AggregatorMessage>,
) {
    ReceiverStream::new(records)
        .for_each_concurrent(width, |mut record| {
            let images = images.clone();
            let aggregator = aggregator.clone();

            async move {
                let mut image_bytes = None;

                if let (Some(resolver), Some(image)) = (images.as_ref(), record.image.as_ref()) {
                    let resolved = resolver.resolve(&image.thumbnail_url).await;
                    if let Some(error) = &resolved.error {
                        tracing::warn!("Image for {} failed: {}", record.key(), error);
                    }
                    record.image = Some(resolved.image);
                    image_bytes = resolved.bytes;
                }

                let message = AggregatorMessage::Record {
                    record,
                    image_bytes,
                };
                if aggregator.send(message).await.is_err() {
                    tracing::debug!("Aggregator gone, dropping record");
                }
            }
        })
        .await;
}

/// Aggregator: single writer to the sink, runs on a blocking thread
///
/// Keeps draining the channel after a fatal error so upstream stages never
/// block on a full buffer.
fn aggregate<S: Sink>(
    mut sink: S,
    mut messages: mpsc::Receiver<AggregatorMessage>,
    config_hash: &str,
    run_token: CancellationToken,
) -> (S, Aggregate) {
    let mut state = Aggregate::default();

    let fail = |state: &mut Aggregate, error: SinkError| {
        tracing::error!("Fatal sink error: {}", error);
        state.fatal.get_or_insert(error);
        run_token.cancel();
    };

    if let Err(e) = sink.begin_run(config_hash) {
        fail(&mut state, e);
    }

    while let Some(message) = messages.blocking_recv() {
        if state.fatal.is_some() {
            continue;
        }

        match message {
            AggregatorMessage::Record {
                mut record,
                image_bytes,
            } => {
                let key = record.key();

                if let (Some(bytes), Some(image)) = (image_bytes, record.image.as_mut()) {
                    match sink.write_image(&key, image, &bytes) {
                        Ok(path) => image.mark_downloaded(path),
                        Err(e) if e.is_fatal() => {
                            fail(&mut state, e);
                            continue;
                        }
                        Err(e) => {
                            tracing::warn!("Failed to store image for {}: {}", key, e);
                            image.mark_failed();
                        }
                    }
                }

                match sink.write(&record) {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => {
                        fail(&mut state, e);
                        continue;
                    }
                    Err(e) => tracing::warn!("Failed to store {}: {}", key, e),
                }

                state.records.insert(key, record);
            }
            AggregatorMessage::PageFailed(failure) => {
                match sink.record_page_failure(&failure) {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => fail(&mut state, e),
                    Err(e) => tracing::warn!("Failed to record page failure: {}", e),
                }
                state.page_failures.push(failure);
            }
        }
    }

    let status = if state.fatal.is_some() {
        RunStatus::Failed
    } else if run_token.is_cancelled() {
        RunStatus::Interrupted
    } else {
        RunStatus::Completed
    };

    if let Err(e) = sink.finish_run(status) {
        tracing::warn!("Failed to close run: {}", e);
    }

    (sink, state)
}

/// Runs a complete harvest with the SQLite sink and writes the CSV and
/// markdown outputs
///
/// This is the main entry point for a harvest. It will:
/// 1. Open the database and image directory
/// 2. Build the HTTP client
/// 3. Run the pipeline until every category is exhausted or `cancel` fires
/// 4. Write the run's records to CSV (plus one file per category when
///    `per-category` is set) and the run summary to markdown
pub async fn run_harvest(
    config: &Config,
    config_hash: &str,
    cancel: CancellationToken,
) -> Result<(PipelineResult, SqliteSink), HarvestError> {
    let sink = open_sink(config)?;
    let pipeline = Pipeline::from_config(config)?;

    let (result, sink) = pipeline.run(sink, config_hash, cancel).await?;

    let csv_path = Path::new(&config.output.csv_path);
    let written = csv::write_records_csv(csv_path, result.records.values())?;
    tracing::info!("Wrote {} records to {}", written, csv_path.display());

    if config.output.per_category {
        for (path, rows) in csv::write_category_csvs(csv_path, result.records.values())? {
            tracing::info!("Wrote {} records to {}", rows, path.display());
        }
    }

    let summary_path = Path::new(&config.output.summary_path);
    markdown::write_summary(summary_path, &result, config)?;
    tracing::info!("Wrote run summary to {}", summary_path.display());

    Ok((result, sink))
}
