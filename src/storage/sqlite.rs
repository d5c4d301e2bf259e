//! SQLite sink implementation
//!
//! Records go to an `items` table keyed by `(category, title)`. Images go to
//! `<image_dir>/<category>/<title>.jpg` on disk, with the path stored on the row.

use crate::model::{Field, FetchTask, ImageRef, ImageStatus, ItemRecord, PageFailure, RecordKey};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Sink, SinkError, SinkResult};
use crate::storage::{RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Longest file stem written for an image
const MAX_STEM_CHARS: usize = 100;

const RECORD_COLUMNS: &str = "category, title, score, description, release_date, rating, \
     source_url, image_original_url, image_thumbnail_url, image_local_path, image_status";

/// SQLite-backed sink
pub struct SqliteSink {
    conn: Connection,
    image_dir: PathBuf,
    run_id: Option<i64>,
}

impl SqliteSink {
    /// Opens or creates the database at `path`
    ///
    /// Missing parent directories are created.
    pub fn new(path: &Path, image_dir: impl Into<PathBuf>) -> SinkResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn,
            image_dir: image_dir.into(),
            run_id: None,
        })
    }

    /// Creates a sink over an in-memory database
    ///
    /// Images still go to `image_dir` on disk.
    pub fn new_in_memory(image_dir: impl Into<PathBuf>) -> SinkResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            image_dir: image_dir.into(),
            run_id: None,
        })
    }

    /// Id of the run opened by `begin_run`, if any
    pub fn run_id(&self) -> Option<i64> {
        self.run_id
    }

    // ===== Runs =====

    pub fn get_run(&self, run_id: i64) -> SinkResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                row_to_run,
            )
            .optional()?
            .ok_or(SinkError::RunNotFound(run_id))
    }

    pub fn get_latest_run(&self) -> SinkResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    // ===== Records =====

    /// Loads every stored record, ordered by category then title
    pub fn load_records(&self) -> SinkResult<Vec<ItemRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM items ORDER BY category, title",
            RECORD_COLUMNS
        ))?;

        let records = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    pub fn get_record(&self, key: &RecordKey) -> SinkResult<Option<ItemRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM items WHERE category = ?1 AND title = ?2",
                    RECORD_COLUMNS
                ),
                params![key.category, key.title],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    pub fn count_records(&self) -> SinkResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn count_by_category(&self) -> SinkResult<BTreeMap<String, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT category, COUNT(*) FROM items GROUP BY category")?;

        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(counts)
    }

    /// Counts records by image status; records without an image count under `None`
    pub fn count_by_image_status(&self) -> SinkResult<BTreeMap<Option<String>, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT image_status, COUNT(*) FROM items GROUP BY image_status")?;

        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(counts)
    }

    /// Loads recorded page failures, for one run or for all runs
    pub fn load_page_failures(&self, run_id: Option<i64>) -> SinkResult<Vec<PageFailure>> {
        let mut stmt = self.conn.prepare(
            "SELECT category, page, error FROM page_failures
             WHERE ?1 IS NULL OR run_id = ?1
             ORDER BY id",
        )?;

        let failures = stmt
            .query_map(params![run_id], |row| {
                Ok(PageFailure {
                    task: FetchTask::new(row.get::<_, String>(0)?, row.get::<_, u32>(1)?),
                    error: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(failures)
    }

    /// Path an image for `key` is written to
    pub fn image_path(&self, key: &RecordKey) -> PathBuf {
        self.image_dir
            .join(safe_component(&key.category))
            .join(format!("{}.jpg", safe_component(&key.title)))
    }
}

impl Sink for SqliteSink {
    fn write(&mut self, record: &ItemRecord) -> SinkResult<()> {
        let now = Utc::now().to_rfc3339();
        let image = record.image.as_ref();

        self.conn.execute(
            "INSERT INTO items (
                category, title, score, description, release_date, rating, source_url,
                image_original_url, image_thumbnail_url, image_local_path, image_status,
                first_seen_run, last_seen_run, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12, ?13)
            ON CONFLICT(category, title) DO UPDATE SET
                score = excluded.score,
                description = excluded.description,
                release_date = excluded.release_date,
                rating = excluded.rating,
                source_url = excluded.source_url,
                image_original_url = excluded.image_original_url,
                image_thumbnail_url = excluded.image_thumbnail_url,
                image_local_path = excluded.image_local_path,
                image_status = excluded.image_status,
                last_seen_run = excluded.last_seen_run,
                updated_at = excluded.updated_at",
            params![
                record.category,
                record.title,
                record.score.as_deref(),
                record.description.as_deref(),
                record.release_date.as_deref(),
                record.rating.as_deref(),
                record.source_url,
                image.map(|i| i.original_url.as_str()),
                image.map(|i| i.thumbnail_url.as_str()),
                image
                    .and_then(|i| i.local_path.as_ref())
                    .map(|p| p.to_string_lossy().into_owned()),
                image.map(|i| i.status.to_db_string()),
                self.run_id,
                now,
            ],
        )?;

        Ok(())
    }

    fn write_image(&mut self, key: &RecordKey, _image: &ImageRef, bytes: &[u8]) -> SinkResult<PathBuf> {
        let path = self.image_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write then rename so a crash never leaves a truncated image behind
        let partial = path.with_extension("jpg.part");
        fs::write(&partial, bytes)?;
        fs::rename(&partial, &path)?;

        Ok(path)
    }

    fn begin_run(&mut self, config_hash: &str) -> SinkResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        self.run_id = Some(self.conn.last_insert_rowid());
        Ok(())
    }

    fn record_page_failure(&mut self, failure: &PageFailure) -> SinkResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO page_failures (run_id, category, page, error, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.run_id,
                failure.task.category,
                failure.task.page,
                failure.error,
                now
            ],
        )?;
        Ok(())
    }

    fn finish_run(&mut self, status: RunStatus) -> SinkResult<()> {
        let Some(run_id) = self.run_id else {
            return Ok(());
        };

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        Ok(())
    }
}

/// Reduces a title or category to a safe file name component
///
/// Keeps alphanumerics, spaces, `-` and `_`, truncated to 100 characters.
/// Text with nothing left falls back to a hash of the original.
pub fn safe_component(text: &str) -> String {
    let kept: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let stem: String = kept.trim().chars().take(MAX_STEM_CHARS).collect();
    let stem = stem.trim_end().to_string();

    if stem.is_empty() {
        let digest = Sha256::digest(text.as_bytes());
        hex::encode(&digest[..8])
    } else {
        stem
    }
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Running),
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ItemRecord> {
    let mut record = ItemRecord::new(
        row.get::<_, String>(1)?,
        row.get::<_, String>(0)?,
        row.get::<_, String>(6)?,
    );
    record.score = Field::from_option(row.get(2)?);
    record.description = Field::from_option(row.get(3)?);
    record.release_date = Field::from_option(row.get(4)?);
    record.rating = Field::from_option(row.get(5)?);

    let thumbnail: Option<String> = row.get(8)?;
    record.image = thumbnail.map(|thumbnail_url| -> rusqlite::Result<ImageRef> {
        let original_url: Option<String> = row.get(7)?;
        let status: Option<String> = row.get(10)?;
        Ok(ImageRef {
            original_url: original_url.unwrap_or_else(|| thumbnail_url.clone()),
            thumbnail_url,
            local_path: row.get::<_, Option<String>>(9)?.map(PathBuf::from),
            status: status
                .as_deref()
                .and_then(ImageStatus::from_db_string)
                .unwrap_or(ImageStatus::Pending),
        })
    })
    .transpose()?;

    Ok(record)
}
