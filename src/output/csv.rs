//! CSV export of item records

use super::OutputResult;
use crate::model::{ItemRecord, UNKNOWN};
use crate::storage::safe_component;
use csv::WriterBuilder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Column order of every CSV export
pub const CSV_HEADER: [&str; 9] = [
    "title",
    "category",
    "score",
    "description",
    "release_date",
    "rating",
    "source_url",
    "image_local_path",
    "image_status",
];

/// CSV row for one record; unknown fields render as `N/A`
#[derive(Debug, Serialize)]
struct ItemRow<'a> {
    title: &'a str,
    category: &'a str,
    score: &'a str,
    description: &'a str,
    release_date: &'a str,
    rating: &'a str,
    source_url: &'a str,
    image_local_path: String,
    image_status: &'a str,
}

impl<'a> From<&'a ItemRecord> for ItemRow<'a> {
    fn from(record: &'a ItemRecord) -> Self {
        let image = record.image.as_ref();
        Self {
            title: &record.title,
            category: &record.category,
            score: record.score.as_str(),
            description: record.description.as_str(),
            release_date: record.release_date.as_str(),
            rating: record.rating.as_str(),
            source_url: &record.source_url,
            image_local_path: image
                .and_then(|i| i.local_path.as_ref())
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            image_status: image.map(|i| i.status.to_db_string()).unwrap_or(UNKNOWN),
        }
    }
}

/// Writes records as CSV to any writer
///
/// The header is always written, even for zero records.
///
/// # Returns
///
/// The number of records written
pub fn write_records<'a, W, I>(writer: W, records: I) -> OutputResult<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a ItemRecord>,
{
    let mut csv = WriterBuilder::new().has_headers(false).from_writer(writer);
    csv.write_record(CSV_HEADER)?;

    let mut written = 0;
    for record in records {
        csv.serialize(ItemRow::from(record))?;
        written += 1;
    }

    csv.flush()?;
    Ok(written)
}

/// Writes records as CSV to `path`, replacing any existing file
///
/// Missing parent directories are created.
pub fn write_records_csv<'a, P, I>(path: P, records: I) -> OutputResult<usize>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a ItemRecord>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    debug!("Writing CSV export to {}", path.display());
    let file = BufWriter::new(File::create(path)?);
    write_records(file, records)
}

/// Path of the per-category file derived from the combined CSV path
///
/// `out/games.csv` and `xbox-one` give `out/games_xbox-one.csv`.
pub fn category_csv_path(csv_path: &Path, category: &str) -> PathBuf {
    let stem = csv_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "records".to_string());
    csv_path.with_file_name(format!("{}_{}.csv", stem, safe_component(category)))
}

/// Writes one CSV per category that produced records
///
/// Returns each written path with its row count, in category order.
pub fn write_category_csvs<'a, I>(csv_path: &Path, records: I) -> OutputResult<Vec<(PathBuf, usize)>>
where
    I: IntoIterator<Item = &'a ItemRecord>,
{
    let mut by_category: BTreeMap<&str, Vec<&ItemRecord>> = BTreeMap::new();
    for record in records {
        by_category.entry(record.category.as_str()).or_default().push(record);
    }

    let mut written = Vec::with_capacity(by_category.len());
    for (category, records) in by_category {
        let path = category_csv_path(csv_path, category);
        let rows = write_records_csv(&path, records)?;
        written.push((path, rows));
    }
    Ok(written)
}
