//! Core data model shared by the extractor, image resolver, pipeline and sink

use std::fmt;
use std::path::PathBuf;

/// Text rendered for a field that was absent from the listing card
pub const UNKNOWN: &str = "N/A";

/// An extracted text field that may be absent
///
/// `Unknown` marks a field the card did not carry. An extracted value that is
/// empty after cleaning is also `Unknown`, so `Known` never holds an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Field {
    Known(String),
    #[default]
    Unknown,
}

impl Field {
    /// Builds a field from cleaned text, mapping empty text to `Unknown`
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            Self::Unknown
        } else {
            Self::Known(text)
        }
    }

    /// Builds a field from an optional value
    pub fn from_option(value: Option<String>) -> Self {
        value.map(Self::from_text).unwrap_or(Self::Unknown)
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    pub fn as_deref(&self) -> Option<&str> {
        match self {
            Self::Known(value) => Some(value),
            Self::Unknown => None,
        }
    }

    /// Renders the field for tabular output
    pub fn as_str(&self) -> &str {
        self.as_deref().unwrap_or(UNKNOWN)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Download state of a record's cover image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageStatus {
    Pending,
    Downloaded,
    Failed,
}

impl ImageStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloaded => "downloaded",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "downloaded" => Some(Self::Downloaded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Reference to a record's cover image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Canonical (non-thumbnail) URL of the asset; equals the thumbnail
    /// URL until the image has been resolved
    pub original_url: String,

    /// Listing thumbnail the canonical URL was derived from
    pub thumbnail_url: String,

    /// Where the normalized image was written, once written
    pub local_path: Option<PathBuf>,

    pub status: ImageStatus,
}

impl ImageRef {
    /// Unresolved reference to a listing thumbnail
    pub fn pending(thumbnail_url: impl Into<String>) -> Self {
        let thumbnail_url = thumbnail_url.into();
        Self {
            original_url: thumbnail_url.clone(),
            thumbnail_url,
            local_path: None,
            status: ImageStatus::Pending,
        }
    }

    pub fn mark_downloaded(&mut self, path: PathBuf) {
        self.local_path = Some(path);
        self.status = ImageStatus::Downloaded;
    }

    pub fn mark_failed(&mut self) {
        self.local_path = None;
        self.status = ImageStatus::Failed;
    }
}

/// Dedup key of a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub category: String,
    pub title: String,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.title)
    }
}

/// One listing card, as extracted and enriched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub title: String,
    pub category: String,
    pub score: Field,
    pub description: Field,
    pub release_date: Field,
    pub rating: Field,

    /// Card detail link, or the listing page when the card has none
    pub source_url: String,

    pub image: Option<ImageRef>,
}

impl ItemRecord {
    /// Creates a record with every optional field unknown
    pub fn new(
        title: impl Into<String>,
        category: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
            score: Field::Unknown,
            description: Field::Unknown,
            release_date: Field::Unknown,
            rating: Field::Unknown,
            source_url: source_url.into(),
            image: None,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            category: self.category.clone(),
            title: self.title.clone(),
        }
    }

    pub fn image_status(&self) -> Option<ImageStatus> {
        self.image.as_ref().map(|image| image.status)
    }
}

/// One page of one category to fetch
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FetchTask {
    pub category: String,
    pub page: u32,
}

impl FetchTask {
    pub fn new(category: impl Into<String>, page: u32) -> Self {
        debug_assert!(page >= 1, "pages are 1-based");
        Self {
            category: category.into(),
            page,
        }
    }
}

impl fmt::Display for FetchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} page {}", self.category, self.page)
    }
}

/// A page that could not be fetched or extracted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    pub task: FetchTask,
    pub error: String,
}

impl fmt::Display for PageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.task, self.error)
    }
}
