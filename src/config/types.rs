use serde::Deserialize;

/// Platforms harvested when the config names none
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "ps5",
    "ps4",
    "xbox-series-x",
    "xbox-one",
    "switch",
    "pc",
    "wii-u",
    "3ds",
];

/// Main configuration structure for Catalog-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            site: SiteConfig::default(),
            images: ImagesConfig::default(),
            output: OutputConfig::default(),
            categories: default_categories(),
        }
    }
}

/// Worker pool, retry and pagination behavior
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Number of page-fetch workers
    #[serde(rename = "concurrency", default = "default_concurrency")]
    pub concurrency: u32,

    /// Number of records whose images are processed at once
    #[serde(rename = "image-concurrency", default = "default_image_concurrency")]
    pub image_concurrency: u32,

    /// Optional hard cap on pages per category
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<u32>,

    /// Consecutive failed pages after which a category is abandoned
    #[serde(
        rename = "max-consecutive-failures",
        default = "default_max_consecutive_failures"
    )]
    pub max_consecutive_failures: u32,

    /// Total attempts per request, including the first
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay (milliseconds), doubled per attempt
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound on any retry delay (milliseconds)
    #[serde(rename = "backoff-max-ms", default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Per-attempt request timeout (milliseconds)
    #[serde(rename = "request-timeout-ms", default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            image_concurrency: default_image_concurrency(),
            max_pages: None,
            max_consecutive_failures: default_max_consecutive_failures(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Target site description
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Listing endpoint, without query string
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// Query parameter carrying the category key
    #[serde(rename = "category-param", default = "default_category_param")]
    pub category_param: String,

    /// Query parameter carrying the 1-based page number
    #[serde(rename = "page-param", default = "default_page_param")]
    pub page_param: String,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            category_param: default_category_param(),
            page_param: default_page_param(),
            user_agent: default_user_agent(),
        }
    }
}

/// Cover image handling
#[derive(Debug, Clone, Deserialize)]
pub struct ImagesConfig {
    /// Whether cover images are downloaded at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Root directory for normalized images
    #[serde(default = "default_images_dir")]
    pub directory: String,

    /// JPEG quality used when re-encoding (1-100)
    #[serde(rename = "jpeg-quality", default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_images_dir(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    /// Path to the CSV export written after each run
    #[serde(rename = "csv-path", default = "default_csv_path")]
    pub csv_path: String,

    /// Path to the markdown summary file
    #[serde(rename = "summary-path", default = "default_summary_path")]
    pub summary_path: String,

    /// Also write one `<stem>_<category>.csv` per category next to the CSV
    #[serde(rename = "per-category", default)]
    pub per_category: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            csv_path: default_csv_path(),
            summary_path: default_summary_path(),
            per_category: false,
        }
    }
}

fn default_categories() -> Vec<String> {
    DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
}

fn default_concurrency() -> u32 {
    3
}

fn default_image_concurrency() -> u32 {
    5
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    8_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_base_url() -> String {
    "https://www.metacritic.com/browse/game/".to_string()
}

fn default_category_param() -> String {
    "platform".to_string()
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}

fn default_true() -> bool {
    true
}

fn default_images_dir() -> String {
    "images".to_string()
}

fn default_jpeg_quality() -> u8 {
    95
}

fn default_database_path() -> String {
    "./harvest.db".to_string()
}

fn default_csv_path() -> String {
    "./games.csv".to_string()
}

fn default_summary_path() -> String {
    "./summary.md".to_string()
}
