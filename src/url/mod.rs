//! URL handling for listing pages and card links
//!
//! Listing pages are addressed as `<base-url>?<category-param>=<key>&<page-param>=<n>`.
//! Links found inside cards are resolved against the page they came from.

use crate::config::SiteConfig;
use crate::model::FetchTask;
use url::Url;

/// Builds the URL of one listing page
///
/// # Example
///
/// ```
/// use catalog_harvest::config::SiteConfig;
/// use catalog_harvest::model::FetchTask;
/// use catalog_harvest::url::build_listing_url;
///
/// let site = SiteConfig::default();
/// let url = build_listing_url(&site, &FetchTask::new("ps5", 2)).unwrap();
/// assert_eq!(url.query(), Some("platform=ps5&page=2"));
/// ```
pub fn build_listing_url(site: &SiteConfig, task: &FetchTask) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&site.base_url)?;
    url.query_pairs_mut()
        .append_pair(&site.category_param, &task.category)
        .append_pair(&site.page_param, &task.page.to_string());
    Ok(url)
}

/// Resolves an href or src attribute to an absolute http(s) URL
///
/// Returns None for empty values, fragment-only links, `javascript:`,
/// `mailto:`, `tel:` and `data:` URIs, and anything that does not resolve
/// to http or https.
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    match absolute_url.scheme() {
        "http" | "https" => Some(absolute_url),
        _ => None,
    }
}
