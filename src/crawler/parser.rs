//! Listing card extraction
//!
//! This module turns a fetched listing page into item records. Each listing
//! card yields one record; a card missing any single field, the title
//! included, still yields a record with that field set to the unknown
//! sentinel.

use crate::crawler::fetcher::Document;
use crate::model::{Field, ImageRef, ItemRecord, UNKNOWN};
use crate::url::resolve_link;
use crate::{ConfigError, ExtractError};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Turns a fetched document into zero or more records
///
/// Zero records is a valid answer and marks the end of a category's listing.
pub trait Extractor: Send + Sync {
    fn extract(&self, document: &Document, category: &str) -> Result<Vec<ItemRecord>, ExtractError>;
}

/// CSS selectors locating the parts of a listing card
#[derive(Debug, Clone)]
pub struct CardSelectors {
    pub card: String,
    pub title: String,
    pub score: String,
    pub description: String,
    pub meta: String,
    pub release_date: String,
    pub image_container: String,
}

impl Default for CardSelectors {
    fn default() -> Self {
        Self {
            card: "div.c-finderProductCard".to_string(),
            title: "h3.c-finderProductCard_titleHeading".to_string(),
            score: "div.c-siteReviewScore".to_string(),
            description: "div.c-finderProductCard_description".to_string(),
            meta: "div.c-finderProductCard_meta".to_string(),
            release_date: "span.u-text-uppercase".to_string(),
            image_container: "div.c-finderProductCard_img".to_string(),
        }
    }
}

/// Structural card extractor backed by `scraper`
pub struct CardExtractor {
    card: Selector,
    title: Selector,
    score: Selector,
    description: Selector,
    meta: Selector,
    release_date: Selector,
    image_container: Selector,
    span: Selector,
    link: Selector,
    img: Selector,
}

impl CardExtractor {
    /// Compiles the given selectors
    ///
    /// # Returns
    ///
    /// * `Ok(CardExtractor)` - All selectors compiled
    /// * `Err(ConfigError)` - A selector is not valid CSS
    pub fn new(selectors: &CardSelectors) -> Result<Self, ConfigError> {
        Ok(Self {
            card: compile(&selectors.card)?,
            title: compile(&selectors.title)?,
            score: compile(&selectors.score)?,
            description: compile(&selectors.description)?,
            meta: compile(&selectors.meta)?,
            release_date: compile(&selectors.release_date)?,
            image_container: compile(&selectors.image_container)?,
            span: compile("span")?,
            link: compile("a[href]")?,
            img: compile("img[src]")?,
        })
    }

    fn extract_card(&self, card: ElementRef<'_>, category: &str, page_url: &Url) -> ItemRecord {
        let title = self
            .first_text(card, &self.title)
            .map(|t| strip_rank(&t).to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| {
                tracing::debug!("Untitled card on {}", page_url);
                UNKNOWN.to_string()
            });

        let source_url = card
            .select(&self.link)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| resolve_link(href, page_url))
            .unwrap_or_else(|| page_url.clone());

        let mut record = ItemRecord::new(title, category, source_url.as_str());
        record.score = Field::from_option(self.first_text(card, &self.score));
        record.description = Field::from_option(self.first_text(card, &self.description));

        if let Some(meta) = card.select(&self.meta).next() {
            let release_date = self
                .first_text(meta, &self.release_date)
                .or_else(|| self.first_text(meta, &self.span));
            record.release_date = Field::from_option(release_date);
            record.rating = Field::from_option(self.rating(meta));
        }

        record.image = self.thumbnail(card, page_url).map(|url| ImageRef::pending(url.as_str()));

        record
    }

    /// The meta span mentioning a rating, with the `Rated` label removed
    fn rating(&self, meta: ElementRef<'_>) -> Option<String> {
        meta.select(&self.span)
            .map(element_text)
            .find(|text| text.contains("Rated"))
            .map(|text| text.replacen("Rated", "", 1).trim().to_string())
    }

    /// First usable `img` in the image container, else anywhere in the card
    fn thumbnail(&self, card: ElementRef<'_>, page_url: &Url) -> Option<Url> {
        let in_container = card
            .select(&self.image_container)
            .flat_map(|container| container.select(&self.img))
            .filter_map(|img| usable_image(img, page_url))
            .next();

        in_container.or_else(|| {
            card.select(&self.img)
                .filter_map(|img| usable_image(img, page_url))
                .next()
        })
    }

    fn first_text(&self, scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
        scope
            .select(selector)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
    }
}

impl Extractor for CardExtractor {
    fn extract(&self, document: &Document, category: &str) -> Result<Vec<ItemRecord>, ExtractError> {
        if document.body.trim().is_empty() {
            return Err(ExtractError::MalformedDocument(format!(
                "empty body from {}",
                document.url
            )));
        }

        let html = Html::parse_document(&document.body);
        let records: Vec<ItemRecord> = html
            .select(&self.card)
            .map(|card| self.extract_card(card, category, &document.url))
            .collect();

        tracing::trace!("Extracted {} records from {}", records.len(), document.url);
        Ok(records)
    }
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector)
        .map_err(|e| ConfigError::Validation(format!("invalid selector '{}': {}", selector, e)))
}

/// Text content with whitespace runs collapsed to single spaces
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strips a leading ranking numeral such as `"12. "`
fn strip_rank(title: &str) -> &str {
    let rest = title.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == title.len() {
        return title;
    }
    match rest.strip_prefix('.') {
        Some(rest) => rest.trim_start(),
        None => title,
    }
}

/// Resolves an `img` to an absolute URL, skipping vector badges
fn usable_image(img: ElementRef<'_>, page_url: &Url) -> Option<Url> {
    let src = img.value().attr("src")?;
    let url = resolve_link(src, page_url)?;
    if url.path().to_ascii_lowercase().ends_with(".svg") {
        return None;
    }
    Some(url)
}
