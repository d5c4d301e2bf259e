//! Shared fixtures: listing markup, images and configs pointed at a mock server

use catalog_harvest::config::Config;
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const LISTING_PATH: &str = "/browse/game/";

/// One listing card; `slug` names both the detail link and the thumbnail
pub fn card(title: &str, slug: &str) -> String {
    format!(
        r#"<div class="c-finderProductCard">
             <a href="/game/{slug}/">
               <div class="c-finderProductCard_img">
                 <img src="/a/img/resize/abc123/catalog/{slug}.png" alt="{title}">
               </div>
               <h3 class="c-finderProductCard_titleHeading">1. {title}</h3>
               <div class="c-finderProductCard_meta">
                 <span class="u-text-uppercase">Sep 17, 2020</span>
                 <span>Rated M</span>
               </div>
               <div class="c-finderProductCard_description">A game about {title}.</div>
               <div class="c-siteReviewScore">93</div>
             </a>
           </div>"#
    )
}

pub fn listing(cards: &[String]) -> String {
    format!(
        "<html><body><div class=\"c-productListings\">{}</div></body></html>",
        cards.concat()
    )
}

pub fn png_bytes() -> Vec<u8> {
    let img = RgbaImage::from_pixel(8, 6, Rgba([30, 140, 200, 180]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Serves `body` for one `(platform, page)` listing request
pub async fn mount_page(server: &MockServer, platform: &str, page: u32, body: String) {
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("platform", platform))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Serves an empty listing for every page not mounted before this call
pub async fn mount_empty_fallback(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[])))
        .mount(server)
        .await;
}

/// Serves the resize-proxy thumbnail for `slug`
pub async fn mount_thumbnail(server: &MockServer, slug: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/a/img/resize/abc123/catalog/{}.png", slug)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
        .mount(server)
        .await;
}

/// Config harvesting `categories` from `server`, writing under `dir`
pub fn test_config(server: &MockServer, dir: &Path, categories: &[&str]) -> Config {
    let mut config = Config::default();
    config.categories = categories.iter().map(|c| c.to_string()).collect();
    config.site.base_url = format!("{}{}", server.uri(), LISTING_PATH);
    config.pipeline.concurrency = 1;
    config.pipeline.max_attempts = 2;
    config.pipeline.backoff_base_ms = 1;
    config.pipeline.backoff_max_ms = 10;
    config.pipeline.request_timeout_ms = 5_000;
    config.images.directory = dir.join("images").display().to_string();
    config.output.database_path = dir.join("harvest.db").display().to_string();
    config.output.csv_path = dir.join("games.csv").display().to_string();
    config.output.summary_path = dir.join("summary.md").display().to_string();
    config
}
