//! Cover image resolution
//!
//! Listing thumbnails are served through a resize proxy
//! (`/a/img/resize/<params>/catalog/...`). The full-size asset lives at the
//! same path without the proxy segment (`/a/img/catalog/...`). The resolver
//! rewrites the URL, fetches the full-size asset, falls back to the thumbnail
//! when that fails, and normalizes whatever it got to a baseline JPEG.

use crate::crawler::fetcher::Fetcher;
use crate::model::{ImageRef, ImageStatus};
use crate::ImageError;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use regex::Regex;
use std::sync::OnceLock;

fn resize_segment() -> &'static Regex {
    static RESIZE_SEGMENT: OnceLock<Regex> = OnceLock::new();
    RESIZE_SEGMENT
        .get_or_init(|| Regex::new(r"/a/img/resize/[^/]+/catalog/").expect("resize segment regex"))
}

/// Derives the full-size asset URL from a resize-proxy thumbnail URL
///
/// URLs that do not carry the resize segment are returned unchanged.
///
/// # Example
///
/// ```
/// use catalog_harvest::crawler::canonical_image_url;
///
/// assert_eq!(
///     canonical_image_url("https://site/a/img/resize/XYZ/catalog/foo.jpg"),
///     "https://site/a/img/catalog/foo.jpg"
/// );
/// ```
pub fn canonical_image_url(thumbnail_url: &str) -> String {
    resize_segment()
        .replace(thumbnail_url, "/a/img/catalog/")
        .into_owned()
}

/// Outcome of resolving one thumbnail
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    /// Reference carrying the canonical URL and final status
    pub image: ImageRef,

    /// Normalized JPEG bytes, present only when resolution succeeded
    pub bytes: Option<Vec<u8>>,

    /// Why the image degraded to `Failed`
    pub error: Option<ImageError>,
}

impl ResolvedImage {
    fn failed(mut image: ImageRef, error: ImageError) -> Self {
        image.mark_failed();
        Self {
            image,
            bytes: None,
            error: Some(error),
        }
    }
}

/// Fetches and normalizes cover images
#[derive(Clone)]
pub struct ImageResolver {
    fetcher: Fetcher,
    jpeg_quality: u8,
}

impl ImageResolver {
    pub fn new(fetcher: Fetcher, jpeg_quality: u8) -> Self {
        Self {
            fetcher,
            jpeg_quality,
        }
    }

    /// Resolves a thumbnail into a normalized image
    ///
    /// Never fails outright: fetch and decode problems are reported through
    /// `ResolvedImage::error` with the image marked `Failed`. On success the
    /// image stays `Pending` until the sink has written the bytes.
    pub async fn resolve(&self, thumbnail_url: &str) -> ResolvedImage {
        let canonical = canonical_image_url(thumbnail_url);
        let mut image = ImageRef::pending(thumbnail_url);
        image.original_url = canonical.clone();

        let raw = match self.fetcher.fetch_bytes(&canonical).await {
            Ok(bytes) => bytes,
            Err(canonical_error) if canonical != thumbnail_url => {
                tracing::debug!(
                    "Canonical image {} failed ({}), falling back to thumbnail",
                    canonical,
                    canonical_error
                );
                match self.fetcher.fetch_bytes(thumbnail_url).await {
                    Ok(bytes) => bytes,
                    Err(e) => return ResolvedImage::failed(image, ImageError::FetchFailed(e)),
                }
            }
            Err(e) => return ResolvedImage::failed(image, ImageError::FetchFailed(e)),
        };

        let quality = self.jpeg_quality;
        let normalized = tokio::task::spawn_blocking(move || normalize_image(&raw, quality)).await;

        match normalized {
            Ok(Ok(bytes)) => {
                debug_assert_eq!(image.status, ImageStatus::Pending);
                ResolvedImage {
                    image,
                    bytes: Some(bytes),
                    error: None,
                }
            }
            Ok(Err(e)) => ResolvedImage::failed(image, e),
            Err(join_error) => ResolvedImage::failed(
                image,
                ImageError::DecodeFailed(format!("decoder task failed: {}", join_error)),
            ),
        }
    }
}

/// Decodes any supported format and re-encodes it as RGB JPEG
///
/// Converting to RGB8 drops alpha, and re-encoding from raw pixels drops
/// EXIF, ICC and any other embedded metadata.
pub fn normalize_image(raw: &[u8], quality: u8) -> Result<Vec<u8>, ImageError> {
    let decoded = image::load_from_memory(raw).map_err(|e| ImageError::DecodeFailed(e.to_string()))?;
    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());

    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_with_alpha() -> Vec<u8> {
        let img = RgbaImage::from_pixel(4, 3, Rgba([200, 10, 10, 128]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_canonical_rewrites_resize_segment() {
        assert_eq!(
            canonical_image_url("https://site/a/img/resize/XYZ/catalog/foo.jpg"),
            "https://site/a/img/catalog/foo.jpg"
        );
        assert_eq!(
            canonical_image_url(
                "https://www.example.com/a/img/resize/abc/catalog/provider/6/3/6-1.jpg?auto=webp"
            ),
            "https://www.example.com/a/img/catalog/provider/6/3/6-1.jpg?auto=webp"
        );
    }

    #[test]
    fn test_canonical_leaves_other_urls_unchanged() {
        let url = "https://cdn.example.com/images/foo-250x250.jpg";
        assert_eq!(canonical_image_url(url), url);
        let nested = "https://site/a/img/resize/X/Y/catalog/foo.jpg";
        assert_eq!(canonical_image_url(nested), nested);
    }

    #[test]
    fn test_normalize_png_to_jpeg() {
        let jpeg = normalize_image(&png_with_alpha(), 95).unwrap();

        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        let result = normalize_image(b"<html>not an image</html>", 95);
        assert!(matches!(result, Err(ImageError::DecodeFailed(_))));
    }
}
