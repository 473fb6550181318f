//! HTML preprocessing for fetched pages.
//!
//! A captured web page should render offline once decoded, so every `<img>`
//! is replaced with a `data:` URI. Images are shrunk to at most
//! [`JPEG_MAX_WIDTH`] pixels wide and re-encoded as low-quality JPEG to keep
//! the QR count down. An image that cannot be fetched is dropped from the
//! page with a warning; it never aborts the run.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::stream::{self, StreamExt};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Widest inlined image, in pixels.
pub const JPEG_MAX_WIDTH: u32 = 300;
/// JPEG quality used for inlined images.
pub const JPEG_QUALITY: u8 = 40;
/// Prefix added to every fetched page.
pub const DOCTYPE: &str = "<!DOCTYPE html>\n";

/// Parallel image downloads.
const IMAGE_FETCH_CONCURRENCY: usize = 4;

static RE_IMG_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*>").unwrap());

static RE_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap()
});

/// Prepare a fetched page for encoding: optionally inline its images, then
/// prepend the doctype.
///
/// Without inlining the fetched bytes are kept as they are. Inlining works on
/// text, so invalid UTF-8 is replaced (with a warning) only in that case.
pub async fn prepare_page(
    html: &[u8],
    base_url: &str,
    inline_images: bool,
    image_timeout_secs: u64,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(DOCTYPE.len() + html.len());
    out.extend_from_slice(DOCTYPE.as_bytes());

    if !inline_images {
        out.extend_from_slice(html);
        return out;
    }

    let text = String::from_utf8_lossy(html);
    if let Cow::Owned(_) = text {
        warn!(
            "'{}' is not valid UTF-8; invalid bytes replaced before inlining images",
            base_url
        );
    }
    let body = inline_page_images(&text, base_url, image_timeout_secs).await;
    out.extend_from_slice(body.as_bytes());
    out
}

/// Replace every `<img src>` with a data URI, removing tags whose image
/// cannot be fetched.
pub async fn inline_page_images(html: &str, base_url: &str, timeout_secs: u64) -> String {
    let sources: Vec<String> = {
        let mut seen = Vec::new();
        for tag in RE_IMG_TAG.find_iter(html) {
            if let Some(src) = img_src(tag.as_str()) {
                if !is_inlined(src) && !seen.iter().any(|s| s == src) {
                    seen.push(src.to_string());
                }
            }
        }
        seen
    };
    if sources.is_empty() {
        return html.to_string();
    }
    info!("Inlining {} image(s)", sources.len());

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            warn!("Cannot build HTTP client for images, removing them: {}", e);
            return rewrite_tags(html, &HashMap::new());
        }
    };

    let fetched: HashMap<String, Option<String>> = stream::iter(sources)
        .map(|src| {
            let client = client.clone();
            async move {
                let uri = fetch_data_uri(&client, base_url, &src).await;
                (src, uri)
            }
        })
        .buffer_unordered(IMAGE_FETCH_CONCURRENCY)
        .collect()
        .await;

    rewrite_tags(html, &fetched)
}

fn img_src(tag: &str) -> Option<&str> {
    let caps = RE_SRC.captures(tag)?;
    let src = caps.get(1).or(caps.get(2)).or(caps.get(3))?.as_str().trim();
    (!src.is_empty()).then_some(src)
}

fn is_inlined(src: &str) -> bool {
    src.len() >= 5 && src[..5].eq_ignore_ascii_case("data:")
}

/// Substitute each tag's `src` from `uris`; a missing or `None` entry drops
/// the tag. Tags without a `src`, or already inlined, are left alone.
fn rewrite_tags(html: &str, uris: &HashMap<String, Option<String>>) -> String {
    RE_IMG_TAG
        .replace_all(html, |caps: &regex::Captures<'_>| {
            let tag = &caps[0];
            let Some(src) = img_src(tag) else {
                return tag.to_string();
            };
            if is_inlined(src) {
                return tag.to_string();
            }
            match uris.get(src) {
                Some(Some(uri)) => RE_SRC
                    .replace(tag, |_: &regex::Captures<'_>| format!("src=\"{uri}\""))
                    .into_owned(),
                _ => String::new(),
            }
        })
        .into_owned()
}

async fn fetch_data_uri(client: &reqwest::Client, base_url: &str, src: &str) -> Option<String> {
    let url = match reqwest::Url::parse(base_url).and_then(|base| base.join(src)) {
        Ok(u) => u,
        Err(e) => {
            warn!("Removing image '{}': cannot resolve URL: {}", src, e);
            return None;
        }
    };

    let response = match client.get(url.clone()).send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            warn!("Removing image {}: HTTP {}", url, r.status());
            return None;
        }
        Err(e) => {
            warn!("Removing image {}: {}", url, e);
            return None;
        }
    };
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = match response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            warn!("Removing image {}: {}", url, e);
            return None;
        }
    };

    let (data, mime) = downscale(&bytes).unwrap_or_else(|| {
        debug!("Image {} not decodable, inlining as-is", url);
        (
            bytes.to_vec(),
            content_type.unwrap_or_else(|| "image/png".to_string()),
        )
    });
    debug!("Inlined {} ({} bytes)", url, data.len());
    Some(format!("data:{};base64,{}", mime, STANDARD.encode(&data)))
}

/// Shrink to [`JPEG_MAX_WIDTH`] and re-encode as JPEG. `None` if the bytes
/// are not an image format this build can decode.
pub fn downscale(bytes: &[u8]) -> Option<(Vec<u8>, String)> {
    let img = image::load_from_memory(bytes).ok()?;
    let width = img.width().min(JPEG_MAX_WIDTH).max(1);
    let height = ((img.height() as u64 * width as u64) / img.width().max(1) as u64).max(1) as u32;
    let resized = img.resize_exact(width, height, FilterType::Lanczos3);

    let mut out = Vec::new();
    DynamicImage::ImageRgb8(resized.to_rgb8())
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))
        .ok()?;
    Some((out, "image/jpeg".to_string()))
}
