//! Heuristic media URL extraction.
//!
//! Pure function from HTML + base URL to an ordered, deduplicated list of
//! playable media URLs (`.mp4`/`.m3u8`). No I/O: player markup, raw-markup
//! regex scans, and a scan over the visible text are all tried, in that
//! order, so a URL hidden in an inline script or printed as plain text is
//! found even when the player elements are obfuscated.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

static MEDIA_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s'"<>]+?\.(?:m3u8|mp4)(?:\?[^\s'"<>]+)?"#)
        .expect("media URL pattern should compile")
});

static PROTOCOL_RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"//[^\s'"<>]+?\.(?:m3u8|mp4)(?:\?[^\s'"<>]+)?"#)
        .expect("protocol-relative pattern should compile")
});

static SOURCE_SRC: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("source[src]").expect("valid selector"));
static VIDEO_SRC: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("video[src]").expect("valid selector"));
static IFRAME_SRC: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("iframe[src]").expect("valid selector"));

/// Extract playable media URLs from a page.
///
/// Candidates are collected from `source`/`video`/`iframe` elements, then
/// from regex scans over the raw markup (absolute and protocol-relative
/// forms), then from the tag-stripped visible text. Protocol-relative URLs
/// are normalized to `https:`, relative paths are resolved against
/// `base_url`, and only URLs containing `.mp4` or `.m3u8` survive. Output
/// preserves first-seen order with exact-string duplicates removed.
#[must_use]
pub fn extract_media_urls(html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut candidates: Vec<String> = Vec::new();

    for selector in [&*SOURCE_SRC, &*VIDEO_SRC, &*IFRAME_SRC] {
        for element in document.select(selector) {
            if let Some(src) = element.value().attr("src") {
                candidates.push(src.to_string());
            }
        }
    }

    for found in MEDIA_URL.find_iter(html) {
        candidates.push(found.as_str().to_string());
    }
    for found in PROTOCOL_RELATIVE.find_iter(html) {
        candidates.push(found.as_str().to_string());
    }

    let visible: String = document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    for found in MEDIA_URL.find_iter(&visible) {
        candidates.push(found.as_str().to_string());
    }

    let base = Url::parse(base_url).ok();
    let mut seen: HashSet<String> = HashSet::new();
    let mut result: Vec<String> = Vec::new();
    for candidate in candidates {
        let Some(absolute) = normalize(&candidate, base.as_ref()) else {
            continue;
        };
        if !(absolute.contains(".mp4") || absolute.contains(".m3u8")) {
            continue;
        }
        if seen.insert(absolute.clone()) {
            result.push(absolute);
        }
    }
    result
}

/// Normalize one raw candidate to an absolute URL.
fn normalize(raw: &str, base: Option<&Url>) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    if let Some(rest) = raw.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Some(raw.to_string());
    }
    base?.join(raw).ok().map(String::from)
}
