//! Link resolution orchestration.
//!
//! One episode page goes through four sequential extraction stages — direct
//! media, quality-labelled anchors, embed candidates, AJAX player panels —
//! sharing a single dedup set, and comes out as a ranked list of
//! [`QualityOption`]s. Only a failure to fetch the episode page itself is
//! fatal; every secondary fetch (an embed, an AJAX panel) is logged and
//! skipped so one bad mirror never aborts the run.

use std::collections::HashSet;
use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::embed::EmbedResolver;
use crate::error::Result;
use crate::extract::extract_media_urls;
use crate::fetch::FetchClient;

static QUALITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(360|480|720|1080)p\b").expect("quality pattern should compile")
});

static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("valid selector"));
static EMBED_SOURCES: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[data-video], [data-embed], [data-src], [data-url], iframe[src]")
        .expect("valid selector")
});
static DOWNLOAD_LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.download a[href]").expect("valid selector"));
static PLAYER_OPTIONS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".east_player_option").expect("valid selector"));
static IFRAMES: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("iframe[src]").expect("valid selector"));

/// Attribute precedence for embed candidates.
const EMBED_ATTRS: [&str; 5] = ["data-video", "data-embed", "data-src", "data-url", "src"];

/// One playable stream with its human quality hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityOption {
    /// Quality hint: "720p", "auto", or a site-supplied option name.
    pub label: String,
    /// Absolute, fetchable media locator.
    pub url: String,
}

/// AJAX player-panel descriptor scraped from option markup; consumed once to
/// build one admin-ajax request.
#[derive(Debug, Clone)]
struct PlayerOption {
    post: String,
    nume: String,
    kind: String,
    label: String,
}

/// Immutable resolution behavior knobs, injected at construction so a run is
/// a pure function of its inputs plus this configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Priority-ordered host fragments; earlier entries rank higher.
    pub preferred_hosts: Vec<String>,
    /// Admin-ajax endpoint path, joined against the episode URL's site root.
    pub admin_ajax_path: String,
    /// Cost bound: at most this many embed candidates are fetched per run.
    pub embed_fetch_cap: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            preferred_hosts: [
                "googlevideo.com",
                "blogger.com",
                "wibufile.com",
                "samehadaku",
                "mega.nz",
                "filedon",
            ]
            .map(String::from)
            .to_vec(),
            admin_ajax_path: "/wp-admin/admin-ajax.php".to_string(),
            embed_fetch_cap: 10,
        }
    }
}

/// Resolves an episode page into ranked playable options.
pub struct Resolver {
    client: FetchClient,
    embeds: EmbedResolver,
    config: ResolverConfig,
}

impl Resolver {
    /// Create a resolver with the default site configuration.
    #[must_use]
    pub fn new(client: FetchClient) -> Self {
        Self::with_config(client, ResolverConfig::default())
    }

    /// Create a resolver with explicit configuration.
    #[must_use]
    pub fn with_config(client: FetchClient, config: ResolverConfig) -> Self {
        Self {
            client,
            embeds: EmbedResolver::new(),
            config,
        }
    }

    /// Resolve an episode page into a best-first list of playable options.
    ///
    /// An empty list is a legitimate "no playable links" outcome, not an
    /// error. Only the episode-page fetch itself can fail.
    pub async fn resolve(&self, episode_url: &str) -> Result<Vec<QualityOption>> {
        let html = self.client.fetch_text(episode_url, None).await?;
        let page = EpisodePage::parse(&html, episode_url);

        let mut options: Vec<QualityOption> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        // Stage 1: direct media on the page itself.
        for media_url in extract_media_urls(&html, episode_url) {
            add_option(&mut options, &mut seen, "auto", media_url);
        }

        // Stage 2: quality-labelled anchors.
        for (label, href) in page.anchors {
            add_option(&mut options, &mut seen, &label, href);
        }

        // Stage 3: embed candidates, capped.
        let mut tried: HashSet<String> = HashSet::new();
        let mut fetched = 0usize;
        for candidate in page.embed_candidates {
            if fetched >= self.config.embed_fetch_cap {
                debug!(
                    cap = self.config.embed_fetch_cap,
                    "embed candidate cap reached, ignoring the rest"
                );
                break;
            }
            if seen.contains(&candidate) || !tried.insert(candidate.clone()) {
                continue;
            }
            fetched += 1;
            for media_url in self
                .embeds
                .resolve(&candidate, episode_url, &self.client)
                .await
            {
                add_option(&mut options, &mut seen, "auto", media_url);
            }
        }

        // Stage 4: AJAX player panels.
        if !page.player_options.is_empty() {
            if let Some(ajax_url) = join_url(episode_url, &self.config.admin_ajax_path) {
                for option in page.player_options {
                    self.resolve_player_option(&ajax_url, episode_url, &option, &mut options, &mut seen)
                        .await;
                }
            }
        }

        rank_options(&mut options, &self.config.preferred_hosts);
        Ok(options)
    }

    /// POST one player option to admin-ajax and harvest the returned
    /// fragment. Failures are logged and the option skipped.
    async fn resolve_player_option(
        &self,
        ajax_url: &str,
        episode_url: &str,
        option: &PlayerOption,
        options: &mut Vec<QualityOption>,
        seen: &mut HashSet<String>,
    ) {
        let fields = [
            ("action", "player_ajax"),
            ("post", option.post.as_str()),
            ("nume", option.nume.as_str()),
            ("type", option.kind.as_str()),
        ];
        let fragment = match self
            .client
            .post_form(ajax_url, &fields, Some(episode_url))
            .await
        {
            Ok(fragment) => fragment,
            Err(err) => {
                warn!(
                    option = %option.label,
                    error = %err,
                    "player option request failed, skipping"
                );
                return;
            }
        };

        for media_url in extract_media_urls(&fragment, episode_url) {
            add_option(options, seen, &option.label, media_url);
        }
        for iframe_url in iframe_sources(&fragment, episode_url) {
            for media_url in self
                .embeds
                .resolve(&iframe_url, episode_url, &self.client)
                .await
            {
                add_option(options, seen, &option.label, media_url);
            }
        }
    }
}

/// Everything the stages need from the episode document, pulled out in one
/// sync pass so no parsed DOM is held across an await point.
struct EpisodePage {
    /// Stage-2 anchors: (quality label, absolute media href).
    anchors: Vec<(String, String)>,
    /// Stage-3 candidates, decoded and resolved, in discovery order.
    embed_candidates: Vec<String>,
    /// Stage-4 player-panel descriptors.
    player_options: Vec<PlayerOption>,
}

impl EpisodePage {
    fn parse(html: &str, episode_url: &str) -> Self {
        let document = Html::parse_document(html);
        let base = Url::parse(episode_url).ok();

        let mut anchors = Vec::new();
        for anchor in document.select(&ANCHORS) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if href.is_empty() {
                continue;
            }
            let href = resolve_against(base.as_ref(), href);
            if !(href.contains(".mp4") || href.contains(".m3u8")) {
                continue;
            }
            let text = clean_whitespace(&anchor.text().collect::<String>());
            let label = quality_from_text(&text)
                .or_else(|| quality_from_text(&href))
                .unwrap_or_else(|| "auto".to_string());
            anchors.push((label, href));
        }

        let mut embed_candidates = Vec::new();
        for element in document.select(&EMBED_SOURCES) {
            let Some(raw) = EMBED_ATTRS
                .iter()
                .find_map(|attr| element.value().attr(attr))
            else {
                continue;
            };
            if raw.is_empty() {
                continue;
            }
            let candidate = maybe_decode_base64(raw);
            embed_candidates.push(resolve_against(base.as_ref(), &candidate));
        }
        for anchor in document.select(&DOWNLOAD_LINKS) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let href = resolve_against(base.as_ref(), href);
            if href.starts_with("http://") || href.starts_with("https://") {
                embed_candidates.push(href);
            }
        }

        let mut player_options = Vec::new();
        for node in document.select(&PLAYER_OPTIONS) {
            let (Some(post), Some(nume), Some(kind)) = (
                node.value().attr("data-post"),
                node.value().attr("data-nume"),
                node.value().attr("data-type"),
            ) else {
                continue;
            };
            let mut label = clean_whitespace(&node.text().collect::<String>());
            if label.is_empty() {
                label = format!("Option {nume}");
            }
            player_options.push(PlayerOption {
                post: post.to_string(),
                nume: nume.to_string(),
                kind: kind.to_string(),
                label,
            });
        }

        Self {
            anchors,
            embed_candidates,
            player_options,
        }
    }
}

/// Absolute iframe srcs in an HTML fragment.
fn iframe_sources(html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_fragment(html);
    let base = Url::parse(base_url).ok();
    document
        .select(&IFRAMES)
        .filter_map(|iframe| iframe.value().attr("src"))
        .filter(|src| !src.is_empty())
        .map(|src| resolve_against(base.as_ref(), src))
        .collect()
}

/// First sighting of a URL wins its label; later sightings are discarded.
fn add_option(
    options: &mut Vec<QualityOption>,
    seen: &mut HashSet<String>,
    label: &str,
    url: String,
) {
    if url.is_empty() || !seen.insert(url.clone()) {
        return;
    }
    options.push(QualityOption {
        label: label.to_string(),
        url,
    });
}

/// Stable descending sort by (host preference, quality); ties keep
/// discovery order.
fn rank_options(options: &mut [QualityOption], preferred_hosts: &[String]) {
    options.sort_by(|a, b| {
        let key_a = (host_score(&a.url, preferred_hosts), quality_rank(&a.label, &a.url));
        let key_b = (host_score(&b.url, preferred_hosts), quality_rank(&b.label, &b.url));
        key_b.cmp(&key_a)
    });
}

/// Preference weight of a URL's host against a priority-ordered fragment
/// list: `len - index` of the first case-insensitive substring match, 0 when
/// nothing matches. Pure function of its arguments.
#[must_use]
pub fn host_score(url: &str, preferred_hosts: &[String]) -> usize {
    let Some(host) = Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_lowercase))
    else {
        return 0;
    };
    for (index, preferred) in preferred_hosts.iter().enumerate() {
        if host.contains(&preferred.to_lowercase()) {
            return preferred_hosts.len() - index;
        }
    }
    0
}

/// Numeric quality from the first `{360,480,720,1080}p` hint in the label,
/// else the URL; 0 when neither carries one. Pure function of its arguments.
#[must_use]
pub fn quality_rank(label: &str, url: &str) -> u32 {
    for source in [label, url] {
        if let Some(caps) = QUALITY.captures(source) {
            return caps[1].parse().unwrap_or(0);
        }
    }
    0
}

/// "720p"-style label from free text, if present.
fn quality_from_text(text: &str) -> Option<String> {
    QUALITY.captures(text).map(|caps| format!("{}p", &caps[1]))
}

fn clean_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve a possibly-relative href against a base; unresolvable values pass
/// through unchanged so absolute-URL checks downstream still apply.
fn resolve_against(base: Option<&Url>, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    match base.and_then(|base| base.join(href).ok()) {
        Some(joined) => joined.into(),
        None => href.to_string(),
    }
}

/// Opportunistic base64 decode for obfuscated embed attributes: attempted
/// only when the value is not already absolute and its length is a multiple
/// of 4, and kept only when the decoded text contains an http(s) URL. Known
/// to misfire on coincidentally-sized plain strings; kept as a best effort.
fn maybe_decode_base64(value: &str) -> String {
    if value.starts_with("http://") || value.starts_with("https://") {
        return value.to_string();
    }
    if value.is_empty() || value.len() % 4 != 0 {
        return value.to_string();
    }
    let Ok(bytes) = BASE64.decode(value) else {
        return value.to_string();
    };
    let decoded = String::from_utf8_lossy(&bytes);
    if decoded.contains("http://") || decoded.contains("https://") {
        decoded.trim().to_string()
    } else {
        value.to_string()
    }
}

fn join_url(base: &str, path: &str) -> Option<String> {
    Url::parse(base)
        .ok()?
        .join(path)
        .ok()
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use reqwest::header::HeaderMap;

    use super::*;
    use crate::fetch::{Backend, BackendResponse};

    // ─── Pure ranking helpers ────────────────────────────────────────────

    #[test]
    fn quality_rank_prefers_label_over_url() {
        assert_eq!(quality_rank("720p BluRay", ""), 720);
        assert_eq!(quality_rank("HD", "https://x/720p/v.mp4"), 720);
        assert_eq!(quality_rank("HD", "https://x/v.mp4"), 0);
    }

    #[test]
    fn quality_rank_is_case_insensitive() {
        assert_eq!(quality_rank("1080P WEB-DL", ""), 1080);
    }

    #[test]
    fn host_score_orders_preferred_hosts_first() {
        let hosts = ResolverConfig::default().preferred_hosts;
        let mega = host_score("https://mega.nz/file/abc.mp4", &hosts);
        let unknown = host_score("https://random.example/v.mp4", &hosts);
        assert!(mega > unknown);
        assert_eq!(unknown, 0);
    }

    #[test]
    fn host_score_respects_list_order() {
        let hosts = ResolverConfig::default().preferred_hosts;
        let googlevideo = host_score("https://r3.googlevideo.com/v.mp4", &hosts);
        let mega = host_score("https://mega.nz/v.mp4", &hosts);
        assert!(googlevideo > mega);
    }

    #[test]
    fn ranking_is_stable_for_ties() {
        let mut options = vec![
            QualityOption {
                label: "auto".into(),
                url: "https://a.example/v1.mp4".into(),
            },
            QualityOption {
                label: "auto".into(),
                url: "https://b.example/v2.mp4".into(),
            },
            QualityOption {
                label: "720p".into(),
                url: "https://c.example/v3.mp4".into(),
            },
        ];
        rank_options(&mut options, &[]);
        assert_eq!(options[0].url, "https://c.example/v3.mp4");
        assert_eq!(options[1].url, "https://a.example/v1.mp4");
        assert_eq!(options[2].url, "https://b.example/v2.mp4");
    }

    // ─── Candidate normalization ─────────────────────────────────────────

    #[test]
    fn base64_candidate_with_url_inside_is_decoded() {
        let encoded = STANDARD.encode("https://hidden.example/embed/1");
        assert_eq!(
            maybe_decode_base64(&encoded),
            "https://hidden.example/embed/1"
        );
    }

    #[test]
    fn absolute_urls_are_never_decoded() {
        assert_eq!(
            maybe_decode_base64("https://plain.example/e"),
            "https://plain.example/e"
        );
    }

    #[test]
    fn wrong_length_is_left_alone() {
        assert_eq!(maybe_decode_base64("abcde"), "abcde");
    }

    #[test]
    fn decoded_non_url_text_is_left_alone() {
        let encoded = STANDARD.encode("just some words here");
        assert_eq!(maybe_decode_base64(&encoded), encoded);
    }

    #[test]
    fn player_option_label_defaults_to_nume() {
        let html = r#"<div class="east_player_option" data-post="12" data-nume="3" data-type="tv"></div>"#;
        let page = EpisodePage::parse(html, "https://site.example/ep/1");
        assert_eq!(page.player_options.len(), 1);
        assert_eq!(page.player_options[0].label, "Option 3");
    }

    #[test]
    fn player_option_missing_attribute_is_skipped() {
        let html = r#"<div class="east_player_option" data-post="12" data-nume="3">X</div>"#;
        let page = EpisodePage::parse(html, "https://site.example/ep/1");
        assert!(page.player_options.is_empty());
    }

    #[test]
    fn anchor_label_falls_back_text_then_href_then_auto() {
        let html = r#"
            <a href="/a.mp4">Download 480p</a>
            <a href="/720p/b.mp4">Mirror</a>
            <a href="/c.mp4">Mirror</a>
        "#;
        let page = EpisodePage::parse(html, "https://site.example/ep/1");
        let labels: Vec<&str> = page.anchors.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["480p", "720p", "auto"]);
    }

    // ─── Full pipeline over a scripted site ──────────────────────────────

    /// Backend serving canned bodies by URL; unknown URLs get 404. Records
    /// every GET/POST so tests can count fetches.
    struct SiteBackend {
        pages: HashMap<String, String>,
        post_body: Option<String>,
        gets: Mutex<Vec<String>>,
        posts: Mutex<Vec<String>>,
    }

    impl SiteBackend {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, body)| ((*url).to_string(), (*body).to_string()))
                    .collect(),
                post_body: None,
                gets: Mutex::new(Vec::new()),
                posts: Mutex::new(Vec::new()),
            }
        }

        fn with_post_body(mut self, body: &str) -> Self {
            self.post_body = Some(body.to_string());
            self
        }
    }

    #[async_trait]
    impl Backend for std::sync::Arc<SiteBackend> {
        fn name(&self) -> &'static str {
            "site"
        }

        async fn get(&self, url: &str, _headers: HeaderMap) -> crate::error::Result<BackendResponse> {
            self.gets.lock().unwrap().push(url.to_string());
            match self.pages.get(url) {
                Some(body) => Ok(BackendResponse {
                    status: 200,
                    body: body.clone(),
                }),
                None => Ok(BackendResponse {
                    status: 404,
                    body: String::new(),
                }),
            }
        }

        async fn post_form(
            &self,
            url: &str,
            _fields: &[(&str, &str)],
            _headers: HeaderMap,
        ) -> crate::error::Result<BackendResponse> {
            self.posts.lock().unwrap().push(url.to_string());
            match &self.post_body {
                Some(body) => Ok(BackendResponse {
                    status: 200,
                    body: body.clone(),
                }),
                None => Ok(BackendResponse {
                    status: 404,
                    body: String::new(),
                }),
            }
        }
    }

    fn resolver_over(site: std::sync::Arc<SiteBackend>) -> Resolver {
        Resolver::new(FetchClient::with_backends(vec![Box::new(site)]))
    }

    const EPISODE: &str = "https://site.example/ep/1";

    #[tokio::test]
    async fn first_discovered_label_wins_across_stages() {
        // Same URL in the direct stage ("auto") and as a 720p anchor.
        let html = r#"
            <source src="/v.mp4">
            <a href="/v.mp4">720p</a>
        "#;
        let site = std::sync::Arc::new(SiteBackend::new(&[(EPISODE, html)]));
        let options = resolver_over(site).resolve(EPISODE).await.unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].label, "auto");
        assert_eq!(options[0].url, "https://site.example/v.mp4");
    }

    #[tokio::test]
    async fn embed_candidates_are_capped() {
        let mut html = String::new();
        for i in 0..15 {
            html.push_str(&format!(r#"<iframe src="https://embed.example/p/{i}"></iframe>"#));
        }
        let site = std::sync::Arc::new(SiteBackend::new(&[(EPISODE, html.as_str())]));
        let options = resolver_over(site.clone()).resolve(EPISODE).await.unwrap();
        assert!(options.is_empty());

        // 1 episode-page fetch + exactly 10 embed fetches; 5 ignored.
        let gets = site.gets.lock().unwrap();
        let embed_gets = gets.iter().filter(|u| u.contains("embed.example")).count();
        assert_eq!(embed_gets, 10);
    }

    #[tokio::test]
    async fn embed_stage_survives_failed_candidates() {
        // Two embeds: the first 404s, the second resolves to media.
        let html = r#"
            <iframe src="https://embed.example/broken"></iframe>
            <div data-video="https://embed.example/good"></div>
        "#;
        let embed_html = r#"<source src="https://cdn.example/v.m3u8">"#;
        let site = std::sync::Arc::new(SiteBackend::new(&[
            (EPISODE, html),
            ("https://embed.example/good", embed_html),
        ]));
        let options = resolver_over(site).resolve(EPISODE).await.unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].url, "https://cdn.example/v.m3u8");
    }

    #[tokio::test]
    async fn base64_embed_attribute_is_decoded_and_fetched() {
        let encoded = STANDARD.encode("https://hidden.example/embed");
        let html = format!(r#"<div data-embed="{encoded}"></div>"#);
        let embed_html = r#"<video src="https://cdn.example/h.mp4"></video>"#;
        let site = std::sync::Arc::new(SiteBackend::new(&[
            (EPISODE, html.as_str()),
            ("https://hidden.example/embed", embed_html),
        ]));
        let options = resolver_over(site).resolve(EPISODE).await.unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].url, "https://cdn.example/h.mp4");
    }

    #[tokio::test]
    async fn player_option_labels_tag_ajax_results() {
        let html = r#"
            <div class="east_player_option" data-post="99" data-nume="2" data-type="tv">
                Server Dua
            </div>
        "#;
        let fragment = r#"<source src="https://cdn.example/ajax.m3u8">"#;
        let site = std::sync::Arc::new(
            SiteBackend::new(&[(EPISODE, html)]).with_post_body(fragment),
        );
        let options = resolver_over(site.clone()).resolve(EPISODE).await.unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].label, "Server Dua");
        assert_eq!(options[0].url, "https://cdn.example/ajax.m3u8");

        let posts = site.posts.lock().unwrap();
        assert_eq!(
            posts.as_slice(),
            ["https://site.example/wp-admin/admin-ajax.php"]
        );
    }

    #[tokio::test]
    async fn options_come_back_ranked_best_first() {
        let html = r#"
            <a href="https://random.example/v-480p.mp4">480p</a>
            <a href="https://mega.nz/v-360p.mp4">360p</a>
            <a href="https://random.example/v-720p.mp4">720p</a>
        "#;
        let site = std::sync::Arc::new(SiteBackend::new(&[(EPISODE, html)]));
        let options = resolver_over(site).resolve(EPISODE).await.unwrap();
        let urls: Vec<&str> = options.iter().map(|o| o.url.as_str()).collect();
        // Preferred host first regardless of quality, then by quality.
        assert_eq!(
            urls,
            vec![
                "https://mega.nz/v-360p.mp4",
                "https://random.example/v-720p.mp4",
                "https://random.example/v-480p.mp4",
            ]
        );
    }

    #[tokio::test]
    async fn episode_page_failure_is_fatal() {
        let site = std::sync::Arc::new(SiteBackend::new(&[]));
        let err = resolver_over(site).resolve(EPISODE).await.unwrap_err();
        assert!(matches!(err, crate::error::FetchError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn empty_page_yields_empty_options() {
        let site = std::sync::Arc::new(SiteBackend::new(&[(
            EPISODE,
            "<html><body>nothing here</body></html>",
        )]));
        let options = resolver_over(site).resolve(EPISODE).await.unwrap();
        assert!(options.is_empty());
    }
}
