//! Multi-backend fetch layer.
//!
//! Aggregator sites front themselves with status-code-level anti-bot
//! blocking. Blocking and connectivity problems are backend-specific, so the
//! client keeps an ordered list of transport backends and rotates through
//! them: a blocked backend gets one warm-up (idle GET to the site root, to
//! pick up session cookies) and one retry before the next backend is tried.
//! A genuine 404 or 500 is not solved by switching backends and surfaces
//! immediately.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER};
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::error::{FetchError, Result};
use crate::fingerprint::{chrome_profile, random_profile};

/// Statuses that indicate anti-bot blocking rather than a real error.
const BLOCKED_STATUSES: [u16; 2] = [403, 429];

/// Raw response from a backend. The status is always surfaced so the fetch
/// layer can classify it; backends never throw on non-2xx.
#[derive(Debug)]
pub struct BackendResponse {
    pub status: u16,
    pub body: String,
}

impl BackendResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn is_blocked(&self) -> bool {
        BLOCKED_STATUSES.contains(&self.status)
    }
}

/// One concrete HTTP transport strategy.
///
/// Implementations keep their own session/cookie state and return
/// [`FetchError::Network`] only for transport-level failures (connect, DNS,
/// timeout) — HTTP statuses come back in the [`BackendResponse`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Issue a GET with the given extra headers.
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<BackendResponse>;

    /// Issue a POST with url-encoded form fields.
    async fn post_form(
        &self,
        url: &str,
        fields: &[(&str, &str)],
        headers: HeaderMap,
    ) -> Result<BackendResponse>;
}

/// reqwest-based backend with its own cookie jar and browser fingerprint.
pub struct ReqwestBackend {
    name: &'static str,
    client: Client,
}

impl ReqwestBackend {
    /// Primary backend: standard ALPN negotiation, Chrome fingerprint.
    pub fn direct() -> Result<Self> {
        let client = Client::builder()
            .default_headers(chrome_profile().to_headers())
            .use_rustls_tls()
            .brotli(true)
            .zstd(true)
            .gzip(true)
            .deflate(true)
            .cookie_store(true)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(20))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            name: "direct",
            client,
        })
    }

    /// Fallback backend: HTTP/1.1 only with a randomized fingerprint and a
    /// fresh cookie jar. Some anti-bot setups fingerprint HTTP/2 framing, so
    /// a plain HTTP/1.1 session with different headers is a distinct
    /// strategy, not just a second attempt.
    pub fn stealth() -> Result<Self> {
        let client = Client::builder()
            .default_headers(random_profile().to_headers())
            .use_rustls_tls()
            .http1_only()
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(20))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            name: "stealth",
            client,
        })
    }
}

#[async_trait]
impl Backend for ReqwestBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get(&self, url: &str, headers: HeaderMap) -> Result<BackendResponse> {
        let response = self.client.get(url).headers(headers).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(BackendResponse { status, body })
    }

    async fn post_form(
        &self,
        url: &str,
        fields: &[(&str, &str)],
        headers: HeaderMap,
    ) -> Result<BackendResponse> {
        let response = self
            .client
            .post(url)
            .headers(headers)
            .form(fields)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(BackendResponse { status, body })
    }
}

enum Payload<'a> {
    Get,
    Form(&'a [(&'a str, &'a str)]),
}

/// Stateful text-fetching client over an ordered backend list.
pub struct FetchClient {
    backends: Vec<Box<dyn Backend>>,
}

impl FetchClient {
    /// Create the default client: direct backend first, stealth fallback.
    pub fn new() -> Result<Self> {
        Ok(Self::with_backends(vec![
            Box::new(ReqwestBackend::direct()?),
            Box::new(ReqwestBackend::stealth()?),
        ]))
    }

    /// Create a client over an explicit, priority-ordered backend list.
    /// An unavailable optional backend is represented by a shorter list.
    #[must_use]
    pub fn with_backends(backends: Vec<Box<dyn Backend>>) -> Self {
        Self { backends }
    }

    /// Fetch a URL as text.
    ///
    /// `referer`, when given, is sent as both `Referer` and `Origin`;
    /// otherwise both are derived from the target URL's scheme and host.
    pub async fn fetch_text(&self, url: &str, referer: Option<&str>) -> Result<String> {
        self.execute(url, &Payload::Get, referer).await
    }

    /// POST url-encoded form fields and return the response text.
    pub async fn post_form(
        &self,
        url: &str,
        fields: &[(&str, &str)],
        referer: Option<&str>,
    ) -> Result<String> {
        self.execute(url, &Payload::Form(fields), referer).await
    }

    async fn execute(&self, url: &str, payload: &Payload<'_>, referer: Option<&str>) -> Result<String> {
        if self.backends.is_empty() {
            return Err(FetchError::NoBackend);
        }

        let headers = referer_headers(url, referer);
        let root = site_root(url);
        let mut last_error: Option<FetchError> = None;

        for backend in &self.backends {
            let outcome = self
                .send_with_warmup(backend.as_ref(), url, payload, &headers, root.as_deref())
                .await;

            match outcome {
                Ok(response) if response.is_success() => return Ok(response.body),
                Ok(response) if response.is_blocked() => {
                    warn!(
                        backend = backend.name(),
                        status = response.status,
                        "still blocked after warm-up, rotating backend"
                    );
                    last_error = Some(FetchError::Blocked {
                        status: response.status,
                        backend: backend.name(),
                    });
                }
                // Any other HTTP error is the same on every backend.
                Ok(response) => {
                    return Err(FetchError::Http {
                        status: response.status,
                        url: url.to_string(),
                    })
                }
                Err(err) => {
                    warn!(
                        backend = backend.name(),
                        error = %err,
                        "transport failure, rotating backend"
                    );
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or(FetchError::NoBackend))
    }

    /// Send once; on a blocked status, warm the backend's session with an
    /// idle GET to the site root and retry exactly once.
    async fn send_with_warmup(
        &self,
        backend: &dyn Backend,
        url: &str,
        payload: &Payload<'_>,
        headers: &HeaderMap,
        root: Option<&str>,
    ) -> Result<BackendResponse> {
        let response = self.send(backend, url, payload, headers.clone()).await?;
        if !response.is_blocked() {
            return Ok(response);
        }

        if let Some(root) = root {
            debug!(
                backend = backend.name(),
                status = response.status,
                "blocked, warming up session at {root}"
            );
            // Warm-up failures are irrelevant; the retry decides.
            if let Err(err) = backend.get(root, HeaderMap::new()).await {
                debug!(backend = backend.name(), error = %err, "warm-up failed");
            }
        }

        self.send(backend, url, payload, headers.clone()).await
    }

    async fn send(
        &self,
        backend: &dyn Backend,
        url: &str,
        payload: &Payload<'_>,
        headers: HeaderMap,
    ) -> Result<BackendResponse> {
        match payload {
            Payload::Get => backend.get(url, headers).await,
            Payload::Form(fields) => backend.post_form(url, fields, headers).await,
        }
    }
}

/// Referer/Origin pair for one request: the caller-supplied referer, or the
/// target's own scheme+host when absent.
fn referer_headers(url: &str, referer: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let value = match referer {
        Some(referer) => referer.to_string(),
        None => match site_root(url) {
            Some(root) => root,
            None => return headers,
        },
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(REFERER, value.clone());
        headers.insert(ORIGIN, value);
    }
    headers
}

/// Scheme+host root of a URL, e.g. `https://example.com`.
fn site_root(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let origin = parsed.origin();
    if origin.is_tuple() {
        Some(origin.ascii_serialization())
    } else {
        None
    }
}
