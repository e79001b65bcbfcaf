//! Fetch-layer error kinds.
//!
//! The fetch layer distinguishes failures that are worth rotating backends
//! for (anti-bot blocking, transport errors) from failures that are not
//! (a real 404 or 500 is the same on every backend and must surface fast).

use thiserror::Error;

/// Errors produced by the multi-backend fetch layer.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Every configured backend was blocked (403/429) even after its
    /// warm-up retry.
    #[error("blocked by anti-bot protection (HTTP {status}, last backend: {backend})")]
    Blocked { status: u16, backend: &'static str },

    /// Transport-level failure: connection refused, DNS, timeout.
    #[error("network error: {0}")]
    Network(String),

    /// Non-retryable HTTP status. Switching backends does not fix a 404.
    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    /// The client was constructed with an empty backend list.
    #[error("no HTTP backend configured")]
    NoBackend,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

impl FetchError {
    /// `true` when the failure looks like anti-bot blocking, so callers can
    /// present a "site is blocking requests" message instead of a generic one.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
