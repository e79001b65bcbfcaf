//! `streamsift` — resolve episode pages into playable media URLs.
//!
//! # Features
//!
//! - **Multi-backend fetching**: ordered transport backends with per-backend
//!   cookie jars; blocked requests (403/429) get a session warm-up and one
//!   retry before rotating to the next backend
//! - **Browser fingerprinting**: realistic Chrome/Firefox header profiles
//! - **Layered extraction**: direct media markup, quality-labelled anchors,
//!   obfuscated/base64 embed candidates, and AJAX player panels, all feeding
//!   one deduplicated, ranked option list
//!
//! # Example
//!
//! ```rust,no_run
//! use streamsift::{FetchClient, Resolver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let resolver = Resolver::new(FetchClient::new()?);
//!     for option in resolver.resolve("https://site.example/ep/1").await? {
//!         println!("{}\t{}", option.label, option.url);
//!     }
//!     Ok(())
//! }
//! ```

pub mod embed;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod fingerprint;
pub mod resolve;

pub use embed::{EmbedProvider, EmbedResolver};
pub use error::FetchError;
pub use extract::extract_media_urls;
pub use fetch::{Backend, BackendResponse, FetchClient, ReqwestBackend};
pub use fingerprint::{chrome_profile, firefox_profile, random_profile, BrowserProfile};
pub use resolve::{host_score, quality_rank, QualityOption, Resolver, ResolverConfig};

/// Version of streamsift
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
