//! Browser fingerprint spoofing.
//!
//! Generates realistic browser header sets so requests blend in with real
//! traffic. Version tables are static snapshots of current stable releases.

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT,
};

/// Recent stable Chrome versions as (major, full) pairs.
const CHROME_VERSIONS: &[(&str, &str)] = &[
    ("131", "131.0.6778.86"),
    ("132", "132.0.6834.110"),
    ("133", "133.0.6943.53"),
];

/// Recent stable Firefox versions.
const FIREFOX_VERSIONS: &[&str] = &["133.0", "134.0", "135.0"];

/// Browser profile with a realistic header fingerprint.
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub accept_encoding: String,
    pub sec_ch_ua: String,
    pub sec_ch_ua_mobile: String,
    pub sec_ch_ua_platform: String,
    pub sec_fetch_dest: String,
    pub sec_fetch_mode: String,
    pub sec_fetch_site: String,
    pub sec_fetch_user: String,
}

/// Platform configurations
#[derive(Debug, Clone, Copy)]
pub enum Platform {
    MacOS,
    Windows,
    Linux,
}

impl Platform {
    fn random() -> Self {
        let mut rng = rand::thread_rng();
        // Realistic distribution: Windows 65%, macOS 20%, Linux 15%
        let roll: f32 = rng.gen();
        if roll < 0.65 {
            Platform::Windows
        } else if roll < 0.85 {
            Platform::MacOS
        } else {
            Platform::Linux
        }
    }

    fn os_string(self) -> &'static str {
        match self {
            Platform::MacOS => "Macintosh; Intel Mac OS X 10_15_7",
            Platform::Windows => "Windows NT 10.0; Win64; x64",
            Platform::Linux => "X11; Linux x86_64",
        }
    }

    fn sec_ch_platform(self) -> &'static str {
        match self {
            Platform::MacOS => "\"macOS\"",
            Platform::Windows => "\"Windows\"",
            Platform::Linux => "\"Linux\"",
        }
    }
}

/// Generate a realistic Chrome browser profile.
#[must_use]
pub fn chrome_profile() -> BrowserProfile {
    let mut rng = rand::thread_rng();
    let platform = Platform::random();
    let (major, full) = CHROME_VERSIONS
        .choose(&mut rng)
        .expect("Chrome versions list should not be empty");

    let user_agent = format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36",
        platform.os_string(),
        full
    );

    let brands = [
        format!("\"Google Chrome\";v=\"{major}\""),
        format!("\"Chromium\";v=\"{major}\""),
        "\"Not_A Brand\";v=\"24\"".to_string(),
    ];

    BrowserProfile {
        user_agent,
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7".to_string(),
        accept_language: random_accept_language(),
        accept_encoding: "gzip, deflate, br, zstd".to_string(),
        sec_ch_ua: brands.join(", "),
        sec_ch_ua_mobile: "?0".to_string(),
        sec_ch_ua_platform: platform.sec_ch_platform().to_string(),
        sec_fetch_dest: "document".to_string(),
        sec_fetch_mode: "navigate".to_string(),
        sec_fetch_site: "same-origin".to_string(),
        sec_fetch_user: "?1".to_string(),
    }
}

/// Generate a realistic Firefox browser profile.
#[must_use]
pub fn firefox_profile() -> BrowserProfile {
    let mut rng = rand::thread_rng();
    let platform = Platform::random();
    let version = FIREFOX_VERSIONS
        .choose(&mut rng)
        .expect("Firefox versions list should not be empty");

    let user_agent = format!(
        "Mozilla/5.0 ({}; rv:{}) Gecko/20100101 Firefox/{}",
        platform.os_string(),
        version,
        version
    );

    BrowserProfile {
        user_agent,
        accept:
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
                .to_string(),
        accept_language: random_accept_language(),
        accept_encoding: "gzip, deflate, br, zstd".to_string(),
        // Firefox doesn't send Sec-CH-UA headers
        sec_ch_ua: String::new(),
        sec_ch_ua_mobile: String::new(),
        sec_ch_ua_platform: String::new(),
        sec_fetch_dest: "document".to_string(),
        sec_fetch_mode: "navigate".to_string(),
        sec_fetch_site: "same-origin".to_string(),
        sec_fetch_user: "?1".to_string(),
    }
}

/// Generate a random browser profile (weighted by market share).
#[must_use]
pub fn random_profile() -> BrowserProfile {
    let mut rng = rand::thread_rng();
    let roll: f32 = rng.gen();
    if roll < 0.75 {
        chrome_profile()
    } else {
        firefox_profile()
    }
}

/// Generate random Accept-Language header
fn random_accept_language() -> String {
    let mut rng = rand::thread_rng();
    let languages = [
        "en-US,en;q=0.9",
        "en-GB,en;q=0.9",
        "en-US,en;q=0.9,id;q=0.8",
        "en-US,en;q=0.9,de;q=0.8",
        "en-US,en;q=0.9,ja;q=0.8",
    ];
    languages
        .choose(&mut rng)
        .expect("Languages list should not be empty")
        .to_string()
}

impl BrowserProfile {
    /// Convert profile to a reqwest `HeaderMap`.
    pub fn to_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        // Header values are built from controlled static strings, so
        // from_str cannot fail here.
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent)
                .expect("User agent should be valid header value"),
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_str(&self.accept).expect("Accept should be valid header value"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&self.accept_language)
                .expect("Accept-Language should be valid header value"),
        );
        headers.insert(
            ACCEPT_ENCODING,
            HeaderValue::from_str(&self.accept_encoding)
                .expect("Accept-Encoding should be valid header value"),
        );

        // Sec-CH-UA headers are Chrome-only
        if !self.sec_ch_ua.is_empty() {
            headers.insert(
                "Sec-CH-UA",
                HeaderValue::from_str(&self.sec_ch_ua)
                    .expect("Sec-CH-UA should be valid header value"),
            );
            headers.insert(
                "Sec-CH-UA-Mobile",
                HeaderValue::from_str(&self.sec_ch_ua_mobile)
                    .expect("Sec-CH-UA-Mobile should be valid header value"),
            );
            headers.insert(
                "Sec-CH-UA-Platform",
                HeaderValue::from_str(&self.sec_ch_ua_platform)
                    .expect("Sec-CH-UA-Platform should be valid header value"),
            );
        }

        // Sec-Fetch headers (all modern browsers)
        headers.insert(
            "Sec-Fetch-Dest",
            HeaderValue::from_str(&self.sec_fetch_dest)
                .expect("Sec-Fetch-Dest should be valid header value"),
        );
        headers.insert(
            "Sec-Fetch-Mode",
            HeaderValue::from_str(&self.sec_fetch_mode)
                .expect("Sec-Fetch-Mode should be valid header value"),
        );
        headers.insert(
            "Sec-Fetch-Site",
            HeaderValue::from_str(&self.sec_fetch_site)
                .expect("Sec-Fetch-Site should be valid header value"),
        );
        headers.insert(
            "Sec-Fetch-User",
            HeaderValue::from_str(&self.sec_fetch_user)
                .expect("Sec-Fetch-User should be valid header value"),
        );

        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
        headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
        headers.insert("Pragma", HeaderValue::from_static("no-cache"));

        headers
    }
}
