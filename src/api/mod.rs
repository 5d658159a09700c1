use anyhow::{Context, Result};
use std::time::Duration;

pub mod elevenlabs;
pub mod google_tts;
pub mod jamendo;
pub mod pexels;
pub mod pixabay;

const USER_AGENT: &str = concat!("stock-shorts/", env!("CARGO_PKG_VERSION"));

/// Shared client for every provider. Requests are made one at a time, so a
/// single connection pool is enough.
pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(300))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")
}

/// First 200 characters of an error body, for log lines.
pub(crate) fn body_snippet(body: &str) -> String {
    body.chars().take(200).collect()
}
