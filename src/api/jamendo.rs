use crate::api::body_snippet;
use crate::fetcher::download_to;
use crate::{logi, logw};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const JAMENDO_BASE: &str = "https://api.jamendo.com/v3.0";

#[derive(Debug, Deserialize)]
struct TrackSearch {
    #[serde(default)]
    results: Vec<Track>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub audio: String,
}

pub struct JamendoClient {
    client: Client,
    client_id: String,
}

impl JamendoClient {
    pub fn new(client: Client, client_id: &str) -> Self {
        Self {
            client,
            client_id: client_id.to_string(),
        }
    }

    pub async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let limit = limit.to_string();
        let resp = self
            .client
            .get(format!("{JAMENDO_BASE}/tracks/"))
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("format", "json"),
                ("limit", limit.as_str()),
                ("search", query),
            ])
            .send()
            .await
            .context("Jamendo request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            logw(format!("Jamendo search HTTP {} ({})", status.as_u16(), body_snippet(&body)));
            return Ok(Vec::new());
        }
        let search = resp
            .json::<TrackSearch>()
            .await
            .context("Jamendo response parse failed")?;
        Ok(search.results.into_iter().filter(|t| !t.audio.is_empty()).collect())
    }

    /// Downloads the first playable track matching `query` into `dir`.
    pub async fn fetch_one(&self, query: &str, dir: &Path) -> Result<Option<PathBuf>> {
        let tracks = self.search_tracks(query, 5).await?;
        let Some(track) = tracks.first() else {
            logw(format!("Jamendo: no tracks for '{}'", query));
            return Ok(None);
        };

        let dest = dir.join(format!("jamendo_{}.mp3", track.id));
        logi(format!("Jamendo: downloading '{}' by {}", track.name, track.artist_name));
        if download_to(&self.client, &track.audio, &dest).await? {
            Ok(Some(dest))
        } else {
            Ok(None)
        }
    }
}
