use super::{Publisher, UploadMeta};
use crate::api::body_snippet;
use crate::config::{PublishConfig, YouTubeKeys};
use crate::{logi, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use reqwest::Client;
use reqwest::header::LOCATION;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use tokio::fs;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const VIDEOS_URL: &str = "https://www.googleapis.com/youtube/v3/videos";
const UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UploadedVideo {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoStatusItem>,
}

#[derive(Debug, Deserialize)]
struct VideoStatusItem {
    #[serde(default)]
    status: VideoStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatus {
    #[serde(default)]
    publish_at: Option<String>,
}

fn video_ids(search: &SearchResponse) -> Vec<String> {
    search
        .items
        .iter()
        .filter_map(|item| item.id.video_id.clone())
        .collect()
}

/// Furthest `publishAt` among the listed videos. Unparseable values are
/// ignored.
fn latest_publish_at(videos: &VideoListResponse) -> Option<DateTime<FixedOffset>> {
    videos
        .items
        .iter()
        .filter_map(|v| v.status.publish_at.as_deref())
        .filter_map(|s| DateTime::parse_from_rfc3339(s).ok())
        .max()
}

/// Scheduled private uploads through the YouTube Data API.
pub struct YouTubePublisher {
    client: Client,
    keys: YouTubeKeys,
    category_id: String,
    privacy_status: String,
}

impl YouTubePublisher {
    pub fn new(client: Client, keys: &YouTubeKeys, cfg: &PublishConfig) -> Self {
        Self {
            client,
            keys: keys.clone(),
            category_id: cfg.category_id.clone(),
            privacy_status: cfg.privacy_status.clone(),
        }
    }

    /// `videos.insert` resource for one upload.
    pub fn video_resource(&self, meta: &UploadMeta, scheduled_time: DateTime<FixedOffset>) -> Value {
        json!({
            "snippet": {
                "title": meta.title,
                "description": meta.description,
                "tags": meta.tags,
                "categoryId": self.category_id,
            },
            "status": {
                "privacyStatus": self.privacy_status,
                "publishAt": scheduled_time
                    .with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
                "selfDeclaredMadeForKids": false,
            }
        })
    }

    async fn access_token(&self) -> Result<Option<String>> {
        let resp = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.keys.client_id.as_str()),
                ("client_secret", self.keys.client_secret.as_str()),
                ("refresh_token", self.keys.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .context("OAuth token request failed")?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            logw(format!("OAuth refresh failed HTTP {}: {}", status, body_snippet(&body)));
            return Ok(None);
        }
        let token: TokenResponse = resp.json().await.context("OAuth token response parse failed")?;
        Ok(Some(token.access_token))
    }

    /// GET `url` with `query`, parsing the JSON body. Non-success statuses are
    /// logged and give `None`.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .with_context(|| format!("YouTube request failed: {url}"))?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            logw(format!("YouTube {} HTTP {}: {}", url, status, body_snippet(&body)));
            return Ok(None);
        }
        let parsed = resp
            .json()
            .await
            .with_context(|| format!("YouTube response parse failed: {url}"))?;
        Ok(Some(parsed))
    }
}

#[async_trait]
impl Publisher for YouTubePublisher {
    fn name(&self) -> &str {
        "youtube"
    }

    async fn last_scheduled(&self) -> Result<Option<DateTime<FixedOffset>>> {
        let Some(token) = self.access_token().await? else {
            return Ok(None);
        };
        let search: SearchResponse = self
            .get_json(
                SEARCH_URL,
                &token,
                &[("part", "id"), ("forMine", "true"), ("type", "video"), ("maxResults", "50")],
            )
            .await?
            .unwrap_or_default();
        let ids = video_ids(&search);
        if ids.is_empty() {
            return Ok(None);
        }

        let ids = ids.join(",");
        let videos: VideoListResponse = self
            .get_json(
                VIDEOS_URL,
                &token,
                &[("part", "status"), ("id", ids.as_str()), ("maxResults", "50")],
            )
            .await?
            .unwrap_or_default();
        Ok(latest_publish_at(&videos))
    }

    async fn upload(&self, file: &Path, meta: &UploadMeta, scheduled_time: DateTime<FixedOffset>) -> Result<bool> {
        let Some(token) = self.access_token().await? else {
            return Ok(false);
        };
        let bytes = fs::read(file)
            .await
            .with_context(|| format!("read video: {}", file.display()))?;

        let init = self
            .client
            .post(UPLOAD_URL)
            .bearer_auth(&token)
            .header("X-Upload-Content-Type", "video/*")
            .header("X-Upload-Content-Length", bytes.len().to_string())
            .json(&self.video_resource(meta, scheduled_time))
            .send()
            .await
            .context("YouTube upload session request failed")?;

        if !init.status().is_success() {
            let status = init.status().as_u16();
            let body = init.text().await.unwrap_or_default();
            logw(format!("YouTube session failed HTTP {}: {}", status, body_snippet(&body)));
            return Ok(false);
        }
        let Some(session) = init
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
        else {
            logw("YouTube session response had no upload location");
            return Ok(false);
        };

        logi(format!("Uploading {} ({} bytes) to YouTube", file.display(), bytes.len()));
        let resp = self
            .client
            .put(session)
            .bearer_auth(&token)
            .header("Content-Type", "video/*")
            .body(bytes)
            .send()
            .await
            .context("YouTube upload failed")?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            logw(format!("YouTube upload failed HTTP {}: {}", status, body_snippet(&body)));
            return Ok(false);
        }
        let video: UploadedVideo = resp.json().await.unwrap_or(UploadedVideo { id: String::new() });
        logi(format!("YouTube video id: {}", video.id));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_schedules_private_upload_in_utc() {
        let publisher = YouTubePublisher::new(Client::new(), &YouTubeKeys::default(), &PublishConfig::default());
        let meta = UploadMeta {
            title: "Cachoeiras - #Shorts".to_string(),
            description: "#cachoeira #brasil".to_string(),
            tags: vec!["cachoeira".to_string(), "brasil".to_string()],
        };
        let at = DateTime::parse_from_rfc3339("2025-02-06T18:00:00-03:00").unwrap();
        let body = publisher.video_resource(&meta, at);

        assert_eq!(body["status"]["publishAt"], "2025-02-06T21:00:00Z");
        assert_eq!(body["status"]["privacyStatus"], "private");
        assert_eq!(body["status"]["selfDeclaredMadeForKids"], false);
        assert_eq!(body["snippet"]["categoryId"], "24");
        assert_eq!(body["snippet"]["tags"][1], "brasil");
    }

    #[test]
    fn latest_publish_time_wins() {
        let search: SearchResponse = serde_json::from_str(
            r#"{"items":[{"id":{"kind":"youtube#video","videoId":"a"}},{"id":{"kind":"youtube#channel"}},{"id":{"videoId":"b"}}]}"#,
        )
        .unwrap();
        assert_eq!(video_ids(&search), vec!["a", "b"]);

        let videos: VideoListResponse = serde_json::from_str(
            r#"{"items":[
                {"status":{"privacyStatus":"private","publishAt":"2025-02-07T11:00:00Z"}},
                {"status":{"privacyStatus":"public"}},
                {"status":{"publishAt":"2025-02-08T21:00:00.000Z"}},
                {"status":{"publishAt":"not a date"}}
            ]}"#,
        )
        .unwrap();
        let latest = latest_publish_at(&videos).unwrap();
        assert_eq!(latest.with_timezone(&Utc).to_rfc3339(), "2025-02-08T21:00:00+00:00");
        assert!(latest_publish_at(&VideoListResponse::default()).is_none());
    }
}
