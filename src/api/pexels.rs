use crate::api::body_snippet;
use crate::fetcher::MediaSource;
use crate::logw;
use crate::media::{MediaKind, RemoteMedia};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const PEXELS_BASE: &str = "https://api.pexels.com";
const MAX_FILE_HEIGHT: u32 = 1920;

#[derive(Debug, Deserialize)]
struct VideoSearch {
    #[serde(default)]
    videos: Vec<PexelsVideo>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideo {
    id: u64,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    video_files: Vec<VideoFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct VideoFile {
    #[serde(default)]
    file_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    link: String,
}

#[derive(Debug, Deserialize)]
struct PhotoSearch {
    #[serde(default)]
    photos: Vec<PexelsPhoto>,
}

#[derive(Debug, Deserialize)]
struct PexelsPhoto {
    id: u64,
    width: Option<u32>,
    height: Option<u32>,
    src: PhotoSources,
}

#[derive(Debug, Deserialize)]
struct PhotoSources {
    #[serde(default)]
    large2x: Option<String>,
    #[serde(default)]
    original: Option<String>,
}

/// Picks the mp4 rendition closest to a full portrait frame: portrait files
/// win over landscape ones, then the tallest file not above 1920 rows.
fn best_file(files: &[VideoFile]) -> Option<&VideoFile> {
    files
        .iter()
        .filter(|f| f.file_type.as_deref().map_or(true, |t| t == "video/mp4"))
        .filter(|f| f.height.unwrap_or(0) <= MAX_FILE_HEIGHT)
        .max_by_key(|f| {
            let (w, h) = (f.width.unwrap_or(0), f.height.unwrap_or(0));
            (h >= w, h)
        })
}

pub struct PexelsSource {
    client: Client,
    api_key: String,
}

impl PexelsSource {
    pub fn new(client: Client, api_key: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str, query: &[(&str, String)]) -> Result<Option<T>> {
        let resp = self
            .client
            .get(url)
            .header("Authorization", &self.api_key)
            .query(query)
            .send()
            .await
            .context("Pexels request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            logw(format!(
                "Pexels search HTTP {} ({})",
                status.as_u16(),
                body_snippet(&body)
            ));
            return Ok(None);
        }
        let parsed = resp.json::<T>().await.context("Pexels response parse failed")?;
        Ok(Some(parsed))
    }
}

#[async_trait]
impl MediaSource for PexelsSource {
    fn name(&self) -> &str {
        "pexels"
    }

    async fn search_videos(&self, query: &str, count: usize) -> Result<Vec<RemoteMedia>> {
        let url = format!("{PEXELS_BASE}/videos/search");
        let params = [
            ("query", query.to_string()),
            ("per_page", count.to_string()),
            ("orientation", "portrait".to_string()),
        ];
        let Some(search) = self.get_json::<VideoSearch>(&url, &params).await? else {
            return Ok(Vec::new());
        };

        Ok(search
            .videos
            .into_iter()
            .filter_map(|v| {
                let file = best_file(&v.video_files)?.clone();
                Some(RemoteMedia {
                    provider: self.name().to_string(),
                    source_id: v.id.to_string(),
                    kind: MediaKind::Video,
                    url: file.link,
                    duration: v.duration,
                    width: file.width,
                    height: file.height,
                })
            })
            .collect())
    }

    async fn search_images(&self, query: &str, count: usize) -> Result<Vec<RemoteMedia>> {
        let url = format!("{PEXELS_BASE}/v1/search");
        let params = [
            ("query", query.to_string()),
            ("per_page", count.to_string()),
            ("orientation", "portrait".to_string()),
        ];
        let Some(search) = self.get_json::<PhotoSearch>(&url, &params).await? else {
            return Ok(Vec::new());
        };

        Ok(search
            .photos
            .into_iter()
            .filter_map(|p| {
                let url = p.src.large2x.or(p.src.original)?;
                Some(RemoteMedia {
                    provider: self.name().to_string(),
                    source_id: p.id.to_string(),
                    kind: MediaKind::Image,
                    url,
                    duration: None,
                    width: p.width,
                    height: p.height,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_tallest_portrait_mp4() {
        let search: VideoSearch = serde_json::from_str(
            r#"{"videos":[{"id":7,"duration":14,"video_files":[
                {"file_type":"video/mp4","width":1920,"height":1080,"link":"land"},
                {"file_type":"video/mp4","width":720,"height":1280,"link":"p720"},
                {"file_type":"video/mp4","width":1080,"height":1920,"link":"p1080"},
                {"file_type":"video/mp4","width":2160,"height":3840,"link":"p4k"},
                {"file_type":"video/webm","width":1080,"height":1920,"link":"webm"}
            ]}]}"#,
        )
        .unwrap();
        let file = best_file(&search.videos[0].video_files).unwrap();
        assert_eq!(file.link, "p1080");
        assert_eq!(search.videos[0].duration, Some(14.0));
    }

    #[test]
    fn landscape_only_still_yields_a_file() {
        let files = vec![VideoFile {
            file_type: None,
            width: Some(1280),
            height: Some(720),
            link: "only".to_string(),
        }];
        assert_eq!(best_file(&files).unwrap().link, "only");
    }
}
