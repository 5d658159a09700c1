use crate::api::body_snippet;
use crate::fetcher::MediaSource;
use crate::logw;
use crate::media::{MediaKind, RemoteMedia};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const PIXABAY_BASE: &str = "https://pixabay.com/api";

#[derive(Debug, Deserialize)]
struct Hits<T> {
    #[serde(default = "Vec::new")]
    hits: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PixabayVideo {
    id: u64,
    #[serde(default)]
    duration: Option<f64>,
    videos: Renditions,
}

#[derive(Debug, Deserialize)]
struct Renditions {
    #[serde(default)]
    medium: Option<Rendition>,
    #[serde(default)]
    small: Option<Rendition>,
}

#[derive(Debug, Clone, Deserialize)]
struct Rendition {
    url: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PixabayImage {
    id: u64,
    #[serde(rename = "largeImageURL")]
    large_image_url: String,
    #[serde(rename = "imageWidth", default)]
    image_width: Option<u32>,
    #[serde(rename = "imageHeight", default)]
    image_height: Option<u32>,
}

impl Renditions {
    /// `medium` when it exists and carries a URL, otherwise `small`.
    fn best(&self) -> Option<&Rendition> {
        self.medium
            .as_ref()
            .filter(|r| !r.url.is_empty())
            .or(self.small.as_ref().filter(|r| !r.url.is_empty()))
    }
}

pub struct PixabaySource {
    client: Client,
    api_key: String,
}

impl PixabaySource {
    pub fn new(client: Client, api_key: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
        }
    }

    async fn search<T: for<'de> Deserialize<'de>>(&self, url: &str, params: &[(&str, String)]) -> Result<Vec<T>> {
        let resp = self
            .client
            .get(url)
            .query(&[("key", self.api_key.as_str())])
            .query(params)
            .send()
            .await
            .context("Pixabay request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            logw(format!(
                "Pixabay search HTTP {} ({})",
                status.as_u16(),
                body_snippet(&body)
            ));
            return Ok(Vec::new());
        }
        let parsed = resp
            .json::<Hits<T>>()
            .await
            .context("Pixabay response parse failed")?;
        Ok(parsed.hits)
    }
}

#[async_trait]
impl MediaSource for PixabaySource {
    fn name(&self) -> &str {
        "pixabay"
    }

    async fn search_videos(&self, query: &str, count: usize) -> Result<Vec<RemoteMedia>> {
        // Pixabay rejects per_page below 3.
        let params = [("q", query.to_string()), ("per_page", count.max(3).to_string())];
        let hits: Vec<PixabayVideo> = self.search(&format!("{PIXABAY_BASE}/videos/"), &params).await?;

        Ok(hits
            .into_iter()
            .take(count)
            .filter_map(|v| {
                let rendition = v.videos.best()?.clone();
                Some(RemoteMedia {
                    provider: self.name().to_string(),
                    source_id: v.id.to_string(),
                    kind: MediaKind::Video,
                    url: rendition.url,
                    duration: v.duration,
                    width: rendition.width,
                    height: rendition.height,
                })
            })
            .collect())
    }

    async fn search_images(&self, query: &str, count: usize) -> Result<Vec<RemoteMedia>> {
        let params = [
            ("q", query.to_string()),
            ("per_page", count.max(3).to_string()),
            ("orientation", "vertical".to_string()),
            ("image_type", "photo".to_string()),
        ];
        let hits: Vec<PixabayImage> = self.search(&format!("{PIXABAY_BASE}/"), &params).await?;

        Ok(hits
            .into_iter()
            .take(count)
            .map(|img| RemoteMedia {
                provider: self.name().to_string(),
                source_id: img.id.to_string(),
                kind: MediaKind::Image,
                url: img.large_image_url,
                duration: None,
                width: img.image_width,
                height: img.image_height,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medium_rendition_preferred_then_small() {
        let hits: Hits<PixabayVideo> = serde_json::from_str(
            r#"{"hits":[
                {"id":1,"duration":12,"videos":{"medium":{"url":"m","width":1280,"height":720},"small":{"url":"s"}}},
                {"id":2,"duration":30,"videos":{"medium":{"url":""},"small":{"url":"s2","width":640,"height":360}}},
                {"id":3,"videos":{}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(hits.hits[0].videos.best().unwrap().url, "m");
        assert_eq!(hits.hits[1].videos.best().unwrap().url, "s2");
        assert!(hits.hits[2].videos.best().is_none());
    }

    #[test]
    fn image_hits_parse() {
        let hits: Hits<PixabayImage> = serde_json::from_str(
            r#"{"total":1,"hits":[{"id":9,"largeImageURL":"L","imageWidth":1080,"imageHeight":1920}]}"#,
        )
        .unwrap();
        assert_eq!(hits.hits[0].large_image_url, "L");
        assert_eq!(hits.hits[0].image_height, Some(1920));
    }
}
