//! Provider-agnostic media search and download.

use crate::assembler::Assembler;
use crate::ffmpeg;
use crate::media::{MediaItem, MediaKind, RemoteMedia, aspect_of};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// A stock-media search API.
#[async_trait]
pub trait MediaSource: Send + Sync {
    fn name(&self) -> &str;
    async fn search_videos(&self, query: &str, count: usize) -> Result<Vec<RemoteMedia>>;
    async fn search_images(&self, query: &str, count: usize) -> Result<Vec<RemoteMedia>>;
}

/// Streams `url` into `dest`. Non-success statuses are logged and reported as
/// `false`; a partial file is removed.
pub async fn download_to(client: &Client, url: &str, dest: &Path) -> Result<bool> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("download request failed: {url}"))?;
    if !resp.status().is_success() {
        logw(format!("Download HTTP {} for {}", resp.status().as_u16(), url));
        return Ok(false);
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create dir {}", parent.display()))?;
    }
    let file = fs::File::create(dest)
        .await
        .with_context(|| format!("create download: {}", dest.display()))?;

    save_stream(resp.bytes_stream(), file, dest, url).await
}

/// Copies `stream` into `out`. `Ok(Some(reason))` means the stream broke off.
async fn copy_stream<S, B, E, W>(stream: &mut S, out: &mut W) -> Result<Option<String>>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => out.write_all(bytes.as_ref()).await.context("write download")?,
            Err(err) => return Ok(Some(err.to_string())),
        }
    }
    out.flush().await.context("flush download")?;
    Ok(None)
}

/// Writes `stream` through `out` into `dest`. Anything short of a complete
/// file is removed.
async fn save_stream<S, B, E, W>(mut stream: S, mut out: W, dest: &Path, url: &str) -> Result<bool>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    W: AsyncWrite + Unpin,
{
    let copied = copy_stream(&mut stream, &mut out).await;
    drop(out);
    match copied {
        Ok(None) => Ok(fs::metadata(dest).await.map(|m| m.len() > 0).unwrap_or(false)),
        Ok(Some(reason)) => {
            let _ = fs::remove_file(dest).await;
            logw(format!("Download interrupted for {}: {}", url, reason));
            Ok(false)
        }
        Err(err) => {
            let _ = fs::remove_file(dest).await;
            Err(err.context(format!("download {} -> {}", url, dest.display())))
        }
    }
}

/// Takes hits in order, at most `max_candidates` of them, until the items
/// obtained so far offer `target_duration` usable seconds.
pub(crate) async fn collect_until_covered<F, Fut>(
    hits: Vec<RemoteMedia>,
    assembler: &Assembler,
    target_duration: f64,
    mut download: F,
) -> (Vec<MediaItem>, f64)
where
    F: FnMut(RemoteMedia) -> Fut,
    Fut: Future<Output = Result<Option<MediaItem>>>,
{
    let scan_limit = assembler.config().max_candidates.unwrap_or(usize::MAX);
    let mut items = Vec::new();
    let mut usable = 0.0;
    for remote in hits.into_iter().take(scan_limit) {
        if usable >= target_duration {
            break;
        }
        let url = remote.url.clone();
        match download(remote).await {
            Ok(Some(item)) => {
                usable += assembler.usable_duration(&item).unwrap_or(0.0);
                items.push(item);
            }
            Ok(None) => {}
            Err(err) => logw(format!("Download failed for {}: {:#}", url, err)),
        }
    }
    (items, usable)
}

/// Removes repeats and sources the assembler would reject anyway, keeping the
/// first occurrence of each `(provider, id)`.
pub fn prefilter(candidates: Vec<RemoteMedia>, sanity_ceiling: f64) -> Vec<RemoteMedia> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert((c.provider.clone(), c.source_id.clone())))
        .filter(|c| match (c.kind, c.duration) {
            (MediaKind::Video, Some(d)) => d > 0.0 && d <= sanity_ceiling,
            _ => true,
        })
        .collect()
}

pub struct Fetcher {
    client: Client,
    sources: Vec<Box<dyn MediaSource>>,
    videos_per_query: usize,
    images_per_query: usize,
}

impl Fetcher {
    pub fn new(client: Client, videos_per_query: usize, images_per_query: usize) -> Self {
        Self {
            client,
            sources: Vec::new(),
            videos_per_query,
            images_per_query,
        }
    }

    pub fn with_source(mut self, source: Box<dyn MediaSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn has_sources(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Search hits for `query`: every provider's videos, then every provider's
    /// images. A failing provider contributes nothing.
    pub async fn search(&self, query: &str) -> Vec<RemoteMedia> {
        let mut hits = Vec::new();
        for source in &self.sources {
            match source.search_videos(query, self.videos_per_query).await {
                Ok(found) => {
                    logi(format!("{}: {} videos for '{}'", source.name(), found.len(), query));
                    hits.extend(found);
                }
                Err(err) => logw(format!("{} video search failed: {:#}", source.name(), err)),
            }
        }
        if self.images_per_query > 0 {
            for source in &self.sources {
                match source.search_images(query, self.images_per_query).await {
                    Ok(found) => {
                        logi(format!("{}: {} images for '{}'", source.name(), found.len(), query));
                        hits.extend(found);
                    }
                    Err(err) => logw(format!("{} image search failed: {:#}", source.name(), err)),
                }
            }
        }
        hits
    }

    /// Downloads one hit into `dir` and measures it. Videos that cannot be
    /// probed are dropped.
    pub async fn download(&self, remote: &RemoteMedia, dir: &Path) -> Result<Option<MediaItem>> {
        let dest: PathBuf = dir.join(remote.file_name());
        if !download_to(&self.client, &remote.url, &dest).await? {
            return Ok(None);
        }

        let probed = ffmpeg::ffprobe_video_dimensions(&dest).await.ok();
        let aspect_ratio = match probed {
            Some((w, h)) => aspect_of(Some(w), Some(h)),
            None => aspect_of(remote.width, remote.height),
        };

        let native_duration = match remote.kind {
            MediaKind::Image => None,
            MediaKind::Video => match ffmpeg::ffprobe_duration_seconds(&dest).await {
                Ok(d) => Some(d),
                Err(err) => {
                    logw(format!("Dropping {}: {}", dest.display(), err));
                    let _ = fs::remove_file(&dest).await;
                    return Ok(None);
                }
            },
        };

        Ok(Some(MediaItem {
            source_id: format!("{}:{}", remote.provider, remote.source_id),
            kind: remote.kind,
            local_path: dest,
            native_duration,
            aspect_ratio,
        }))
    }

    /// Searches every query in turn and downloads hits until the candidates
    /// downloaded so far could fill `target_duration` on their own.
    pub async fn fetch_candidates(
        &self,
        queries: &[&str],
        dir: &Path,
        assembler: &Assembler,
        target_duration: f64,
    ) -> Result<Vec<MediaItem>> {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("create download dir: {}", dir.display()))?;

        let mut hits = Vec::new();
        for query in queries {
            hits.extend(self.search(query).await);
        }
        let hits = prefilter(hits, assembler.config().sanity_ceiling);
        let (items, usable) = collect_until_covered(hits, assembler, target_duration, move |remote| async move {
            self.download(&remote, dir).await
        })
        .await;

        logok(format!(
            "Fetched {} candidates ({:.2}s usable for {:.2}s target)",
            items.len(),
            usable,
            target_duration
        ));
        Ok(items)
    }
}
