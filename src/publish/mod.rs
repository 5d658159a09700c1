//! Upload targets for rendered videos.

pub mod outbox;
pub mod youtube;

use crate::config::Config;
use crate::script::ScriptFile;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub use outbox::OutboxPublisher;
pub use youtube::YouTubePublisher;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadMeta {
    pub title: String,
    pub description: String,
    /// Hashtag words without the leading `#`.
    pub tags: Vec<String>,
}

impl UploadMeta {
    pub fn for_script(stem: &str, script: &ScriptFile) -> Self {
        let title = script
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("{} - #Shorts", stem));
        let description = script
            .hashtags
            .clone()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| "#Shorts".to_string());
        let tags = hashtag_words(&description);
        Self {
            title,
            description,
            tags,
        }
    }
}

pub fn hashtag_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|w| w.strip_prefix('#'))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;
    /// Furthest publish time already booked on this target, if it keeps one.
    async fn last_scheduled(&self) -> Result<Option<DateTime<FixedOffset>>> {
        Ok(None)
    }
    /// `Ok(false)` means the target refused the upload.
    async fn upload(&self, file: &Path, meta: &UploadMeta, scheduled_time: DateTime<FixedOffset>) -> Result<bool>;
}

/// Enabled publishers in a fixed order: YouTube first, then the outbox.
pub fn make_publishers(cfg: &Config, client: Client) -> Vec<Box<dyn Publisher>> {
    let mut out: Vec<Box<dyn Publisher>> = Vec::new();
    if cfg.publish.youtube {
        out.push(Box::new(YouTubePublisher::new(
            client,
            &cfg.keys.youtube,
            &cfg.publish,
        )));
    }
    if cfg.publish.outbox {
        out.push(Box::new(OutboxPublisher::new(cfg.paths.outbox.clone())));
    }
    out
}

/// Latest slot already booked across `publishers`. Lookup failures are logged
/// and ignored.
pub async fn latest_scheduled(publishers: &[Box<dyn Publisher>]) -> Option<DateTime<FixedOffset>> {
    let mut latest = None;
    for publisher in publishers {
        match publisher.last_scheduled().await {
            Ok(Some(at)) => {
                logi(format!("{} has uploads booked until {}", publisher.name(), at.to_rfc3339()));
                latest = latest.max(Some(at));
            }
            Ok(None) => {}
            Err(err) => logw(format!("{} schedule lookup failed: {:#}", publisher.name(), err)),
        }
    }
    latest
}

/// Moves `file` into `dir`, copying when a rename crosses filesystems.
pub async fn move_into(file: &Path, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create {}", dir.display()))?;
    let name = file
        .file_name()
        .with_context(|| format!("no file name: {}", file.display()))?;
    let dest = dir.join(name);
    if fs::rename(file, &dest).await.is_err() {
        fs::copy(file, &dest)
            .await
            .with_context(|| format!("copy {} -> {}", file.display(), dest.display()))?;
        fs::remove_file(file)
            .await
            .with_context(|| format!("remove {}", file.display()))?;
    }
    Ok(dest)
}

/// Hands `file` to every publisher. Failures are logged only; after at least
/// one success the file is moved to `backup_dir`. Returns the success count.
pub async fn publish_all(
    publishers: &[Box<dyn Publisher>],
    file: &Path,
    meta: &UploadMeta,
    scheduled_time: DateTime<FixedOffset>,
    backup_dir: &Path,
) -> usize {
    let mut uploaded = 0;
    for publisher in publishers {
        logi(format!(
            "Publishing {} via {} for {}",
            file.display(),
            publisher.name(),
            scheduled_time.to_rfc3339()
        ));
        match publisher.upload(file, meta, scheduled_time).await {
            Ok(true) => {
                logok(format!("{} accepted {}", publisher.name(), file.display()));
                uploaded += 1;
            }
            Ok(false) => logw(format!("{} rejected {}", publisher.name(), file.display())),
            Err(err) => logw(format!("{} upload failed: {:#}", publisher.name(), err)),
        }
    }

    if uploaded > 0 {
        match move_into(file, backup_dir).await {
            Ok(dest) => logi(format!("Moved to backup: {}", dest.display())),
            Err(err) => logw(format!("Backup move failed: {:#}", err)),
        }
    }
    uploaded
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(bool);

    #[async_trait]
    impl Publisher for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn upload(&self, _file: &Path, _meta: &UploadMeta, _at: DateTime<FixedOffset>) -> Result<bool> {
            Ok(self.0)
        }
    }

    struct Booked(Option<&'static str>);

    #[async_trait]
    impl Publisher for Booked {
        fn name(&self) -> &str {
            "booked"
        }

        async fn last_scheduled(&self) -> Result<Option<DateTime<FixedOffset>>> {
            match self.0 {
                Some("error") => anyhow::bail!("quota exceeded"),
                Some(at) => Ok(Some(DateTime::parse_from_rfc3339(at)?)),
                None => Ok(None),
            }
        }

        async fn upload(&self, _file: &Path, _meta: &UploadMeta, _at: DateTime<FixedOffset>) -> Result<bool> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn latest_booking_across_publishers() {
        let publishers: Vec<Box<dyn Publisher>> = vec![
            Box::new(Booked(Some("2025-02-08T11:00:00Z"))),
            Box::new(Booked(Some("error"))),
            Box::new(Booked(None)),
            Box::new(Booked(Some("2025-02-08T18:00:00-03:00"))),
        ];
        let latest = latest_scheduled(&publishers).await.unwrap();
        assert_eq!(latest.to_rfc3339(), "2025-02-08T18:00:00-03:00");
        assert_eq!(latest_scheduled(&[Box::new(Fixed(true)) as Box<dyn Publisher>]).await, None);
    }

    fn when() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2025-02-06T18:00:00-03:00").unwrap()
    }

    fn meta() -> UploadMeta {
        UploadMeta {
            title: "t".to_string(),
            description: "#a".to_string(),
            tags: vec!["a".to_string()],
        }
    }

    #[test]
    fn meta_defaults_from_stem() {
        let script = ScriptFile::default();
        let meta = UploadMeta::for_script("CachoeirasDoBrasil", &script);
        assert_eq!(meta.title, "CachoeirasDoBrasil - #Shorts");
        assert_eq!(meta.description, "#Shorts");
        assert_eq!(meta.tags, vec!["Shorts"]);
    }

    #[test]
    fn meta_uses_script_title_and_hashtags() {
        let script = ScriptFile {
            title: Some("5 cachoeiras".to_string()),
            hashtags: Some("#cachoeira #brasil texto #".to_string()),
            ..ScriptFile::default()
        };
        let meta = UploadMeta::for_script("X", &script);
        assert_eq!(meta.title, "5 cachoeiras");
        assert_eq!(meta.tags, vec!["cachoeira", "brasil"]);
    }

    #[tokio::test]
    async fn failed_uploads_leave_the_render_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("v.mp4");
        fs::write(&file, b"video").await.unwrap();
        let backup = dir.path().join("backup");

        let publishers: Vec<Box<dyn Publisher>> = vec![Box::new(Fixed(false))];
        assert_eq!(publish_all(&publishers, &file, &meta(), when(), &backup).await, 0);
        assert!(file.exists());
        assert!(!backup.join("v.mp4").exists());
    }

    #[tokio::test]
    async fn one_success_moves_the_render_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("v.mp4");
        fs::write(&file, b"video").await.unwrap();
        let backup = dir.path().join("backup");

        let publishers: Vec<Box<dyn Publisher>> = vec![Box::new(Fixed(false)), Box::new(Fixed(true))];
        assert_eq!(publish_all(&publishers, &file, &meta(), when(), &backup).await, 1);
        assert!(!file.exists());
        assert!(backup.join("v.mp4").exists());
    }

    #[test]
    fn publishers_follow_config() {
        let mut cfg = Config::default();
        let names: Vec<String> = make_publishers(&cfg, Client::new())
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["outbox"]);
        cfg.publish.youtube = true;
        cfg.publish.outbox = false;
        let names: Vec<String> = make_publishers(&cfg, Client::new())
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["youtube"]);
    }
}
