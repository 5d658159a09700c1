use super::{Publisher, UploadMeta};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Serialize)]
struct Sidecar<'a> {
    title: &'a str,
    description: &'a str,
    tags: &'a [String],
    scheduled_time: String,
}

#[derive(Debug, Deserialize)]
struct Booked {
    scheduled_time: String,
}

/// Drops the video and a JSON sidecar into a folder for manual or external
/// posting.
pub struct OutboxPublisher {
    dir: PathBuf,
}

impl OutboxPublisher {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl Publisher for OutboxPublisher {
    fn name(&self) -> &str {
        "outbox"
    }

    /// Latest `scheduled_time` among the sidecars still waiting in the outbox.
    async fn last_scheduled(&self) -> Result<Option<DateTime<FixedOffset>>> {
        if !fs::try_exists(&self.dir).await.unwrap_or(false) {
            return Ok(None);
        }
        let mut latest = None;
        let mut entries = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("read outbox {}", self.dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(text) = fs::read_to_string(&path).await else {
                continue;
            };
            let at = serde_json::from_str::<Booked>(&text)
                .ok()
                .and_then(|b| DateTime::parse_from_rfc3339(&b.scheduled_time).ok());
            latest = latest.max(at);
        }
        Ok(latest)
    }

    async fn upload(&self, file: &Path, meta: &UploadMeta, scheduled_time: DateTime<FixedOffset>) -> Result<bool> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create outbox {}", self.dir.display()))?;
        let name = file
            .file_name()
            .with_context(|| format!("no file name: {}", file.display()))?;
        let dest = self.dir.join(name);
        fs::copy(file, &dest)
            .await
            .with_context(|| format!("copy {} -> {}", file.display(), dest.display()))?;

        let sidecar = Sidecar {
            title: &meta.title,
            description: &meta.description,
            tags: &meta.tags,
            scheduled_time: scheduled_time.to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&sidecar)?;
        let sidecar_path = dest.with_extension("json");
        fs::write(&sidecar_path, json)
            .await
            .with_context(|| format!("write sidecar {}", sidecar_path.display()))?;
        Ok(true)
    }
}
