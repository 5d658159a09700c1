use crate::config::NarratorConfig;
use crate::logw;
use crate::narration::Narrator;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use tokio::fs;

pub struct ElevenLabsNarrator {
    client: Client,
    api_key: String,
    voice_id: String,
    model_id: String,
}

impl ElevenLabsNarrator {
    pub fn new(client: Client, api_key: &str, cfg: &NarratorConfig) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            voice_id: cfg.eleven_voice_id.clone(),
            model_id: cfg.eleven_model_id.clone(),
        }
    }
}

#[async_trait]
impl Narrator for ElevenLabsNarrator {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    fn extension(&self) -> &str {
        "mp3"
    }

    async fn synthesize(&self, text: &str, out_path: &Path) -> Result<bool> {
        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}?output_format=mp3_44100_128",
            self.voice_id
        );

        let body = serde_json::json!({
            "text": text,
            "model_id": self.model_id,
        });

        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .timeout(std::time::Duration::from_secs(300))
            .send()
            .await
            .context("ElevenLabs request failed")?;

        if !resp.status().is_success() {
            logw(format!("ElevenLabs TTS failed HTTP {}", resp.status().as_u16()));
            return Ok(false);
        }

        let bytes = resp.bytes().await.context("ElevenLabs response read failed")?;
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }
        fs::write(out_path, &bytes).await?;

        Ok(fs::metadata(out_path).await.is_ok())
    }
}
