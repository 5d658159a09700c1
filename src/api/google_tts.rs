use crate::api::body_snippet;
use crate::config::NarratorConfig;
use crate::ffmpeg::NARRATION_SAMPLE_RATE;
use crate::logw;
use crate::narration::Narrator;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tokio::fs;

const TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";
const EFFECTS_PROFILE: &str = "small-bluetooth-speaker-class-device";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: String,
}

pub struct GoogleNarrator {
    client: Client,
    api_key: String,
    cfg: NarratorConfig,
}

impl GoogleNarrator {
    pub fn new(client: Client, api_key: &str, cfg: &NarratorConfig) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            cfg: cfg.clone(),
        }
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        json!({
            "input": { "text": text },
            "voice": {
                "languageCode": self.cfg.language_code,
                "name": self.cfg.voice_name,
            },
            "audioConfig": {
                "audioEncoding": "LINEAR16",
                "sampleRateHertz": NARRATION_SAMPLE_RATE,
                "effectsProfileId": [EFFECTS_PROFILE],
                "speakingRate": self.cfg.speaking_rate,
                "pitch": self.cfg.pitch,
            }
        })
    }
}

/// Decodes the `audioContent` payload. LINEAR16 responses already carry a WAV
/// header.
fn decode_audio(resp: &SynthesizeResponse) -> Result<Vec<u8>> {
    if resp.audio_content.is_empty() {
        anyhow::bail!("empty audioContent");
    }
    STANDARD
        .decode(resp.audio_content.as_bytes())
        .context("audioContent is not valid base64")
}

#[async_trait]
impl Narrator for GoogleNarrator {
    fn name(&self) -> &str {
        "google"
    }

    fn extension(&self) -> &str {
        "wav"
    }

    async fn synthesize(&self, text: &str, out_path: &Path) -> Result<bool> {
        let resp = self
            .client
            .post(TTS_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.request_body(text))
            .send()
            .await
            .context("Google TTS request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            logw(format!(
                "Google TTS failed HTTP {} ({})",
                status.as_u16(),
                body_snippet(&body)
            ));
            return Ok(false);
        }

        let parsed = resp
            .json::<SynthesizeResponse>()
            .await
            .context("Google TTS response parse failed")?;
        let audio = match decode_audio(&parsed) {
            Ok(bytes) => bytes,
            Err(err) => {
                logw(format!("Google TTS returned unusable audio: {}", err));
                return Ok(false);
            }
        };

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }
        fs::write(out_path, &audio).await?;
        Ok(fs::metadata(out_path).await.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_audio_content() {
        let resp: SynthesizeResponse =
            serde_json::from_str(r#"{"audioContent":"UklGRg=="}"#).unwrap();
        assert_eq!(decode_audio(&resp).unwrap(), b"RIFF");
    }

    #[test]
    fn empty_audio_is_rejected() {
        let resp: SynthesizeResponse = serde_json::from_str("{}").unwrap();
        assert!(decode_audio(&resp).is_err());
    }

    #[test]
    fn body_carries_voice_settings() {
        let client = reqwest::Client::new();
        let narrator = GoogleNarrator::new(client, "k", &NarratorConfig::default());
        let body = narrator.request_body("olá");
        assert_eq!(body["voice"]["name"], "pt-BR-Wavenet-A");
        assert_eq!(body["audioConfig"]["audioEncoding"], "LINEAR16");
        assert_eq!(body["audioConfig"]["sampleRateHertz"], 44100);
        assert_eq!(body["audioConfig"]["pitch"], 2.0);
        assert_eq!(body["input"]["text"], "olá");
    }
}
