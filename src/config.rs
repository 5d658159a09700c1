use crate::assembler::AssemblyConfig;
use crate::captions::CaptionConfig;
use crate::logw;
use crate::render::RenderConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub keys: ApiKeys,
    pub paths: Workspace,
    pub assembly: AssemblyConfig,
    pub captions: CaptionConfig,
    pub render: RenderConfig,
    pub narrator: NarratorConfig,
    pub schedule: ScheduleConfig,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub pexels_api_key: String,
    pub pixabay_api_key: String,
    #[serde(rename = "google_api_key")]
    pub google_tts_api_key: String,
    pub elevenlabs_api_key: String,
    pub jamendo_client_id: String,
    pub youtube: YouTubeKeys,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct YouTubeKeys {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

/// Directories one pipeline instance reads and writes. Nothing else in the
/// crate builds paths from fixed relative names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Workspace {
    pub scripts: PathBuf,
    pub scripts_done: PathBuf,
    pub work: PathBuf,
    pub music: PathBuf,
    pub output: PathBuf,
    pub outbox: PathBuf,
    pub backup: PathBuf,
    pub fonts: PathBuf,
}

impl Default for Workspace {
    fn default() -> Self {
        Self {
            scripts: PathBuf::from("scripts"),
            scripts_done: PathBuf::from("scripts/done"),
            work: PathBuf::from("work"),
            music: PathBuf::from("backgroundmusic"),
            output: PathBuf::from("output"),
            outbox: PathBuf::from("tiktok_output"),
            backup: PathBuf::from("output_backup"),
            fonts: PathBuf::from("fonts"),
        }
    }
}

impl Workspace {
    /// Default layout below `root`.
    pub fn rooted<P: AsRef<Path>>(root: P) -> Self {
        Self::default().under(root)
    }

    /// Re-anchors every relative directory below `root`.
    pub fn under<P: AsRef<Path>>(self, root: P) -> Self {
        let root = root.as_ref();
        let anchor = |p: PathBuf| if p.is_absolute() { p } else { root.join(p) };
        Self {
            scripts: anchor(self.scripts),
            scripts_done: anchor(self.scripts_done),
            work: anchor(self.work),
            music: anchor(self.music),
            output: anchor(self.output),
            outbox: anchor(self.outbox),
            backup: anchor(self.backup),
            fonts: anchor(self.fonts),
        }
    }

    pub fn all_dirs(&self) -> [&Path; 8] {
        [
            &self.scripts,
            &self.scripts_done,
            &self.work,
            &self.music,
            &self.output,
            &self.outbox,
            &self.backup,
            &self.fonts,
        ]
    }

    /// Scratch directory owned by a single script's run.
    pub fn run_dir(&self, script_stem: &str) -> PathBuf {
        self.work.join(script_stem)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarratorProvider {
    #[default]
    Google,
    ElevenLabs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarratorConfig {
    pub provider: NarratorProvider,
    pub language_code: String,
    pub voice_name: String,
    pub speaking_rate: f64,
    pub pitch: f64,
    pub eleven_voice_id: String,
    pub eleven_model_id: String,
    /// Silence reserved for fragments that have no text.
    pub silence_gap: f64,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            provider: NarratorProvider::Google,
            language_code: "pt-BR".to_string(),
            voice_name: "pt-BR-Wavenet-A".to_string(),
            speaking_rate: 1.0,
            pitch: 2.0,
            eleven_voice_id: "JBFqnCBsd6RMkjVDRZzb".to_string(),
            eleven_model_id: "eleven_multilingual_v2".to_string(),
            silence_gap: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Daily publish times, `HH:MM`, local time.
    pub slots: Vec<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            slots: vec!["08:00".to_string(), "12:00".to_string(), "18:00".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub youtube: bool,
    pub outbox: bool,
    pub category_id: String,
    pub privacy_status: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            youtube: false,
            outbox: true,
            category_id: "24".to_string(),
            privacy_status: "private".to_string(),
        }
    }
}

fn fill_from_env(slot: &mut String, var: &str) {
    if slot.trim().is_empty() {
        if let Ok(value) = std::env::var(var) {
            *slot = value.trim().to_string();
        }
    }
}

impl Config {
    /// Reads `path`, falling back to defaults when the file does not exist.
    /// Empty credentials are filled from the environment.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if fs::metadata(path).await.is_ok() {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            logw(format!(
                "Config {} not found; using defaults and environment variables",
                path.display()
            ));
            Config::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        let keys = &mut self.keys;
        fill_from_env(&mut keys.pexels_api_key, "PEXELS_API_KEY");
        fill_from_env(&mut keys.pixabay_api_key, "PIXABAY_API_KEY");
        fill_from_env(&mut keys.google_tts_api_key, "GOOGLE_API_KEY");
        fill_from_env(&mut keys.elevenlabs_api_key, "ELEVENLABS_API_KEY");
        fill_from_env(&mut keys.jamendo_client_id, "JAMENDO_CLIENT_ID");
        fill_from_env(&mut keys.youtube.client_id, "YOUTUBE_CLIENT_ID");
        fill_from_env(&mut keys.youtube.client_secret, "YOUTUBE_CLIENT_SECRET");
        fill_from_env(&mut keys.youtube.refresh_token, "YOUTUBE_REFRESH_TOKEN");
    }

    /// Lists every credential an enabled provider needs but does not have.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let keys = &self.keys;
        let mut missing = Vec::new();

        if keys.pexels_api_key.is_empty() && keys.pixabay_api_key.is_empty() {
            missing.push("pexels_api_key or pixabay_api_key");
        }
        match self.narrator.provider {
            NarratorProvider::Google if keys.google_tts_api_key.is_empty() => {
                missing.push("google_api_key")
            }
            NarratorProvider::ElevenLabs if keys.elevenlabs_api_key.is_empty() => {
                missing.push("elevenlabs_api_key")
            }
            _ => {}
        }
        if self.publish.youtube {
            if keys.youtube.client_id.is_empty() {
                missing.push("youtube.client_id");
            }
            if keys.youtube.client_secret.is_empty() {
                missing.push("youtube.client_secret");
            }
            if keys.youtube.refresh_token.is_empty() {
                missing.push("youtube.refresh_token");
            }
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: Config = serde_json::from_str(
            r#"{ "keys": { "pexels_api_key": "abc" }, "assembly": { "per_clip_cap": 6.0 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.keys.pexels_api_key, "abc");
        assert_eq!(cfg.assembly.per_clip_cap, 6.0);
        assert_eq!(cfg.assembly.sanity_ceiling, 200.0);
        assert_eq!(cfg.render.width, 1080);
        assert_eq!(cfg.schedule.slots.len(), 3);
        assert_eq!(cfg.paths.scripts, PathBuf::from("scripts"));
    }

    #[test]
    fn workspace_is_rooted_per_run() {
        let ws = Workspace::rooted("/tmp/run-a");
        assert_eq!(ws.output, PathBuf::from("/tmp/run-a/output"));
        assert_eq!(ws.run_dir("Cachoeiras"), PathBuf::from("/tmp/run-a/work/Cachoeiras"));
    }

    #[test]
    fn missing_credentials_follow_enabled_providers() {
        let mut cfg = Config::default();
        cfg.keys.pixabay_api_key = "k".to_string();
        cfg.keys.google_tts_api_key = "g".to_string();
        assert!(cfg.missing_credentials().is_empty());

        cfg.publish.youtube = true;
        cfg.keys.youtube.client_id = "id".to_string();
        assert_eq!(
            cfg.missing_credentials(),
            vec!["youtube.client_secret", "youtube.refresh_token"]
        );
    }
}
