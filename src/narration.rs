use crate::api::elevenlabs::ElevenLabsNarrator;
use crate::api::google_tts::GoogleNarrator;
use crate::captions::NarrationFragment;
use crate::config::{Config, NarratorProvider};
use crate::error::StageError;
use crate::ffmpeg;
use crate::script::ScriptFragment;
use crate::{logi, logok};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};

/// Text-to-speech backend.
#[async_trait]
pub trait Narrator: Send + Sync {
    fn name(&self) -> &str;
    /// Extension of the files `synthesize` writes.
    fn extension(&self) -> &str;
    /// Writes speech for `text` to `out_path`. `Ok(false)` means the service
    /// answered but produced nothing usable.
    async fn synthesize(&self, text: &str, out_path: &Path) -> Result<bool>;
}

pub fn make_narrator(cfg: &Config, client: Client) -> Box<dyn Narrator> {
    match cfg.narrator.provider {
        NarratorProvider::Google => Box::new(GoogleNarrator::new(
            client,
            &cfg.keys.google_tts_api_key,
            &cfg.narrator,
        )),
        NarratorProvider::ElevenLabs => Box::new(ElevenLabsNarrator::new(
            client,
            &cfg.keys.elevenlabs_api_key,
            &cfg.narrator,
        )),
    }
}

/// Synthesized narration: fragments with measured durations and the audio
/// file backing each one, index for index.
#[derive(Debug, Clone, Default)]
pub struct Narration {
    pub fragments: Vec<NarrationFragment>,
    pub audio: Vec<PathBuf>,
}

impl Narration {
    pub fn total_duration(&self) -> f64 {
        self.fragments.iter().map(|f| f.audio_duration).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

pub fn audio_file_name(fragment: &ScriptFragment, extension: &str) -> String {
    format!(
        "narracao_{:03}_{:02}.{}",
        fragment.sequence_id, fragment.sub_index, extension
    )
}

/// Synthesizes `fragments` in order. Fragments without text get `silence_gap`
/// seconds of silence so they still occupy time on the caption track. Any
/// failure abandons the whole script.
pub async fn narrate_script(
    narrator: &dyn Narrator,
    fragments: &[ScriptFragment],
    dir: &Path,
    silence_gap: f64,
) -> Result<Narration, StageError> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        StageError::SourceUnavailable(format!("audio dir {}: {}", dir.display(), e))
    })?;

    let mut narration = Narration::default();
    for (idx, fragment) in fragments.iter().enumerate() {
        let text = fragment.text.trim();
        let out = if text.is_empty() {
            let out = dir.join(audio_file_name(fragment, "wav"));
            let made = ffmpeg::ffmpeg_silence(silence_gap, &out)
                .await
                .map_err(|e| StageError::SourceUnavailable(format!("silence: {e:#}")))?;
            if !made {
                return Err(StageError::SourceUnavailable(format!(
                    "silence not written: {}",
                    out.display()
                )));
            }
            out
        } else {
            let out = dir.join(audio_file_name(fragment, narrator.extension()));
            logi(format!(
                "TTS {}/{} via {}: {}",
                idx + 1,
                fragments.len(),
                narrator.name(),
                text
            ));
            let ok = narrator
                .synthesize(text, &out)
                .await
                .map_err(|e| StageError::ExternalService(format!("{}: {e:#}", narrator.name())))?;
            if !ok {
                return Err(StageError::ExternalService(format!(
                    "{} produced no audio for fragment {}.{}",
                    narrator.name(),
                    fragment.sequence_id,
                    fragment.sub_index
                )));
            }
            out
        };

        let duration = ffmpeg::ffprobe_duration_seconds(&out)
            .await
            .map_err(|e| StageError::SourceUnavailable(format!("{}: {e:#}", out.display())))?;

        narration.fragments.push(NarrationFragment {
            sequence_id: fragment.sequence_id,
            sub_index: fragment.sub_index,
            text: text.to_string(),
            audio_duration: duration,
        });
        narration.audio.push(out);
    }

    logok(format!(
        "Narration ready: {} fragments, {:.2}s",
        narration.fragments.len(),
        narration.total_duration()
    ));
    Ok(narration)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverCalled;

    #[async_trait]
    impl Narrator for NeverCalled {
        fn name(&self) -> &str {
            "never"
        }

        fn extension(&self) -> &str {
            "wav"
        }

        async fn synthesize(&self, _text: &str, _out_path: &Path) -> Result<bool> {
            panic!("no fragments to synthesize");
        }
    }

    #[test]
    fn audio_files_sort_in_fragment_order() {
        let a = ScriptFragment {
            sequence_id: 2,
            sub_index: 10,
            text: String::new(),
        };
        let b = ScriptFragment {
            sequence_id: 10,
            sub_index: 0,
            text: String::new(),
        };
        let (na, nb) = (audio_file_name(&a, "wav"), audio_file_name(&b, "mp3"));
        assert_eq!(na, "narracao_002_10.wav");
        assert!(na < nb);
    }

    #[tokio::test]
    async fn no_fragments_is_empty_narration() {
        let dir = tempfile::tempdir().unwrap();
        let narration = narrate_script(&NeverCalled, &[], dir.path(), 0.25).await.unwrap();
        assert!(narration.is_empty());
        assert_eq!(narration.total_duration(), 0.0);
    }

    #[test]
    fn provider_selects_backend() {
        let mut cfg = Config::default();
        assert_eq!(make_narrator(&cfg, Client::new()).name(), "google");
        cfg.narrator.provider = NarratorProvider::ElevenLabs;
        assert_eq!(make_narrator(&cfg, Client::new()).extension(), "mp3");
    }
}
