use crate::api::jamendo::JamendoClient;
use crate::api::pexels::PexelsSource;
use crate::api::pixabay::PixabaySource;
use crate::api::build_client;
use crate::assembler::Assembler;
use crate::captions::Synchronizer;
use crate::config::{Config, Workspace};
use crate::error::StageError;
use crate::fetcher::Fetcher;
use crate::init;
use crate::narration::{Narrator, make_narrator, narrate_script};
use crate::publish::{Publisher, UploadMeta, latest_scheduled, make_publishers, move_into, publish_all};
use crate::render::{RenderInputs, concat_narration, list_music, pick_music, render_video};
use crate::schedule::{generate_schedule, local_now, parse_slots, schedule_start};
use crate::script::{is_master_script, load_script, split_master_file};
use crate::subtitles::write_ass;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use rand::SeedableRng;
use std::ffi::OsStr;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    pub uploaded: usize,
}

fn now_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

async fn dir_exists(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

async fn ensure_dir(path: &Path) -> Result<()> {
    if !dir_exists(path).await {
        fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;
    }
    Ok(())
}

async fn clear_directory_contents(dir_path: &Path) -> Result<bool> {
    if !dir_exists(dir_path).await {
        return Ok(true);
    }

    let mut clean = true;
    for entry in WalkDir::new(dir_path).min_depth(1).contents_first(true) {
        let entry = entry?;
        let path = entry.path();
        let removed = if entry.file_type().is_dir() {
            fs::remove_dir(path).await
        } else {
            fs::remove_file(path).await
        };
        clean &= removed.is_ok();
    }

    Ok(clean)
}

/// Regular files in `dir` with extension `ext`, sorted by name.
async fn list_files_with_ext(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !dir_exists(dir).await {
        return Ok(out);
    }

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(OsStr::to_str)
            .map(|e| e.eq_ignore_ascii_case(ext))
            .unwrap_or(false);
        if matches && path.is_file() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("video")
        .to_string()
}

/// Splits every master script waiting in `scripts_dir`.
pub async fn split_pending_masters(scripts_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    for path in list_files_with_ext(scripts_dir, "txt").await? {
        if is_master_script(&path) {
            logi(format!("Splitting master script {}", path.display()));
            created.extend(split_master_file(&path, scripts_dir).await?);
        }
    }
    Ok(created)
}

/// Script files ready to be produced, in name order.
pub async fn pending_scripts(scripts_dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(list_files_with_ext(scripts_dir, "txt")
        .await?
        .into_iter()
        .filter(|p| !is_master_script(p))
        .collect())
}

/// Long-lived pieces shared by every script of a batch.
struct Pipeline {
    cfg: Config,
    assembler: Assembler,
    synchronizer: Synchronizer,
    narrator: Box<dyn Narrator>,
    fetcher: Fetcher,
    jamendo: Option<JamendoClient>,
    publishers: Vec<Box<dyn Publisher>>,
}

impl Pipeline {
    fn new(cfg: Config) -> Result<Self, StageError> {
        let client = build_client().map_err(|e| StageError::Config(format!("{e:#}")))?;
        let frame = cfg.render.frame();
        let assembler = Assembler::new(cfg.assembly.clone(), frame)?;
        let synchronizer = Synchronizer::new(cfg.captions.clone(), frame)?;

        let mut fetcher = Fetcher::new(
            client.clone(),
            cfg.assembly.videos_per_query,
            cfg.assembly.images_per_query,
        );
        if !cfg.keys.pexels_api_key.is_empty() {
            fetcher = fetcher.with_source(Box::new(PexelsSource::new(
                client.clone(),
                &cfg.keys.pexels_api_key,
            )));
        }
        if !cfg.keys.pixabay_api_key.is_empty() {
            fetcher = fetcher.with_source(Box::new(PixabaySource::new(
                client.clone(),
                &cfg.keys.pixabay_api_key,
            )));
        }
        if !fetcher.has_sources() {
            return Err(StageError::Config("no media source configured".to_string()));
        }

        let jamendo = (!cfg.keys.jamendo_client_id.is_empty())
            .then(|| JamendoClient::new(client.clone(), &cfg.keys.jamendo_client_id));
        let narrator = make_narrator(&cfg, client.clone());
        let publishers = make_publishers(&cfg, client);

        Ok(Self {
            cfg,
            assembler,
            synchronizer,
            narrator,
            fetcher,
            jamendo,
            publishers,
        })
    }

    async fn background_music(&self, query: &str) -> Option<PathBuf> {
        let music_dir = &self.cfg.paths.music;
        let tracks = match list_music(music_dir).await {
            Ok(tracks) => tracks,
            Err(err) => {
                logw(format!("Cannot list {}: {:#}", music_dir.display(), err));
                Vec::new()
            }
        };
        if !tracks.is_empty() {
            let mut rng = rand::rngs::StdRng::seed_from_u64(now_seed());
            return pick_music(&tracks, &mut rng);
        }

        let jamendo = self.jamendo.as_ref()?;
        match jamendo.fetch_one(query, music_dir).await {
            Ok(found) => found,
            Err(err) => {
                logw(format!("Jamendo fallback failed: {:#}", err));
                None
            }
        }
    }

    /// Narration through render for one script. The script file stays in
    /// place; the caller archives it once publishing is done.
    async fn produce(&self, script_path: &Path) -> Result<Produced, StageError> {
        let paths = &self.cfg.paths;
        let stem = file_stem(script_path);
        let run_dir = paths.run_dir(&stem);
        let audio_dir = run_dir.join("audio");
        let media_dir = run_dir.join("media");

        if !clear_directory_contents(&run_dir).await? {
            logw(format!("Failed to fully clear {} (continuing anyway).", run_dir.display()));
        }
        ensure_dir(&audio_dir).await?;
        ensure_dir(&media_dir).await?;

        let script = load_script(script_path)
            .await
            .map_err(|e| StageError::SourceUnavailable(format!("{e:#}")))?;
        let fragments = script.fragments();
        if fragments.is_empty() {
            return Err(StageError::SourceUnavailable(format!(
                "{} has no numbered narration lines",
                script_path.display()
            )));
        }

        let narration = narrate_script(
            self.narrator.as_ref(),
            &fragments,
            &audio_dir,
            self.cfg.narrator.silence_gap,
        )
        .await?;
        let target = narration.total_duration();
        logi(format!("Narration total: {:.2}s", target));

        let mut queries: Vec<&str> = script.search.iter().map(String::as_str).collect();
        if queries.is_empty() {
            queries.extend(script.primary_query());
        }
        if queries.is_empty() {
            return Err(StageError::SourceUnavailable(format!(
                "{} has neither SEARCH nor TEMA",
                script_path.display()
            )));
        }

        let candidates = self
            .fetcher
            .fetch_candidates(&queries, &media_dir, &self.assembler, target)
            .await
            .map_err(|e| StageError::SourceUnavailable(format!("{e:#}")))?;
        let timeline = self.assembler.assemble(candidates, target)?;
        if timeline.is_empty() {
            return Err(StageError::SourceUnavailable(format!(
                "no usable media for '{}'",
                queries.join(", ")
            )));
        }
        logok(format!(
            "Timeline: {} segments, {:.2}s",
            timeline.len(),
            timeline.total_duration
        ));

        let cues = self.synchronizer.synchronize(&narration.fragments);
        let ass_path = run_dir.join("captions.ass");
        write_ass(&ass_path, &cues, self.synchronizer.config(), self.cfg.render.frame())
            .await
            .map_err(|e| StageError::RenderFailure(format!("{e:#}")))?;

        let narration_track = concat_narration(&narration.audio, &run_dir).await?;
        let music = self.background_music(queries[0]).await;
        let inputs = RenderInputs {
            narration: narration_track,
            music,
            subtitles: Some(ass_path),
            fonts_dir: dir_exists(&paths.fonts).await.then(|| paths.fonts.clone()),
            output: paths.output.join(format!("{stem}.mp4")),
        };
        let video = render_video(&timeline, &inputs, &self.cfg.render).await?;

        Ok(Produced {
            video,
            meta: UploadMeta::for_script(&stem, &script),
        })
    }
}

struct Produced {
    video: PathBuf,
    meta: UploadMeta,
}

/// Produces, publishes and archives each script in turn. Per-script failures
/// are counted and skipped; a fatal one ends the batch. Slots from `schedule`
/// are handed out only to videos that exist.
async fn process_scripts<F, Fut>(
    scripts: &[PathBuf],
    mut produce: F,
    publishers: &[Box<dyn Publisher>],
    schedule: Vec<DateTime<FixedOffset>>,
    paths: &Workspace,
) -> Result<BatchReport>
where
    F: FnMut(PathBuf) -> Fut,
    Fut: Future<Output = Result<Produced, StageError>>,
{
    let mut schedule = schedule.into_iter();
    let mut report = BatchReport::default();

    for path in scripts {
        logi(format!("\n=== Processing: {} ===", path.display()));
        let produced = match produce(path.clone()).await {
            Ok(produced) => produced,
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                report.failed += 1;
                logw(format!("FAILED: {} ({})", path.display(), err));
                continue;
            }
        };
        report.processed += 1;

        if !publishers.is_empty() {
            match schedule.next() {
                Some(at) => {
                    report.uploaded +=
                        publish_all(publishers, &produced.video, &produced.meta, at, &paths.backup).await;
                }
                None => logw("Schedule exhausted; leaving video unpublished"),
            }
        }

        match move_into(path, &paths.scripts_done).await {
            Ok(done) => logok(format!("DONE: {} (archived to {})", path.display(), done.display())),
            Err(err) => logw(format!("Could not archive {}: {:#}", path.display(), err)),
        }
    }

    Ok(report)
}

/// Environment check, master split, then every pending script in order.
/// Per-script failures are counted and skipped; configuration problems end
/// the batch.
pub async fn run_generation(cfg: Config) -> Result<BatchReport> {
    init::environment_check(&cfg).await?;

    let slots = parse_slots(&cfg.schedule.slots)?;
    let scripts_dir = cfg.paths.scripts.clone();
    split_pending_masters(&scripts_dir).await?;
    let scripts = pending_scripts(&scripts_dir).await?;
    if scripts.is_empty() {
        logw(format!("No scripts found in {}", scripts_dir.display()));
        return Ok(BatchReport::default());
    }

    let pipeline = Pipeline::new(cfg)?;
    let start = schedule_start(local_now(), latest_scheduled(&pipeline.publishers).await);
    let schedule = generate_schedule(scripts.len(), start, &slots);

    let pipeline = &pipeline;
    let report = process_scripts(
        &scripts,
        move |path| async move { pipeline.produce(&path).await },
        &pipeline.publishers,
        schedule,
        &pipeline.cfg.paths,
    )
    .await?;

    logi(format!(
        "\nAll done. Processed: {}, failed: {}, uploaded: {}",
        report.processed, report.failed, report.uploaded
    ));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clearing_removes_nested_contents_but_keeps_root() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("media/sub");
        fs::create_dir_all(&nested).await.unwrap();
        fs::write(nested.join("a.mp4"), b"x").await.unwrap();
        fs::write(dir.path().join("b.wav"), b"x").await.unwrap();

        assert!(clear_directory_contents(dir.path()).await.unwrap());
        assert!(dir.path().is_dir());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(clear_directory_contents(&dir.path().join("missing")).await.unwrap());
    }

    #[tokio::test]
    async fn masters_are_split_before_listing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("roteiro.txt"),
            "TEMA: Praias do Nordeste\n1. Areia branca.\nTEMA: Serra Gaúcha\n1. Frio e vinho.\n",
        )
        .await
        .unwrap();
        fs::write(dir.path().join("Avulso.txt"), "TEMA: Avulso\n1. Uma linha.\n")
            .await
            .unwrap();
        fs::write(dir.path().join("notes.md"), "ignored").await.unwrap();

        let created = split_pending_masters(dir.path()).await.unwrap();
        assert_eq!(created.len(), 2);
        assert!(!dir.path().join("roteiro.txt").exists());

        let names: Vec<String> = pending_scripts(dir.path())
            .await
            .unwrap()
            .iter()
            .map(|p| file_stem(p))
            .collect();
        assert_eq!(names, vec!["Avulso", "PraiasDoNordeste", "SerraGaucha"]);
    }

    #[tokio::test]
    async fn batch_stops_on_configuration_errors() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.paths = crate::config::Workspace::rooted(root.path());
        assert!(run_generation(cfg).await.is_err());
    }

    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl Publisher for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn upload(&self, file: &Path, _meta: &UploadMeta, at: DateTime<FixedOffset>) -> Result<bool> {
            self.0
                .lock()
                .unwrap()
                .push(format!("{} {}", file_stem(file), at.to_rfc3339()));
            Ok(true)
        }
    }

    async fn workspace_with_scripts(names: &[&str]) -> (tempfile::TempDir, Workspace, Vec<PathBuf>) {
        let root = tempfile::tempdir().unwrap();
        let paths = Workspace::rooted(root.path());
        init::ensure_directories(&paths).await.unwrap();
        let mut scripts = Vec::new();
        for name in names {
            let path = paths.scripts.join(format!("{name}.txt"));
            fs::write(&path, "TEMA: Teste\n1. Uma linha.\n").await.unwrap();
            scripts.push(path);
        }
        (root, paths, scripts)
    }

    fn slots() -> Vec<DateTime<FixedOffset>> {
        ["2025-02-06T18:00:00-03:00", "2025-02-07T08:00:00-03:00"]
            .iter()
            .map(|s| DateTime::parse_from_rfc3339(s).unwrap())
            .collect()
    }

    type Producing = std::pin::Pin<Box<dyn Future<Output = Result<Produced, StageError>>>>;

    fn fake_produce(output: PathBuf) -> impl FnMut(PathBuf) -> Producing {
        move |script: PathBuf| -> Producing {
            let output = output.clone();
            Box::pin(async move {
                let stem = file_stem(&script);
                match stem.as_str() {
                    "NoMedia" => Err(StageError::SourceUnavailable("no usable media".to_string())),
                    "BadRender" => Err(StageError::RenderFailure("ffmpeg exited 1".to_string())),
                    "BadConfig" => Err(StageError::Config("missing key".to_string())),
                    _ => {
                        let video = output.join(format!("{stem}.mp4"));
                        fs::write(&video, b"video").await.unwrap();
                        Ok(Produced {
                            video,
                            meta: UploadMeta {
                                title: stem.clone(),
                                description: "#Shorts".to_string(),
                                tags: vec!["Shorts".to_string()],
                            },
                        })
                    }
                }
            })
        }
    }

    #[tokio::test]
    async fn failed_scripts_are_skipped_and_counted() {
        let (_root, paths, scripts) = workspace_with_scripts(&["BadRender", "NoMedia", "Ok"]).await;
        let uploads = Arc::new(Mutex::new(Vec::new()));
        let publishers: Vec<Box<dyn Publisher>> = vec![Box::new(Recorder(Arc::clone(&uploads)))];

        let report = process_scripts(&scripts, fake_produce(paths.output.clone()), &publishers, slots(), &paths)
            .await
            .unwrap();

        assert_eq!(
            report,
            BatchReport {
                processed: 1,
                failed: 2,
                uploaded: 1
            }
        );
        assert_eq!(*uploads.lock().unwrap(), vec!["Ok 2025-02-06T18:00:00-03:00"]);
        assert!(paths.scripts.join("BadRender.txt").exists());
        assert!(paths.scripts.join("NoMedia.txt").exists());
        assert!(!paths.scripts.join("Ok.txt").exists());
        assert!(paths.scripts_done.join("Ok.txt").exists());
        assert!(paths.backup.join("Ok.mp4").exists());
    }

    #[tokio::test]
    async fn configuration_error_ends_the_batch() {
        let (_root, paths, scripts) = workspace_with_scripts(&["Abc", "BadConfig", "Ok"]).await;
        let publishers: Vec<Box<dyn Publisher>> = Vec::new();

        let result = process_scripts(&scripts, fake_produce(paths.output.clone()), &publishers, slots(), &paths).await;

        assert!(result.is_err());
        assert!(paths.scripts_done.join("Abc.txt").exists());
        assert!(paths.scripts.join("BadConfig.txt").exists());
        assert!(paths.scripts.join("Ok.txt").exists());
        assert!(paths.output.join("Abc.mp4").exists());
    }
}
