//! Final ffmpeg render: one command that trims and frames every segment,
//! chains crossfades, burns the subtitles and mixes the audio.

use crate::assembler::{FrameSize, Segment, Timeline, Transition};
use crate::error::StageError;
use crate::ffmpeg;
use crate::media::MediaKind;
use crate::{logi, logok, logw};
use anyhow::{Context, Result, bail};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Fades shorter than this are rendered as hard cuts.
const MIN_FADE: f64 = 0.01;
const MUSIC_EXTENSIONS: [&str; 4] = ["mp3", "m4a", "wav", "ogg"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub preset: String,
    pub crf: u32,
    pub audio_bitrate: String,
    pub narration_volume: f64,
    pub music_volume: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 24,
            preset: "veryfast".to_string(),
            crf: 22,
            audio_bitrate: "192k".to_string(),
            narration_volume: 1.0,
            music_volume: 0.1,
        }
    }
}

impl RenderConfig {
    pub fn frame(&self) -> FrameSize {
        FrameSize {
            width: self.width,
            height: self.height,
        }
    }
}

/// Files feeding one render.
#[derive(Debug, Clone)]
pub struct RenderInputs {
    pub narration: PathBuf,
    pub music: Option<PathBuf>,
    pub subtitles: Option<PathBuf>,
    pub fonts_dir: Option<PathBuf>,
    pub output: PathBuf,
}

fn fmt_secs(v: f64) -> String {
    format!("{:.3}", v.max(0.0))
}

fn quote_filter_path(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

/// Effective fade into segment `i`, bounded by half of each neighbour.
pub fn fade_duration(segments: &[Segment], i: usize) -> f64 {
    if i == 0 || i >= segments.len() {
        return 0.0;
    }
    match segments[i].transition {
        Transition::None => 0.0,
        Transition::Crossfade { duration } => {
            let bound = segments[i - 1].used_duration.min(segments[i].used_duration) / 2.0;
            let d = duration.min(bound).max(0.0);
            if d < MIN_FADE { 0.0 } else { d }
        }
    }
}

/// Length of the joined video before padding.
pub fn joined_length(segments: &[Segment]) -> f64 {
    segments
        .iter()
        .enumerate()
        .map(|(i, s)| s.used_duration - fade_duration(segments, i))
        .sum()
}

fn segment_input_args(seg: &Segment) -> Vec<String> {
    let path = seg.media.local_path.display().to_string();
    match seg.media.kind {
        MediaKind::Image => vec![
            "-loop".to_string(),
            "1".to_string(),
            "-t".to_string(),
            fmt_secs(seg.used_duration),
            "-i".to_string(),
            path,
        ],
        MediaKind::Video => vec!["-i".to_string(), path],
    }
}

fn segment_filter(idx: usize, seg: &Segment, fps: u32) -> String {
    let t = &seg.transform;
    let mut chain = Vec::new();
    if seg.media.kind == MediaKind::Video {
        chain.push(format!(
            "trim=start={}:duration={}",
            fmt_secs(seg.start_offset),
            fmt_secs(seg.used_duration)
        ));
    }
    chain.push("setpts=PTS-STARTPTS".to_string());
    chain.push(format!("scale={}:{}", t.scale_width, t.scale_height));
    if t.crops() {
        chain.push(format!(
            "crop={}:{}:{}:{}",
            t.out_width, t.out_height, t.crop_x, t.crop_y
        ));
    }
    chain.push(format!("fps={}", fps));
    chain.push("setsar=1".to_string());
    chain.push("format=yuv420p".to_string());
    format!("[{idx}:v]{}[v{idx}]", chain.join(","))
}

/// Video half of the filter graph, ending in `[vout]`.
pub fn video_filter_graph(
    timeline: &Timeline,
    fps: u32,
    subtitles: Option<&Path>,
    fonts_dir: Option<&Path>,
) -> Vec<String> {
    let segs = &timeline.segments;
    let mut graph: Vec<String> = segs
        .iter()
        .enumerate()
        .map(|(i, s)| segment_filter(i, s, fps))
        .collect();

    let mut current = "v0".to_string();
    let mut length = segs.first().map(|s| s.used_duration).unwrap_or(0.0);
    for i in 1..segs.len() {
        let next = format!("x{i}");
        let fade = fade_duration(segs, i);
        if fade > 0.0 {
            graph.push(format!(
                "[{current}][v{i}]xfade=transition=fade:duration={}:offset={}[{next}]",
                fmt_secs(fade),
                fmt_secs(length - fade)
            ));
        } else {
            graph.push(format!("[{current}][v{i}]concat=n=2:v=1:a=0[{next}]"));
        }
        length += segs[i].used_duration - fade;
        current = next;
    }

    let mut tail = Vec::new();
    let pad = timeline.total_duration - length;
    if pad > 0.001 {
        tail.push(format!("tpad=stop_mode=clone:stop_duration={}", fmt_secs(pad)));
    }
    if let Some(ass) = subtitles {
        let mut f = format!("ass=filename={}", quote_filter_path(ass));
        if let Some(fonts) = fonts_dir {
            f.push_str(&format!(":fontsdir={}", quote_filter_path(fonts)));
        }
        tail.push(f);
    }
    if tail.is_empty() {
        tail.push("null".to_string());
    }
    graph.push(format!("[{current}]{}[vout]", tail.join(",")));
    graph
}

/// Audio half: narration at input `narration_idx`, optional looped music
/// right after it. Ends in `[aout]`.
pub fn audio_filter_graph(narration_idx: usize, with_music: bool, cfg: &RenderConfig) -> Vec<String> {
    let mut graph = vec![format!(
        "[{narration_idx}:a]volume={:.3}[a0]",
        cfg.narration_volume
    )];
    if with_music {
        graph.push(format!(
            "[{}:a]volume={:.3}[a1]",
            narration_idx + 1,
            cfg.music_volume
        ));
        graph.push("[a0][a1]amix=inputs=2:duration=first:dropout_transition=2[aout]".to_string());
    } else {
        graph.push("[a0]anull[aout]".to_string());
    }
    graph
}

/// Complete ffmpeg argument list for the render.
pub fn build_render_args(timeline: &Timeline, inputs: &RenderInputs, cfg: &RenderConfig) -> Result<Vec<String>> {
    if timeline.is_empty() {
        bail!("timeline has no segments");
    }
    if !(timeline.total_duration > 0.0) {
        bail!("timeline duration must be positive (got {})", timeline.total_duration);
    }

    let mut rest: Vec<String> = Vec::new();
    for seg in &timeline.segments {
        rest.extend(segment_input_args(seg));
    }
    let narration_idx = timeline.len();
    rest.push("-i".to_string());
    rest.push(inputs.narration.display().to_string());
    if let Some(music) = &inputs.music {
        rest.extend(["-stream_loop".to_string(), "-1".to_string()]);
        rest.push("-i".to_string());
        rest.push(music.display().to_string());
    }

    let mut graph = video_filter_graph(
        timeline,
        cfg.fps,
        inputs.subtitles.as_deref(),
        inputs.fonts_dir.as_deref(),
    );
    graph.extend(audio_filter_graph(narration_idx, inputs.music.is_some(), cfg));

    rest.extend([
        "-filter_complex".to_string(),
        graph.join(";"),
        "-map".to_string(),
        "[vout]".to_string(),
        "-map".to_string(),
        "[aout]".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        cfg.preset.clone(),
        "-crf".to_string(),
        cfg.crf.to_string(),
        "-r".to_string(),
        cfg.fps.to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        cfg.audio_bitrate.clone(),
        "-t".to_string(),
        fmt_secs(timeline.total_duration),
        "-movflags".to_string(),
        "+faststart".to_string(),
        inputs.output.display().to_string(),
    ]);
    Ok(ffmpeg::ffmpeg_args(rest))
}

/// Joins the per-fragment narration files into one AAC track.
pub async fn concat_narration(audio: &[PathBuf], work_dir: &Path) -> Result<PathBuf, StageError> {
    if audio.is_empty() {
        return Err(StageError::RenderFailure("no narration audio".to_string()));
    }
    let out = work_dir.join("narration.m4a");
    let refs: Vec<&Path> = audio.iter().map(PathBuf::as_path).collect();
    match ffmpeg::ffmpeg_concat_audio(&refs, &out).await {
        Ok(true) => Ok(out),
        Ok(false) => Err(StageError::RenderFailure(format!(
            "narration concat wrote nothing: {}",
            out.display()
        ))),
        Err(e) => Err(StageError::RenderFailure(format!("narration concat: {e:#}"))),
    }
}

pub async fn render_video(timeline: &Timeline, inputs: &RenderInputs, cfg: &RenderConfig) -> Result<PathBuf, StageError> {
    let args = build_render_args(timeline, inputs, cfg).map_err(|e| StageError::RenderFailure(format!("{e:#}")))?;
    if let Some(parent) = inputs.output.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StageError::RenderFailure(format!("{}: {}", parent.display(), e)))?;
    }

    logi(format!(
        "Rendering {} segments ({:.2}s) -> {}",
        timeline.len(),
        timeline.total_duration,
        inputs.output.display()
    ));
    ffmpeg::run_cmd(&args)
        .await
        .map_err(|e| StageError::RenderFailure(format!("{e:#}")))?;
    if !inputs.output.exists() {
        return Err(StageError::RenderFailure(format!(
            "ffmpeg finished without writing {}",
            inputs.output.display()
        )));
    }
    logok(format!("Render OK: {}", inputs.output.display()));
    Ok(inputs.output.clone())
}

/// Audio files directly inside `dir`, sorted. A missing directory is empty.
pub async fn list_music(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return Ok(out),
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("read music dir {}", dir.display()))?
    {
        let path = entry.path();
        let is_audio = path
            .extension()
            .and_then(OsStr::to_str)
            .map(|e| MUSIC_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_audio && path.is_file() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

pub fn pick_music<R: Rng>(tracks: &[PathBuf], rng: &mut R) -> Option<PathBuf> {
    if tracks.is_empty() {
        logw("No background music available; narration only.");
        return None;
    }
    Some(tracks[rng.gen_range(0..tracks.len())].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::VisualTransform;
    use crate::media::MediaItem;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn segment(name: &str, kind: MediaKind, used: f64, fade: Option<f64>, aspect: Option<f64>) -> Segment {
        let media = MediaItem {
            source_id: name.to_string(),
            kind,
            local_path: PathBuf::from(format!("/w/{name}")),
            native_duration: (kind == MediaKind::Video).then_some(30.0),
            aspect_ratio: aspect,
        };
        Segment {
            media,
            start_offset: 0.0,
            used_duration: used,
            transform: VisualTransform::fill(aspect, FrameSize::PORTRAIT_HD),
            transition: fade
                .map(|duration| Transition::Crossfade { duration })
                .unwrap_or(Transition::None),
        }
    }

    fn timeline(segments: Vec<Segment>) -> Timeline {
        let total_duration = segments.iter().map(|s| s.used_duration).sum();
        Timeline {
            segments,
            total_duration,
        }
    }

    fn inputs(music: bool) -> RenderInputs {
        RenderInputs {
            narration: PathBuf::from("/w/narration.m4a"),
            music: music.then(|| PathBuf::from("/m/song.mp3")),
            subtitles: Some(PathBuf::from("/w/captions.ass")),
            fonts_dir: None,
            output: PathBuf::from("/out/Theme.mp4"),
        }
    }

    #[test]
    fn fades_are_clamped_to_half_the_shorter_neighbour() {
        let segs = vec![
            segment("a", MediaKind::Video, 4.0, None, None),
            segment("b", MediaKind::Video, 0.4, Some(0.3), None),
            segment("c", MediaKind::Video, 5.0, Some(0.3), None),
        ];
        assert_eq!(fade_duration(&segs, 0), 0.0);
        assert!((fade_duration(&segs, 1) - 0.2).abs() < 1e-12);
        assert!((fade_duration(&segs, 2) - 0.2).abs() < 1e-12);
        assert!((joined_length(&segs) - 9.0).abs() < 1e-9);
    }

    #[test]
    fn xfade_offsets_follow_running_length_and_tpad_restores_total() {
        let tl = timeline(vec![
            segment("a", MediaKind::Video, 3.0, None, Some(16.0 / 9.0)),
            segment("b", MediaKind::Video, 5.0, Some(0.5), Some(9.0 / 16.0)),
            segment("c", MediaKind::Video, 2.0, Some(0.5), None),
        ]);
        let graph = video_filter_graph(&tl, 24, None, None);
        assert!(graph[0].contains("scale=3414:1920,crop=1080:1920:1167:0"));
        assert!(!graph[1].contains("crop="));
        assert_eq!(
            graph[3],
            "[v0][v1]xfade=transition=fade:duration=0.500:offset=2.500[x1]"
        );
        assert_eq!(
            graph[4],
            "[x1][v2]xfade=transition=fade:duration=0.500:offset=7.000[x2]"
        );
        assert_eq!(
            graph[5],
            "[x2]tpad=stop_mode=clone:stop_duration=1.000[vout]"
        );
    }

    #[test]
    fn hard_cuts_use_concat() {
        let tl = timeline(vec![
            segment("a", MediaKind::Video, 3.0, None, None),
            segment("b", MediaKind::Image, 2.0, None, None),
        ]);
        let graph = video_filter_graph(&tl, 24, None, None);
        assert!(graph[0].starts_with("[0:v]trim=start=0.000:duration=3.000,"));
        assert!(graph[1].starts_with("[1:v]setpts=PTS-STARTPTS,"));
        assert_eq!(graph[2], "[v0][v1]concat=n=2:v=1:a=0[x1]");
        assert_eq!(graph[3], "[x1]null[vout]");
    }

    #[test]
    fn single_segment_burns_subtitles() {
        let tl = timeline(vec![segment("a", MediaKind::Video, 3.0, None, None)]);
        let graph = video_filter_graph(
            &tl,
            24,
            Some(Path::new("/w/it's.ass")),
            Some(Path::new("fonts")),
        );
        assert_eq!(
            graph.last().map(String::as_str),
            Some(r"[v0]ass=filename='/w/it'\''s.ass':fontsdir='fonts'[vout]")
        );
    }

    #[test]
    fn music_is_looped_and_mixed_under_narration() {
        let tl = timeline(vec![
            segment("a", MediaKind::Image, 5.0, None, None),
            segment("b", MediaKind::Video, 5.0, Some(0.3), None),
        ]);
        let args = build_render_args(&tl, &inputs(true), &RenderConfig::default()).unwrap();
        let joined = args.join(" ");
        assert!(joined.contains("-loop 1 -t 5.000 -i /w/a"));
        assert!(joined.contains("-i /w/narration.m4a -stream_loop -1 -i /m/song.mp3"));
        assert!(joined.contains("[2:a]volume=1.000[a0];[3:a]volume=0.100[a1]"));
        assert!(joined.contains("amix=inputs=2:duration=first"));
        assert!(joined.contains("-t 10.000 -movflags +faststart /out/Theme.mp4"));
        assert!(joined.contains("-c:v libx264 -pix_fmt yuv420p"));
        assert!(joined.contains("-r 24"));
    }

    #[test]
    fn narration_only_without_music() {
        let tl = timeline(vec![segment("a", MediaKind::Video, 5.0, None, None)]);
        let args = build_render_args(&tl, &inputs(false), &RenderConfig::default()).unwrap();
        assert!(!args.iter().any(|a| a == "-stream_loop"));
        assert!(args.join(" ").contains("[a0]anull[aout]"));
    }

    #[test]
    fn empty_timeline_is_rejected() {
        let err = build_render_args(&Timeline::default(), &inputs(false), &RenderConfig::default());
        assert!(err.is_err());
    }

    #[test]
    fn music_pick_is_from_the_list() {
        let tracks = vec![PathBuf::from("a.mp3"), PathBuf::from("b.mp3")];
        let mut rng = StdRng::seed_from_u64(3);
        let pick = pick_music(&tracks, &mut rng).unwrap();
        assert!(tracks.contains(&pick));
        assert_eq!(pick_music(&[], &mut rng), None);
    }

    #[tokio::test]
    async fn lists_only_audio_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.mp3", "a.WAV", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").await.unwrap();
        }
        let names: Vec<_> = list_music(dir.path())
            .await
            .unwrap()
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, vec!["a.WAV", "b.mp3"]);
        assert!(list_music(&dir.path().join("missing")).await.unwrap().is_empty());
    }
}
