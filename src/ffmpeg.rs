use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;

pub(crate) async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let output = cmd.output().await.context("Command execution failed")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr
            .lines()
            .rev()
            .take(5)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join(" | ");
        return Err(anyhow::anyhow!("Command failed: {} ({})", args[0], tail));
    }

    Ok(())
}

/// True when `tool -version` runs and exits cleanly.
pub async fn tool_available(tool: &str) -> bool {
    match Command::new(tool).arg("-version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// `ffmpeg -y -hide_banner -loglevel error` followed by `rest`.
pub(crate) fn ffmpeg_args<I, S>(rest: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut args: Vec<String> = ["ffmpeg", "-y", "-hide_banner", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.extend(rest.into_iter().map(Into::into));
    args
}

pub async fn ffprobe_video_dimensions(path: &Path) -> Result<(u32, u32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe execution failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed for {}", path.display()));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    parse_dimensions(&text).ok_or_else(|| anyhow::anyhow!("Invalid dimensions: {text}"))
}

fn parse_dimensions(text: &str) -> Option<(u32, u32)> {
    let first = text.lines().next()?;
    let mut parts = first.trim().trim_end_matches('x').split('x');
    let w = parts.next()?.parse::<u32>().ok()?;
    let h = parts.next()?.parse::<u32>().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed for {}", path.display()));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if !duration.is_finite() || duration <= 0.0 {
        return Err(anyhow::anyhow!("Invalid duration: {text}"));
    }
    Ok(duration)
}

/// Mono 44.1 kHz silence of `dur_s` seconds.
pub async fn ffmpeg_silence(dur_s: f64, out_wav: &Path) -> Result<bool> {
    let args = ffmpeg_args([
        "-f".to_string(),
        "lavfi".to_string(),
        "-i".to_string(),
        format!("anullsrc=r={NARRATION_SAMPLE_RATE}:cl=mono"),
        "-t".to_string(),
        format!("{:.3}", dur_s),
        out_wav.display().to_string(),
    ]);
    run_cmd(&args).await?;
    Ok(out_wav.exists())
}

/// Sample rate every narration piece is resampled to before joining.
pub const NARRATION_SAMPLE_RATE: u32 = 44100;

/// Filter graph that resamples each of `n` audio inputs to one format and
/// joins them end to end into `[narr]`. Inputs may differ in codec, sample
/// rate and channel count.
pub fn concat_audio_filter(n: usize) -> String {
    let mut graph: Vec<String> = (0..n)
        .map(|i| {
            format!(
                "[{i}:a]aresample={NARRATION_SAMPLE_RATE},aformat=sample_fmts=fltp:channel_layouts=mono[n{i}]"
            )
        })
        .collect();
    let labels: String = (0..n).map(|i| format!("[n{i}]")).collect();
    graph.push(format!("{labels}concat=n={n}:v=0:a=1[narr]"));
    graph.join(";")
}

/// Arguments joining `inputs` into one AAC track at `out_m4a`.
pub fn concat_audio_args(inputs: &[&Path], out_m4a: &Path) -> Vec<String> {
    let mut rest: Vec<String> = Vec::with_capacity(inputs.len() * 2 + 12);
    for input in inputs {
        rest.push("-i".to_string());
        rest.push(input.display().to_string());
    }
    rest.extend([
        "-filter_complex".to_string(),
        concat_audio_filter(inputs.len()),
        "-map".to_string(),
        "[narr]".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-ar".to_string(),
        NARRATION_SAMPLE_RATE.to_string(),
        out_m4a.display().to_string(),
    ]);
    ffmpeg_args(rest)
}

/// Joins audio files in order, decoding each one on its own so TTS output and
/// generated silence keep their measured lengths.
pub async fn ffmpeg_concat_audio(inputs: &[&Path], out_m4a: &Path) -> Result<bool> {
    if inputs.is_empty() {
        return Ok(false);
    }
    run_cmd(&concat_audio_args(inputs, out_m4a)).await?;
    Ok(out_m4a.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_probe_dimensions() {
        assert_eq!(parse_dimensions("1080x1920\n"), Some((1080, 1920)));
        assert_eq!(parse_dimensions("1920x1080x\n"), Some((1920, 1080)));
        assert_eq!(parse_dimensions("0x0"), None);
        assert_eq!(parse_dimensions(""), None);
    }

    #[test]
    fn mixed_narration_inputs_are_decoded_separately() {
        let a = Path::new("narracao_001_00.mp3");
        let gap = Path::new("narracao_001_01.wav");
        let b = Path::new("narracao_001_02.mp3");
        let args = concat_audio_args(&[a, gap, b], Path::new("narration.m4a"));

        assert!(!args.iter().any(|a| a == "concat"));
        let inputs: Vec<&str> = args
            .windows(2)
            .filter(|w| w[0] == "-i")
            .map(|w| w[1].as_str())
            .collect();
        assert_eq!(inputs, ["narracao_001_00.mp3", "narracao_001_01.wav", "narracao_001_02.mp3"]);

        let graph = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        for i in 0..3 {
            assert!(graph.contains(&format!(
                "[{i}:a]aresample=44100,aformat=sample_fmts=fltp:channel_layouts=mono[n{i}]"
            )));
        }
        assert!(graph.ends_with("[n0][n1][n2]concat=n=3:v=0:a=1[narr]"));
        assert_eq!(args.last().unwrap(), "narration.m4a");
    }

    #[test]
    fn ffmpeg_prefix_is_quiet_and_overwrites() {
        let args = ffmpeg_args(["-i", "in.mp4"]);
        assert_eq!(&args[..5], ["ffmpeg", "-y", "-hide_banner", "-loglevel", "error"]);
        assert_eq!(&args[5..], ["-i", "in.mp4"]);
    }
}
