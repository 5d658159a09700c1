//! Advanced SubStation Alpha output for the caption track.
//!
//! Each cue becomes a run of dialogue events: one per typewriter step while
//! the text is being revealed, the last one holding the full text until the
//! cue ends. Characters not yet revealed are still emitted, fully
//! transparent, so the line layout does not move as text appears.

use crate::assembler::FrameSize;
use crate::captions::{CaptionConfig, CaptionCue};
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::Path;
use tokio::fs;

const STYLE_NAME: &str = "Caption";
const HIDE_TAG: &str = r"{\alpha&HFF&}";
const MARGIN_H: u32 = 60;
const MARGIN_V: u32 = 320;
const OUTLINE: u32 = 6;

/// `H:MM:SS.cc`, rounded down to the centisecond.
pub fn ass_timestamp(seconds: f64) -> String {
    let cs = ((seconds.max(0.0) * 100.0) + 1e-6).floor() as u64;
    let (h, rem) = (cs / 360_000, cs % 360_000);
    let (m, rem) = (rem / 6_000, rem % 6_000);
    let (s, cs) = (rem / 100, rem % 100);
    format!("{}:{:02}:{:02}.{:02}", h, m, s, cs)
}

fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '{' => '(',
            '}' => ')',
            '\\' => '/',
            c => c,
        })
        .collect()
}

/// Text with the first `visible` characters shown and the rest hidden.
/// Line breaks become `\N` and are not counted.
pub fn reveal_text(text: &str, visible: usize) -> String {
    let mut out = String::with_capacity(text.len() + HIDE_TAG.len());
    let mut emitted = 0usize;
    let mut hiding = false;
    for ch in text.chars() {
        if ch == '\n' {
            out.push_str(r"\N");
            continue;
        }
        if emitted == visible && !hiding {
            out.push_str(HIDE_TAG);
            hiding = true;
        }
        out.push(ch);
        emitted += 1;
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogueEvent {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Typewriter steps for one cue. Empty cues produce nothing.
pub fn cue_events(cue: &CaptionCue, max_steps: usize) -> Vec<DialogueEvent> {
    let text = sanitize(&cue.text);
    let total = text.chars().filter(|c| *c != '\n').count();
    if total == 0 || cue.duration <= 0.0 {
        return Vec::new();
    }

    let prefix = format!(r"{{\fs{}}}", cue.font_size);
    let end = cue.end_time();
    if cue.reveal_duration <= 0.0 {
        return vec![DialogueEvent {
            start: cue.start_time,
            end,
            text: format!("{}{}", prefix, reveal_text(&text, total)),
        }];
    }

    let steps = total.min(max_steps.max(1));
    (1..=steps)
        .map(|k| {
            let visible = (k * total).div_ceil(steps);
            let start = cue.start_time + cue.reveal_duration * (k - 1) as f64 / steps as f64;
            let step_end = if k == steps {
                end
            } else {
                cue.start_time + cue.reveal_duration * k as f64 / steps as f64
            };
            DialogueEvent {
                start,
                end: step_end,
                text: format!("{}{}", prefix, reveal_text(&text, visible)),
            }
        })
        .collect()
}

pub fn build_ass(cues: &[CaptionCue], cfg: &CaptionConfig, frame: FrameSize) -> String {
    let mut doc = String::new();
    let _ = writeln!(doc, "[Script Info]");
    let _ = writeln!(doc, "ScriptType: v4.00+");
    let _ = writeln!(doc, "PlayResX: {}", frame.width);
    let _ = writeln!(doc, "PlayResY: {}", frame.height);
    let _ = writeln!(doc, "WrapStyle: 2");
    let _ = writeln!(doc, "ScaledBorderAndShadow: yes");
    let _ = writeln!(doc);
    let _ = writeln!(doc, "[V4+ Styles]");
    let _ = writeln!(
        doc,
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding"
    );
    let _ = writeln!(
        doc,
        "Style: {STYLE_NAME},{font},{size},&H00FFFFFF,&H00FFFFFF,&H00000000,&H64000000,1,0,0,0,100,100,0,0,1,{OUTLINE},0,2,{MARGIN_H},{MARGIN_H},{MARGIN_V},1",
        font = cfg.font_name,
        size = cfg.font_size,
    );
    let _ = writeln!(doc);
    let _ = writeln!(doc, "[Events]");
    let _ = writeln!(
        doc,
        "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text"
    );

    for cue in cues {
        for event in cue_events(cue, cfg.max_reveal_steps) {
            let _ = writeln!(
                doc,
                "Dialogue: 0,{},{},{STYLE_NAME},,0,0,0,,{}",
                ass_timestamp(event.start),
                ass_timestamp(event.end),
                event.text
            );
        }
    }
    doc
}

pub async fn write_ass(path: &Path, cues: &[CaptionCue], cfg: &CaptionConfig, frame: FrameSize) -> Result<()> {
    fs::write(path, build_ass(cues, cfg, frame))
        .await
        .with_context(|| format!("write subtitles: {}", path.display()))
}
