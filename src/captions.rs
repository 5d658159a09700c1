//! Caption placement for narration fragments.
//!
//! Cues sit back to back on a single track: each one starts where the
//! previous fragment's audio ended and lasts exactly as long as its own
//! audio. Text is wrapped to the frame, shrinking the font when the block is
//! too tall.

use crate::assembler::FrameSize;
use crate::error::AssembleError;
use crate::logw;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationFragment {
    pub sequence_id: u32,
    pub sub_index: u32,
    pub text: String,
    pub audio_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionCue {
    /// Wrapped lines joined with `\n`.
    pub text: String,
    pub start_time: f64,
    pub duration: f64,
    pub reveal_duration: f64,
    pub font_size: u32,
    /// The block did not fit even at the minimum font size.
    pub overflow: bool,
}

impl CaptionCue {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n').filter(|l| !l.is_empty())
    }

    /// Characters the typewriter effect can reveal (line breaks excluded).
    pub fn revealable_chars(&self) -> usize {
        self.text.chars().filter(|c| *c != '\n').count()
    }

    /// How many characters are visible at absolute time `t`.
    pub fn visible_chars_at(&self, t: f64) -> usize {
        let total = self.revealable_chars();
        if t < self.start_time {
            return 0;
        }
        if self.reveal_duration <= 0.0 || t >= self.start_time + self.reveal_duration {
            return total;
        }
        let progress = (t - self.start_time) / self.reveal_duration;
        ((progress * total as f64).floor() as usize).min(total)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// Share of each cue spent revealing text, 0..=1.
    pub reveal_fraction: f64,
    pub max_width_fraction: f64,
    pub max_height_fraction: f64,
    pub font_size: u32,
    pub min_font_size: u32,
    pub font_step: u32,
    /// Average glyph advance relative to the font size.
    pub glyph_width_ratio: f64,
    pub line_height_ratio: f64,
    pub font_name: String,
    /// Upper bound on typewriter steps emitted per cue.
    pub max_reveal_steps: usize,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            reveal_fraction: 0.3,
            max_width_fraction: 0.9,
            max_height_fraction: 0.35,
            font_size: 90,
            min_font_size: 40,
            font_step: 6,
            glyph_width_ratio: 0.56,
            line_height_ratio: 1.2,
            font_name: "Arial".to_string(),
            max_reveal_steps: 48,
        }
    }
}

/// Rendered size of text at a given font size.
pub trait TextMeasure {
    fn line_width(&self, text: &str, font_size: u32) -> f64;
    fn line_height(&self, font_size: u32) -> f64;
}

/// Fixed-advance approximation of a proportional font.
#[derive(Debug, Clone, Copy)]
pub struct GlyphEstimate {
    pub width_ratio: f64,
    pub height_ratio: f64,
}

impl TextMeasure for GlyphEstimate {
    fn line_width(&self, text: &str, font_size: u32) -> f64 {
        text.chars().count() as f64 * font_size as f64 * self.width_ratio
    }

    fn line_height(&self, font_size: u32) -> f64 {
        font_size as f64 * self.height_ratio
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrappedText {
    pub lines: Vec<String>,
    pub font_size: u32,
    pub overflow: bool,
}

/// Greedy word packing. A word wider than `max_width` gets a line of its own.
pub fn wrap_words<M: TextMeasure>(text: &str, max_width: f64, font_size: u32, measure: &M) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{} {}", current, word);
        if measure.line_width(&candidate, font_size) <= max_width + 1e-9 {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

pub struct Synchronizer<M: TextMeasure = GlyphEstimate> {
    cfg: CaptionConfig,
    frame: FrameSize,
    measure: M,
}

impl Synchronizer<GlyphEstimate> {
    pub fn new(cfg: CaptionConfig, frame: FrameSize) -> Result<Self, AssembleError> {
        let measure = GlyphEstimate {
            width_ratio: cfg.glyph_width_ratio,
            height_ratio: cfg.line_height_ratio,
        };
        Self::with_measure(cfg, frame, measure)
    }
}

impl<M: TextMeasure> Synchronizer<M> {
    pub fn with_measure(cfg: CaptionConfig, frame: FrameSize, measure: M) -> Result<Self, AssembleError> {
        if !(0.0..=1.0).contains(&cfg.reveal_fraction) {
            return Err(AssembleError::InvalidConfig(format!(
                "reveal_fraction must be within 0..=1 (got {})",
                cfg.reveal_fraction
            )));
        }
        if cfg.min_font_size == 0 || cfg.font_size < cfg.min_font_size {
            return Err(AssembleError::InvalidConfig(format!(
                "font sizes must satisfy 0 < min ({}) <= start ({})",
                cfg.min_font_size, cfg.font_size
            )));
        }
        if cfg.font_step == 0 {
            return Err(AssembleError::InvalidConfig("font_step must be > 0".to_string()));
        }
        if frame.width == 0 || frame.height == 0 {
            return Err(AssembleError::InvalidConfig(format!(
                "frame must be non-empty (got {}x{})",
                frame.width, frame.height
            )));
        }
        Ok(Self { cfg, frame, measure })
    }

    pub fn config(&self) -> &CaptionConfig {
        &self.cfg
    }

    fn fits(&self, lines: &[String], font_size: u32) -> bool {
        let max_w = self.frame.width as f64 * self.cfg.max_width_fraction;
        let max_h = self.frame.height as f64 * self.cfg.max_height_fraction;
        let widest_ok = lines
            .iter()
            .all(|l| self.measure.line_width(l, font_size) <= max_w + 1e-9);
        let height = lines.len() as f64 * self.measure.line_height(font_size);
        widest_ok && height <= max_h + 1e-9
    }

    /// Wraps `text`, stepping the font down until the block fits the frame or
    /// the floor is reached. At the floor the overflowing layout is returned.
    pub fn wrap(&self, text: &str) -> WrappedText {
        let max_w = self.frame.width as f64 * self.cfg.max_width_fraction;
        let mut size = self.cfg.font_size;
        loop {
            let lines = wrap_words(text, max_w, size, &self.measure);
            if self.fits(&lines, size) {
                return WrappedText {
                    lines,
                    font_size: size,
                    overflow: false,
                };
            }
            if size <= self.cfg.min_font_size {
                return WrappedText {
                    lines,
                    font_size: size,
                    overflow: true,
                };
            }
            size = size.saturating_sub(self.cfg.font_step).max(self.cfg.min_font_size);
        }
    }

    pub fn synchronize(&self, fragments: &[NarrationFragment]) -> Vec<CaptionCue> {
        let mut cursor = 0.0_f64;
        let mut cues = Vec::with_capacity(fragments.len());

        for fragment in fragments {
            let mut duration = fragment.audio_duration;
            if !duration.is_finite() || duration < 0.0 {
                logw(format!(
                    "Fragment {}.{} has invalid audio duration {}; reserving 0s",
                    fragment.sequence_id, fragment.sub_index, duration
                ));
                duration = 0.0;
            }

            let wrapped = self.wrap(fragment.text.trim());
            if wrapped.overflow {
                logw(format!(
                    "Caption {}.{} overflows the frame at minimum font size {}",
                    fragment.sequence_id, fragment.sub_index, wrapped.font_size
                ));
            }

            cues.push(CaptionCue {
                text: wrapped.lines.join("\n"),
                start_time: cursor,
                duration,
                reveal_duration: duration.min(self.cfg.reveal_fraction * duration),
                font_size: wrapped.font_size,
                overflow: wrapped.overflow,
            });
            cursor += duration;
        }

        cues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn fragment(seq: u32, sub: u32, text: &str, dur: f64) -> NarrationFragment {
        NarrationFragment {
            sequence_id: seq,
            sub_index: sub,
            text: text.to_string(),
            audio_duration: dur,
        }
    }

    fn sync() -> Synchronizer {
        Synchronizer::new(CaptionConfig::default(), FrameSize::PORTRAIT_HD).unwrap()
    }

    #[test]
    fn cues_are_laid_end_to_end() {
        let frags = vec![
            fragment(1, 0, "Cachoeiras escondidas", 1.5),
            fragment(1, 1, "no meio da mata", 2.0),
            fragment(2, 0, "são lindas", 0.8),
        ];
        let cues = sync().synchronize(&frags);

        let starts: Vec<f64> = cues.iter().map(|c| c.start_time).collect();
        let durations: Vec<f64> = cues.iter().map(|c| c.duration).collect();
        assert_eq!(starts, vec![0.0, 1.5, 3.5]);
        assert_eq!(durations, vec![1.5, 2.0, 0.8]);
        assert!((cues[0].reveal_duration - 0.45).abs() < 1e-12);
    }

    #[test]
    fn empty_text_still_reserves_audio_time() {
        let frags = vec![fragment(1, 0, "um", 1.0), fragment(1, 1, "   ", 0.7), fragment(1, 2, "dois", 1.0)];
        let cues = sync().synchronize(&frags);
        assert_eq!(cues[1].text, "");
        assert_eq!(cues[1].duration, 0.7);
        assert!((cues[2].start_time - 1.7).abs() < 1e-12);
    }

    #[test]
    fn no_fragments_no_cues() {
        assert!(sync().synchronize(&[]).is_empty());
    }

    #[test]
    fn cue_track_matches_audio_for_random_inputs() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let s = sync();
        for _ in 0..200 {
            let n = rng.gen_range(0..20);
            let frags: Vec<_> = (0..n)
                .map(|i| fragment(i, 0, "palavra de teste", rng.gen_range(0.0..6.0)))
                .collect();
            let cues = s.synchronize(&frags);

            let audio: f64 = frags.iter().map(|f| f.audio_duration).sum();
            let captions: f64 = cues.iter().map(|c| c.duration).sum();
            assert_eq!(audio, captions);

            for pair in cues.windows(2) {
                assert!(pair[1].start_time >= pair[0].start_time);
                assert!(pair[1].start_time >= pair[0].end_time() - 1e-12);
            }
            for cue in &cues {
                assert!(cue.reveal_duration <= cue.duration);
            }
        }
    }

    #[test]
    fn wraps_greedily_within_width() {
        let wrapped = sync().wrap("the quick brown fox jumps over the lazy dog");
        assert_eq!(wrapped.font_size, 90);
        assert!(!wrapped.overflow);
        assert_eq!(wrapped.lines, vec!["the quick brown fox", "jumps over the lazy", "dog"]);
    }

    #[test]
    fn shrinks_font_until_block_fits() {
        let cfg = CaptionConfig {
            max_height_fraction: 0.1,
            ..CaptionConfig::default()
        };
        let s = Synchronizer::new(cfg, FrameSize::PORTRAIT_HD).unwrap();
        let wrapped = s.wrap("the quick brown fox jumps over the lazy dog");
        assert_eq!(wrapped.font_size, 72);
        assert!(!wrapped.overflow);
        assert_eq!(wrapped.lines, vec!["the quick brown fox", "jumps over the lazy dog"]);
    }

    #[test]
    fn floor_violation_is_reported_not_fatal() {
        let cfg = CaptionConfig {
            max_height_fraction: 0.1,
            min_font_size: 80,
            ..CaptionConfig::default()
        };
        let s = Synchronizer::new(cfg, FrameSize::PORTRAIT_HD).unwrap();
        let cues = s.synchronize(&[fragment(1, 0, "the quick brown fox jumps over the lazy dog", 2.0)]);
        assert_eq!(cues[0].font_size, 80);
        assert!(cues[0].overflow);
        assert_eq!(cues[0].duration, 2.0);
    }

    #[test]
    fn long_word_gets_its_own_line() {
        let lines = wrap_words(
            "a supercalifragilistic b",
            100.0,
            10,
            &GlyphEstimate {
                width_ratio: 1.0,
                height_ratio: 1.0,
            },
        );
        assert_eq!(lines, vec!["a", "supercalifragilistic", "b"]);
    }

    #[test]
    fn typewriter_reveals_then_holds() {
        let cue = CaptionCue {
            text: "abcd\nefgh".to_string(),
            start_time: 2.0,
            duration: 4.0,
            reveal_duration: 1.0,
            font_size: 90,
            overflow: false,
        };
        assert_eq!(cue.visible_chars_at(1.0), 0);
        assert_eq!(cue.visible_chars_at(2.0), 0);
        assert_eq!(cue.visible_chars_at(2.5), 4);
        assert_eq!(cue.visible_chars_at(3.0), 8);
        assert_eq!(cue.visible_chars_at(5.9), 8);
    }

    #[test]
    fn rejects_bad_reveal_fraction() {
        let cfg = CaptionConfig {
            reveal_fraction: 1.5,
            ..CaptionConfig::default()
        };
        assert!(Synchronizer::new(cfg, FrameSize::PORTRAIT_HD).is_err());
    }
}
