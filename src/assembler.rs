//! Duration-budgeted clip assembly.
//!
//! Candidates are consumed greedily in the order given. Each one contributes
//! at most `per_clip_cap` seconds and never more than what is left of the
//! target, so the resulting [`Timeline`] never overruns and only falls short
//! when the candidates run out.

use crate::error::AssembleError;
use crate::logw;
use crate::media::{MediaItem, MediaKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Longest slice any one asset may contribute, seconds.
    pub per_clip_cap: f64,
    /// Sources longer than this are rejected outright, seconds.
    pub sanity_ceiling: f64,
    /// Presentation time of a still image, seconds.
    pub image_duration: f64,
    /// Crossfade against the previous segment, seconds.
    pub crossfade: f64,
    /// Stop scanning after this many candidates.
    pub max_candidates: Option<usize>,
    pub videos_per_query: usize,
    pub images_per_query: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            per_clip_cap: 10.0,
            sanity_ceiling: 200.0,
            image_duration: 5.0,
            crossfade: 0.3,
            max_candidates: None,
            videos_per_query: 8,
            images_per_query: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const PORTRAIT_HD: FrameSize = FrameSize {
        width: 1080,
        height: 1920,
    };

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// Scale then center-crop so the source covers the whole frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualTransform {
    pub scale_width: u32,
    pub scale_height: u32,
    pub crop_x: u32,
    pub crop_y: u32,
    pub out_width: u32,
    pub out_height: u32,
}

fn even_at_least(value: f64, floor: u32) -> u32 {
    let nearest = value.round();
    let whole = if (value - nearest).abs() < 1e-6 {
        nearest
    } else {
        value.ceil()
    };
    let v = (whole as u32).max(floor);
    v + (v & 1)
}

impl VisualTransform {
    pub fn fill(source_aspect: Option<f64>, frame: FrameSize) -> Self {
        let (w, h) = (frame.width, frame.height);
        let (scale_width, scale_height) = match source_aspect {
            Some(ar) if ar.is_finite() && ar > 0.0 => {
                if ar > frame.aspect() {
                    (even_at_least(h as f64 * ar, w), h)
                } else {
                    (w, even_at_least(w as f64 / ar, h))
                }
            }
            _ => (w, h),
        };

        Self {
            scale_width,
            scale_height,
            crop_x: (scale_width - w) / 2,
            crop_y: (scale_height - h) / 2,
            out_width: w,
            out_height: h,
        }
    }

    pub fn crops(&self) -> bool {
        self.crop_x > 0 || self.crop_y > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transition {
    None,
    Crossfade { duration: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub media: MediaItem,
    pub start_offset: f64,
    pub used_duration: f64,
    pub transform: VisualTransform,
    pub transition: Transition,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Timeline {
    pub segments: Vec<Segment>,
    pub total_duration: f64,
}

impl Timeline {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn durations(&self) -> Vec<f64> {
        self.segments.iter().map(|s| s.used_duration).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Assembler {
    cfg: AssemblyConfig,
    frame: FrameSize,
}

impl Assembler {
    pub fn new(cfg: AssemblyConfig, frame: FrameSize) -> Result<Self, AssembleError> {
        if !(cfg.per_clip_cap > 0.0) {
            return Err(AssembleError::InvalidConfig(format!(
                "per_clip_cap must be > 0 (got {})",
                cfg.per_clip_cap
            )));
        }
        if !(cfg.image_duration > 0.0) {
            return Err(AssembleError::InvalidConfig(format!(
                "image_duration must be > 0 (got {})",
                cfg.image_duration
            )));
        }
        if !(cfg.sanity_ceiling > 0.0) {
            return Err(AssembleError::InvalidConfig(format!(
                "sanity_ceiling must be > 0 (got {})",
                cfg.sanity_ceiling
            )));
        }
        if !(cfg.crossfade >= 0.0) {
            return Err(AssembleError::InvalidConfig(format!(
                "crossfade must be >= 0 (got {})",
                cfg.crossfade
            )));
        }
        if frame.width == 0 || frame.height == 0 {
            return Err(AssembleError::InvalidConfig(format!(
                "frame must be non-empty (got {}x{})",
                frame.width, frame.height
            )));
        }
        Ok(Self { cfg, frame })
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.cfg
    }

    /// Seconds a candidate can offer, or `None` when it must be skipped.
    pub fn usable_duration(&self, item: &MediaItem) -> Option<f64> {
        match item.kind {
            MediaKind::Image => Some(self.cfg.image_duration.min(self.cfg.per_clip_cap)),
            MediaKind::Video => {
                let native = item.native_duration?;
                if !native.is_finite() || native <= 0.0 {
                    debug!(source = %item.source_id, native, "skipping clip without usable duration");
                    return None;
                }
                if native > self.cfg.sanity_ceiling {
                    debug!(
                        source = %item.source_id,
                        native,
                        ceiling = self.cfg.sanity_ceiling,
                        "skipping clip above sanity ceiling"
                    );
                    return None;
                }
                Some(native.min(self.cfg.per_clip_cap))
            }
        }
    }

    pub fn assemble<I>(&self, candidates: I, target_duration: f64) -> Result<Timeline, AssembleError>
    where
        I: IntoIterator<Item = MediaItem>,
    {
        if !target_duration.is_finite() {
            return Err(AssembleError::InvalidConfig(format!(
                "target_duration must be finite (got {})",
                target_duration
            )));
        }

        let scan_limit = self.cfg.max_candidates.unwrap_or(usize::MAX);
        let mut accumulated = 0.0_f64;
        let mut segments: Vec<Segment> = Vec::new();

        for item in candidates.into_iter().take(scan_limit) {
            if accumulated >= target_duration {
                break;
            }
            let Some(available) = self.usable_duration(&item) else {
                continue;
            };

            let take = available.min(target_duration - accumulated);
            let transition = if segments.is_empty() || self.cfg.crossfade == 0.0 {
                Transition::None
            } else {
                Transition::Crossfade {
                    duration: self.cfg.crossfade,
                }
            };
            let transform = VisualTransform::fill(item.aspect_ratio, self.frame);

            segments.push(Segment {
                media: item,
                start_offset: 0.0,
                used_duration: take,
                transform,
                transition,
            });
            accumulated = (accumulated + take).min(target_duration);
        }

        if accumulated < target_duration {
            logw(format!(
                "Candidates exhausted: assembled {:.2}s of {:.2}s target ({} segments)",
                accumulated,
                target_duration,
                segments.len()
            ));
        }

        Ok(Timeline {
            segments,
            total_duration: accumulated,
        })
    }
}
