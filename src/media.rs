use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
        }
    }
}

/// A search hit that has not been downloaded yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMedia {
    pub provider: String,
    pub source_id: String,
    pub kind: MediaKind,
    pub url: String,
    /// Reported by the provider; videos only.
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl RemoteMedia {
    pub fn file_name(&self) -> String {
        format!("{}_{}.{}", self.provider, self.source_id, self.kind.extension())
    }
}

/// A downloaded asset, ready to be placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub source_id: String,
    pub kind: MediaKind,
    pub local_path: PathBuf,
    /// Measured length of a video. Images have none.
    pub native_duration: Option<f64>,
    /// Width over height, when known.
    pub aspect_ratio: Option<f64>,
}

impl MediaItem {
    pub fn video<P: Into<PathBuf>>(source_id: &str, path: P, duration: f64, aspect_ratio: f64) -> Self {
        Self {
            source_id: source_id.to_string(),
            kind: MediaKind::Video,
            local_path: path.into(),
            native_duration: Some(duration),
            aspect_ratio: Some(aspect_ratio),
        }
    }

    pub fn image<P: Into<PathBuf>>(source_id: &str, path: P, aspect_ratio: f64) -> Self {
        Self {
            source_id: source_id.to_string(),
            kind: MediaKind::Image,
            local_path: path.into(),
            native_duration: None,
            aspect_ratio: Some(aspect_ratio),
        }
    }
}

pub fn aspect_of(width: Option<u32>, height: Option<u32>) -> Option<f64> {
    match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Some(w as f64 / h as f64),
        _ => None,
    }
}
