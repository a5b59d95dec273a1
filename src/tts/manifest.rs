use crate::narration::Timing;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSegment {
    pub index: usize,
    pub text: String,
    pub timing: Timing,
    pub audio_path: String,
}

/// Result of synthesizing one job's narration, persisted as `manifest.json`.
/// Segments that failed are absent, so indices may have gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioManifest {
    pub video_id: String,
    pub voice_id: String,
    pub segments: Vec<ManifestSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AudioManifest {
    pub fn empty(video_id: &str, voice_id: &str) -> Self {
        Self {
            video_id: video_id.to_string(),
            voice_id: voice_id.to_string(),
            segments: Vec::new(),
            error: None,
        }
    }

    pub fn unreachable(video_id: &str, voice_id: &str, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::empty(video_id, voice_id)
        }
    }

    pub fn load(path: &Path) -> Option<Self> {
        let raw = fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Audio files listed in the manifest that still exist, in segment order.
    pub fn existing_audio(&self) -> Vec<PathBuf> {
        let mut segments: Vec<&ManifestSegment> = self.segments.iter().collect();
        segments.sort_by_key(|s| s.index);
        segments
            .into_iter()
            .map(|s| PathBuf::from(&s.audio_path))
            .filter(|p| p.is_file())
            .collect()
    }
}
