use super::{AudioManifest, ManifestSegment, SpeechSynthesizer, TtsError};
use crate::narration::ScriptSegment;
use crate::store::{write_json, ArtifactStore, SCRIPT_FILE};
use std::path::Path;
use std::sync::Arc;

pub const MANIFEST_FILE: &str = "manifest.json";

pub fn segment_file_name(index: usize) -> String {
    format!("segment_{:03}.mp3", index)
}

/// Synthesizes a job's narration segment by segment into `<audio>/<jobId>/`.
#[derive(Clone)]
pub struct NarrationSynthesizer {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    store: ArtifactStore,
}

impl NarrationSynthesizer {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, store: ArtifactStore) -> Self {
        Self { synthesizer, store }
    }

    /// Never fails on provider problems: an unreachable provider yields a
    /// manifest with no segments and `error` set, and a failed segment is
    /// simply left out. Only local I/O errors are returned.
    pub async fn synthesize(
        &self,
        job_id: &str,
        segments: &[ScriptSegment],
        voice_id: &str,
    ) -> Result<AudioManifest, TtsError> {
        let dir = self.store.audio_dir(job_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| TtsError::Io(format!("{}: {}", dir.display(), e)))?;

        write_json(&dir.join(SCRIPT_FILE), segments).map_err(|e| TtsError::Io(e.to_string()))?;

        let manifest = match self.synthesizer.verify().await {
            Ok(message) => {
                tracing::info!("Job {}: {} {}", job_id, self.synthesizer.name(), message);
                self.synthesize_segments(job_id, &dir, segments, voice_id)
                    .await
            }
            Err(e) => {
                tracing::error!(
                    "Job {}: cannot generate narration, {} unreachable: {}",
                    job_id,
                    self.synthesizer.name(),
                    e
                );
                AudioManifest::unreachable(job_id, voice_id, e.to_string())
            }
        };

        write_json(&dir.join(MANIFEST_FILE), &manifest).map_err(|e| TtsError::Io(e.to_string()))?;
        Ok(manifest)
    }

    async fn synthesize_segments(
        &self,
        job_id: &str,
        dir: &Path,
        segments: &[ScriptSegment],
        voice_id: &str,
    ) -> AudioManifest {
        let mut manifest = AudioManifest::empty(job_id, voice_id);

        for (index, segment) in segments.iter().enumerate() {
            if segment.is_silent() {
                continue;
            }
            let path = dir.join(segment_file_name(index));

            let audio = match self.synthesizer.synthesize(&segment.text, voice_id).await {
                Ok(bytes) if !bytes.is_empty() => bytes,
                Ok(_) => {
                    tracing::warn!("Job {}: segment {} returned no audio", job_id, index);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Job {}: segment {} failed: {}", job_id, index, e);
                    continue;
                }
            };

            if let Err(e) = tokio::fs::write(&path, &audio).await {
                tracing::warn!(
                    "Job {}: could not write {}: {}",
                    job_id,
                    path.display(),
                    e
                );
                continue;
            }

            manifest.segments.push(ManifestSegment {
                index,
                text: segment.text.clone(),
                timing: segment.timing,
                audio_path: path.display().to_string(),
            });
        }

        tracing::info!(
            "Job {}: synthesized {}/{} narration segment(s)",
            job_id,
            manifest.segments.len(),
            segments.len()
        );
        manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narration::SegmentKind;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeSynth {
        reachable: bool,
        fail_on: Option<&'static str>,
        spoken: Mutex<Vec<String>>,
    }

    impl FakeSynth {
        fn new(reachable: bool, fail_on: Option<&'static str>) -> Self {
            Self {
                reachable,
                fail_on,
                spoken: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSynth {
        async fn verify(&self) -> Result<String, TtsError> {
            if self.reachable {
                Ok("ok".to_string())
            } else {
                Err(TtsError::Authentication)
            }
        }

        async fn synthesize(&self, text: &str, _voice_id: &str) -> Result<Vec<u8>, TtsError> {
            self.spoken.lock().unwrap().push(text.to_string());
            if Some(text) == self.fail_on {
                return Err(TtsError::Provider("boom".to_string()));
            }
            Ok(format!("mp3:{}", text).into_bytes())
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn segments() -> Vec<ScriptSegment> {
        vec![
            ScriptSegment::new("Intro", 0.0, 2.0, SegmentKind::Narration),
            ScriptSegment::new("[PAUSE]", 2.0, 0.5, SegmentKind::Narration),
            ScriptSegment::new("Broken", 2.5, 2.0, SegmentKind::Narration),
            ScriptSegment::new("Outro", 4.5, 2.0, SegmentKind::Narration),
        ]
    }

    #[tokio::test]
    async fn test_failed_segment_does_not_block_others() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path().join("videos"), tmp.path().join("audio"));
        let fake = Arc::new(FakeSynth::new(true, Some("Broken")));
        let narrator = NarrationSynthesizer::new(fake.clone(), store.clone());

        let manifest = narrator.synthesize("job-1", &segments(), "voice").await.unwrap();

        let indices: Vec<usize> = manifest.segments.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 3]);
        assert!(manifest.error.is_none());
        assert_eq!(*fake.spoken.lock().unwrap(), vec!["Intro", "Broken", "Outro"]);

        let dir = store.audio_dir("job-1");
        assert!(dir.join("segment_000.mp3").exists());
        assert!(!dir.join("segment_001.mp3").exists());
        assert!(dir.join("segment_003.mp3").exists());
        assert!(dir.join(SCRIPT_FILE).exists());
        assert_eq!(AudioManifest::load(&dir.join(MANIFEST_FILE)), Some(manifest));
    }

    #[tokio::test]
    async fn test_unreachable_provider_yields_empty_manifest() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path().join("videos"), tmp.path().join("audio"));
        let fake = Arc::new(FakeSynth::new(false, None));
        let narrator = NarrationSynthesizer::new(fake.clone(), store.clone());

        let manifest = narrator.synthesize("job-2", &segments(), "voice").await.unwrap();

        assert!(manifest.segments.is_empty());
        assert!(manifest.error.as_deref().unwrap().contains("Authentication"));
        assert!(fake.spoken.lock().unwrap().is_empty());
        assert!(store.audio_dir("job-2").join(MANIFEST_FILE).exists());
    }
}
