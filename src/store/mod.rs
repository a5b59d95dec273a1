// store/mod.rs - filesystem-backed artifact store, the ground truth for job state

mod scan;
mod status;

pub use scan::{collect_videos, is_partial, is_video, videos_in, VIDEO_EXTENSION};
pub use status::{video_url, JobState, JobStatus, StatusReport};

use crate::config::AppConfig;
use crate::narration::ScriptSegment;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const MARKER_FILE: &str = "audio_processing.marker";
pub const ERROR_FILE: &str = "error.txt";
pub const SCRIPT_FILE: &str = "script.json";
pub const NARRATED_SUFFIX: &str = "_with_audio";

const JOB_SCAN_DEPTH: usize = 6;
const MAX_JOB_ID_LEN: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Invalid job id: {0:?}")]
    InvalidJobId(String),

    #[error("Job {0} is already {1}; terminal states are final")]
    Terminal(String, &'static str),
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Owns `<videos>/<jobId>/` and `<audio>/<jobId>/`. Every state transition a job
/// goes through is one method here, so legality is checked in one place.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    videos_dir: PathBuf,
    audio_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(videos_dir: impl Into<PathBuf>, audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            videos_dir: videos_dir.into(),
            audio_dir: audio_dir.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.videos_dir.clone(), config.audio_dir.clone())
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.videos_dir.join(job_id)
    }

    pub fn audio_dir(&self, job_id: &str) -> PathBuf {
        self.audio_dir.join(job_id)
    }

    pub fn source_path(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join(format!("{}.py", job_id))
    }

    pub fn primary_video_path(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id)
            .join(format!("{}.{}", job_id, VIDEO_EXTENSION))
    }

    pub fn narrated_video_path(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id)
            .join(format!("{}{}.{}", job_id, NARRATED_SUFFIX, VIDEO_EXTENSION))
    }

    fn marker_path(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join(MARKER_FILE)
    }

    fn error_path(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join(ERROR_FILE)
    }

    // --- Transitions ---

    /// Submitted: the job directory exists, so status reports `processing`.
    pub fn create_job(&self, job_id: &str) -> Result<PathBuf, StoreError> {
        validate_job_id(job_id)?;
        let dir = self.job_dir(job_id);
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        tracing::debug!("Created job directory {}", dir.display());
        Ok(dir)
    }

    pub fn persist_source(&self, job_id: &str, source: &str) -> Result<PathBuf, StoreError> {
        self.create_job(job_id)?;
        let path = self.source_path(job_id);
        fs::write(&path, source).map_err(|e| io_err(&path, e))?;
        Ok(path)
    }

    pub fn persist_script(
        &self,
        job_id: &str,
        segments: &[ScriptSegment],
    ) -> Result<PathBuf, StoreError> {
        self.create_job(job_id)?;
        let path = self.job_dir(job_id).join(SCRIPT_FILE);
        write_json(&path, &segments)?;
        Ok(path)
    }

    /// Copy discovered render output into the job directory.
    ///
    /// The first file becomes `<jobId>.mp4`; the rest keep their names unless that
    /// would clobber an existing artifact. Returns the primary artifact path.
    pub fn adopt_videos(&self, job_id: &str, discovered: &[PathBuf]) -> Result<PathBuf, StoreError> {
        let dir = self.create_job(job_id)?;
        let primary = self.primary_video_path(job_id);

        let Some((first, rest)) = discovered.split_first() else {
            return Err(io_err(
                &dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no video files to adopt"),
            ));
        };

        copy_unless_same(first, &primary)?;

        for source in rest {
            let Some(name) = source.file_name() else {
                continue;
            };
            let target = dir.join(name);
            if target.exists() || same_file(source, &target) {
                continue;
            }
            copy_unless_same(source, &target)?;
        }

        tracing::info!(
            "Job {}: adopted {} video file(s), primary {}",
            job_id,
            discovered.len(),
            primary.display()
        );
        Ok(primary)
    }

    /// AudioProcessing: assert the marker. The returned guard clears it when
    /// released or dropped, whichever happens first.
    pub fn begin_audio_processing(&self, job_id: &str) -> Result<MarkerGuard, StoreError> {
        self.ensure_not_terminal(job_id)?;
        self.create_job(job_id)?;

        let path = self.marker_path(job_id);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        let note = format!(
            "Audio narration processing in progress (since {})",
            chrono::Utc::now().to_rfc3339()
        );
        file.write_all(note.as_bytes())
            .map_err(|e| io_err(&path, e))?;

        tracing::info!("Job {}: audio-processing marker asserted", job_id);
        Ok(MarkerGuard {
            job_id: job_id.to_string(),
            path,
            active: true,
        })
    }

    pub fn is_audio_processing(&self, job_id: &str) -> bool {
        validate_job_id(job_id).is_ok() && self.marker_path(job_id).exists()
    }

    /// Failed: write the error artifact. The first line of `summary` is what a
    /// polling client sees; `detail` keeps raw diagnostics underneath.
    pub fn record_failure(
        &self,
        job_id: &str,
        summary: &str,
        detail: &str,
    ) -> Result<PathBuf, StoreError> {
        self.ensure_not_terminal(job_id)?;
        self.create_job(job_id)?;

        let headline = summary.lines().next().unwrap_or_default().trim();
        let headline = if headline.is_empty() {
            "An error occurred during video generation"
        } else {
            headline
        };

        let mut body = format!("{}\n", headline);
        let rest_of_summary: Vec<&str> = summary.lines().skip(1).collect();
        if !rest_of_summary.is_empty() {
            body.push_str(&rest_of_summary.join("\n"));
            body.push('\n');
        }
        if !detail.trim().is_empty() {
            body.push_str("\n--- details ---\n");
            body.push_str(detail.trim_end());
            body.push('\n');
        }
        body.push_str(&format!("\nrecorded at {}\n", chrono::Utc::now().to_rfc3339()));

        let path = self.error_path(job_id);
        fs::write(&path, body).map_err(|e| io_err(&path, e))?;
        tracing::error!("Job {}: failed: {}", job_id, headline);
        Ok(path)
    }

    fn ensure_not_terminal(&self, job_id: &str) -> Result<(), StoreError> {
        validate_job_id(job_id)?;
        let state = self.state(job_id);
        if state.is_terminal() {
            return Err(StoreError::Terminal(job_id.to_string(), state.as_str()));
        }
        Ok(())
    }

    // --- Projections (read only) ---

    pub fn state(&self, job_id: &str) -> JobState {
        self.snapshot(job_id).0
    }

    pub fn status(&self, job_id: &str) -> StatusReport {
        let (state, videos) = self.snapshot(job_id);
        let report = |message: &str| StatusReport::new(job_id, state.into(), message);
        match state {
            JobState::NotFound => report("Video ID not found"),
            JobState::Failed => {
                let message = self
                    .error_message(job_id)
                    .unwrap_or_else(|| "An error occurred during video generation".to_string());
                report(&message)
            }
            JobState::AudioProcessing if !videos.is_empty() => {
                report("Adding audio narration to video").with_url()
            }
            JobState::AudioProcessing | JobState::Processing => {
                report("Video generation in progress")
            }
            JobState::Completed if videos.iter().any(|p| is_narrated(p)) => {
                report("Video generation completed with audio narration")
                    .with_url()
                    .narrated()
            }
            JobState::Completed => report("Video generation completed").with_url(),
        }
    }

    /// Servable video for a job. Never returns a path while the marker is asserted.
    pub fn video_path(&self, job_id: &str) -> Option<PathBuf> {
        let (state, videos) = self.snapshot(job_id);
        if state != JobState::Completed {
            return None;
        }

        [self.narrated_video_path(job_id), self.primary_video_path(job_id)]
            .into_iter()
            .find(|p| p.exists())
            .or_else(|| videos.iter().find(|p| is_narrated(p)).cloned())
            .or_else(|| videos.into_iter().next())
    }

    pub fn error_message(&self, job_id: &str) -> Option<String> {
        let raw = fs::read_to_string(self.error_path(job_id)).ok()?;
        raw.lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
    }

    /// State plus the job's video files, from a single directory scan.
    fn snapshot(&self, job_id: &str) -> (JobState, Vec<PathBuf>) {
        if validate_job_id(job_id).is_err() || !self.job_dir(job_id).is_dir() {
            return (JobState::NotFound, Vec::new());
        }
        let videos = collect_videos(&self.job_dir(job_id), JOB_SCAN_DEPTH);
        let state = if self.error_path(job_id).exists() {
            JobState::Failed
        } else if self.marker_path(job_id).exists() {
            JobState::AudioProcessing
        } else if !videos.is_empty() {
            JobState::Completed
        } else {
            JobState::Processing
        };
        (state, videos)
    }
}

fn is_narrated(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.contains(NARRATED_SUFFIX))
        .unwrap_or(false)
}

/// Keeps the audio-processing marker asserted for as long as it lives.
#[must_use = "dropping the guard clears the audio-processing marker"]
#[derive(Debug)]
pub struct MarkerGuard {
    job_id: String,
    path: PathBuf,
    active: bool,
}

impl MarkerGuard {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Clear the marker now. On failure the guard stays armed and `Drop` tries again.
    pub fn release(mut self) -> Result<(), StoreError> {
        self.clear()?;
        tracing::info!("Job {}: audio-processing marker cleared", self.job_id);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        remove_if_present(&self.path)?;
        self.active = false;
        Ok(())
    }
}

impl Drop for MarkerGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        match self.clear() {
            Ok(()) => tracing::warn!(
                "Job {}: audio-processing marker cleared on early exit",
                self.job_id
            ),
            Err(e) => tracing::error!(
                "Job {}: failed to clear audio-processing marker: {}",
                self.job_id,
                e
            ),
        }
    }
}

pub fn validate_job_id(job_id: &str) -> Result<(), StoreError> {
    let valid = !job_id.is_empty()
        && job_id.len() <= MAX_JOB_ID_LEN
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidJobId(job_id.to_string()))
    }
}

pub(crate) fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| StoreError::Serialize(e.to_string()))?;
    fs::write(path, json).map_err(|e| io_err(path, e))
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn copy_unless_same(source: &Path, target: &Path) -> Result<(), StoreError> {
    if same_file(source, target) {
        return Ok(());
    }
    fs::copy(source, target).map_err(|e| io_err(source, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narration::{ScriptSegment, SegmentKind};
    use tempfile::TempDir;

    fn store() -> (TempDir, ArtifactStore) {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path().join("videos"), tmp.path().join("audio"));
        (tmp, store)
    }

    #[test]
    fn test_unknown_job_is_not_found() {
        let (_tmp, store) = store();
        let report = store.status("missing");
        assert_eq!(report.status, JobStatus::NotFound);
        assert!(store.video_path("missing").is_none());
    }

    #[test]
    fn test_path_like_ids_are_rejected() {
        let (_tmp, store) = store();
        assert!(matches!(
            store.create_job("../escape"),
            Err(StoreError::InvalidJobId(_))
        ));
        assert_eq!(store.state("../escape"), JobState::NotFound);
    }

    #[test]
    fn test_fresh_job_is_processing() {
        let (_tmp, store) = store();
        store.create_job("job-1").unwrap();
        let report = store.status("job-1");
        assert_eq!(report.status, JobStatus::Processing);
        assert_eq!(report.message, "Video generation in progress");
        assert!(report.video_url.is_none());
    }

    #[test]
    fn test_failure_reports_first_line() {
        let (_tmp, store) = store();
        store.create_job("job-2").unwrap();
        store
            .record_failure("job-2", "Render failed: boom\nsecond line", "Traceback ...")
            .unwrap();

        let report = store.status("job-2");
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.message, "Render failed: boom");

        let raw = fs::read_to_string(store.job_dir("job-2").join(ERROR_FILE)).unwrap();
        assert!(raw.contains("Traceback ..."));
    }

    #[test]
    fn test_marker_hides_existing_video() {
        let (_tmp, store) = store();
        store.create_job("job-3").unwrap();
        fs::write(store.primary_video_path("job-3"), b"silent").unwrap();

        let guard = store.begin_audio_processing("job-3");
        // a silent video already exists, so the job is completed and the marker is refused
        assert!(matches!(guard, Err(StoreError::Terminal(_, "completed"))));

        fs::remove_file(store.primary_video_path("job-3")).unwrap();
        let guard = store.begin_audio_processing("job-3").unwrap();
        fs::write(store.primary_video_path("job-3"), b"silent").unwrap();

        let report = store.status("job-3");
        assert_eq!(report.status, JobStatus::Processing);
        assert_eq!(report.message, "Adding audio narration to video");
        assert!(store.video_path("job-3").is_none());

        guard.release().unwrap();
        assert_eq!(store.status("job-3").status, JobStatus::Completed);
        assert_eq!(store.video_path("job-3"), Some(store.primary_video_path("job-3")));
    }

    #[test]
    fn test_dropped_guard_clears_marker() {
        let (_tmp, store) = store();
        {
            let _guard = store.begin_audio_processing("job-4").unwrap();
            assert!(store.is_audio_processing("job-4"));
        }
        assert!(!store.is_audio_processing("job-4"));
    }

    #[test]
    fn test_failed_release_keeps_guard_armed() {
        let (_tmp, store) = store();
        let mut guard = store.begin_audio_processing("job-10").unwrap();
        let marker = store.job_dir("job-10").join(MARKER_FILE);
        fs::remove_file(&marker).unwrap();
        fs::create_dir_all(marker.join("stuck")).unwrap();

        assert!(guard.clear().is_err());
        assert!(guard.active);

        fs::remove_dir_all(&marker).unwrap();
        drop(guard);
        assert!(!store.is_audio_processing("job-10"));
    }

    #[test]
    fn test_narrated_video_preferred() {
        let (_tmp, store) = store();
        store.create_job("job-5").unwrap();
        fs::write(store.primary_video_path("job-5"), b"silent").unwrap();
        fs::write(store.narrated_video_path("job-5"), b"narrated").unwrap();

        let report = store.status("job-5");
        assert_eq!(report.status, JobStatus::Completed);
        assert!(report.has_audio);
        assert_eq!(report.video_url.as_deref(), Some("/api/video/job-5"));
        assert_eq!(store.video_path("job-5"), Some(store.narrated_video_path("job-5")));
    }

    #[test]
    fn test_status_is_idempotent() {
        let (_tmp, store) = store();
        store.create_job("job-6").unwrap();
        fs::write(store.job_dir("job-6").join("render.mp4"), b"v").unwrap();

        let first = store.status("job-6");
        let second = store.status("job-6");
        assert_eq!(first, second);
        assert_eq!(first.status, JobStatus::Completed);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let (_tmp, store) = store();
        store.create_job("job-7").unwrap();
        store.record_failure("job-7", "first", "").unwrap();

        let again = store.record_failure("job-7", "second", "");
        assert!(matches!(again, Err(StoreError::Terminal(_, "failed"))));
        assert_eq!(store.status("job-7").message, "first");
    }

    #[test]
    fn test_adopt_videos_names_primary_after_job() {
        let (tmp, store) = store();
        let render_dir = tmp.path().join("render");
        fs::create_dir_all(&render_dir).unwrap();
        let a = render_dir.join("Scene.mp4");
        let b = render_dir.join("Extra.mp4");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();

        let primary = store.adopt_videos("job-8", &[a, b]).unwrap();

        assert_eq!(primary, store.primary_video_path("job-8"));
        assert_eq!(fs::read(&primary).unwrap(), b"a");
        assert!(store.job_dir("job-8").join("Extra.mp4").exists());
    }

    #[test]
    fn test_script_is_persisted_as_json() {
        let (_tmp, store) = store();
        let segments = vec![ScriptSegment::new("Hello there", 0.0, 2.0, SegmentKind::Narration)];
        let path = store.persist_script("job-9", &segments).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(raw[0]["type"], "narration");
        assert_eq!(raw[0]["timing"]["duration"], 2.0);
    }
}
