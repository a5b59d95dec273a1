// orchestrator/mod.rs - Job orchestrator: one task per job, sequencing every stage

mod error;
pub mod retry;

pub use error::JobError;

use crate::clients::Clients;
use crate::codegen::{CodeGenClient, GenerationConstraints};
use crate::config::AppConfig;
use crate::media::{AvSynchronizer, MediaSettings};
use crate::narration;
use crate::render::{RenderSettings, Renderer};
use crate::store::{write_json, ArtifactStore, StatusReport};
use crate::tts::{AudioManifest, NarrationSynthesizer, MANIFEST_FILE};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

fn default_duration_minutes() -> f64 {
    3.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: f64,
    #[serde(default)]
    pub voice_id: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            topic: None,
            grade_level: None,
            duration_minutes: default_duration_minutes(),
            voice_id: None,
        }
    }

    pub fn constraints(&self) -> GenerationConstraints {
        GenerationConstraints {
            topic: self.topic.clone(),
            grade_level: self.grade_level.clone(),
            duration_minutes: self.duration_minutes,
            ..GenerationConstraints::default()
        }
    }
}

/// A job accepted by [`JobOrchestrator::submit`].
#[derive(Debug)]
pub struct SubmittedJob {
    pub job_id: String,
    handle: JoinHandle<()>,
}

impl SubmittedJob {
    /// Wait until the job (and its supervisor) has resolved.
    pub async fn wait(self) {
        if let Err(e) = self.handle.await {
            tracing::error!("Job {}: supervisor ended abnormally: {}", self.job_id, e);
        }
    }
}

struct Pipeline {
    store: ArtifactStore,
    codegen: CodeGenClient,
    renderer: Renderer,
    narrator: NarrationSynthesizer,
    synchronizer: AvSynchronizer,
    default_voice: String,
    scene: String,
}

#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Pipeline>,
}

impl JobOrchestrator {
    pub fn new(clients: &Clients, config: &AppConfig) -> Self {
        let store = ArtifactStore::from_config(config);
        let pipeline = Pipeline {
            codegen: CodeGenClient::from_config(clients.generator.clone(), config),
            renderer: Renderer::new(RenderSettings::from_config(config), store.clone()),
            narrator: NarrationSynthesizer::new(clients.synthesizer.clone(), store.clone()),
            synchronizer: AvSynchronizer::new(MediaSettings::from_config(config)),
            default_voice: config.voice_id.clone(),
            scene: config.scene_name.clone(),
            store,
        };
        Self {
            inner: Arc::new(pipeline),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.inner.store
    }

    /// Accept a request: allocate a fresh id, create the job directory and
    /// spawn the job task under a supervisor.
    pub fn submit(&self, request: GenerationRequest) -> Result<SubmittedJob, JobError> {
        if request.prompt.trim().is_empty() {
            return Err(JobError::InvalidRequest("prompt is required".to_string()));
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        self.inner.store.create_job(&job_id)?;
        tracing::info!("Job {}: accepted", job_id);

        let worker = {
            let this = self.clone();
            let job_id = job_id.clone();
            tokio::spawn(async move {
                this.run(&job_id, &request).await;
            })
        };

        let store = self.inner.store.clone();
        let supervised_id = job_id.clone();
        let handle = tokio::spawn(async move {
            let Err(e) = worker.await else {
                return;
            };
            let reason = if e.is_panic() {
                panic_message(e.into_panic())
            } else {
                "job task was cancelled".to_string()
            };
            tracing::error!("Job {}: task aborted: {}", supervised_id, reason);

            let err = JobError::Unexpected(reason);
            if let Err(record) = store.record_failure(&supervised_id, &err.summary(), &err.detail()) {
                tracing::error!(
                    "Job {}: could not record unexpected failure: {}",
                    supervised_id,
                    record
                );
            }
        });

        Ok(SubmittedJob { job_id, handle })
    }

    /// Run one job to its terminal state and return the resulting projection.
    pub async fn run(&self, job_id: &str, request: &GenerationRequest) -> StatusReport {
        self.inner.process(job_id, request).await;
        self.inner.store.status(job_id)
    }

    pub fn status(&self, job_id: &str) -> StatusReport {
        self.inner.store.status(job_id)
    }

    pub fn video_path(&self, job_id: &str) -> Option<PathBuf> {
        self.inner.store.video_path(job_id)
    }
}

impl Pipeline {
    async fn process(&self, job_id: &str, request: &GenerationRequest) {
        let source = match self.prepare(job_id, request).await {
            Ok(source) => source,
            Err(e) => return self.fail(job_id, &e),
        };

        let guard = match self.store.begin_audio_processing(job_id) {
            Ok(guard) => guard,
            Err(e) => return self.fail(job_id, &e.into()),
        };

        match self.produce(job_id, &source, request).await {
            Ok(path) => {
                if let Err(e) = guard.release() {
                    tracing::error!("Job {}: {}", job_id, e);
                }
                tracing::info!("Job {}: completed, serving {}", job_id, path.display());
            }
            Err(e) => {
                // Recorded before the marker clears, so a partly adopted video
                // cannot make the job read as completed.
                self.fail(job_id, &e);
                drop(guard);
            }
        }
    }

    async fn prepare(&self, job_id: &str, request: &GenerationRequest) -> Result<String, JobError> {
        tracing::info!("Job {}: generating source", job_id);
        let mut constraints = request.constraints();
        constraints.scene_class = self.scene.clone();

        let source = self
            .codegen
            .generate(&request.prompt, &constraints)
            .await?;
        self.store.persist_source(job_id, &source)?;
        Ok(source)
    }

    /// Render and narration side by side, then the merge. Runs under the marker.
    async fn produce(
        &self,
        job_id: &str,
        source: &str,
        request: &GenerationRequest,
    ) -> Result<PathBuf, JobError> {
        let voice_id = request
            .voice_id
            .clone()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.default_voice.clone());

        let (rendered, manifest) = tokio::join!(
            self.renderer.render(job_id, source),
            self.narrate(job_id, source, &voice_id),
        );
        let rendered = rendered?;
        tracing::info!(
            "Job {}: render found via {} at {}",
            job_id,
            rendered.strategy,
            rendered.path.display()
        );

        match self.synchronizer.merge(&rendered.path, &manifest).await {
            Some(path) => Ok(path),
            None => {
                tracing::warn!("Job {}: narration not merged, serving silent video", job_id);
                Ok(rendered.path)
            }
        }
    }

    /// Extraction and synthesis. Problems here only cost the narration.
    async fn narrate(&self, job_id: &str, source: &str, voice_id: &str) -> AudioManifest {
        let script = narration::extract(source);
        tracing::info!(
            "Job {}: extracted {} narration segment(s), {:.1}s",
            job_id,
            script.segments().len(),
            script.total_duration()
        );

        if let Err(e) = self.store.persist_script(job_id, script.segments()) {
            tracing::warn!("Job {}: could not persist script: {}", job_id, e);
        }

        match self
            .narrator
            .synthesize(job_id, script.segments(), voice_id)
            .await
        {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::error!("Job {}: narration synthesis failed: {}", job_id, e);
                let manifest = AudioManifest::unreachable(job_id, voice_id, e.to_string());
                let path = self.store.audio_dir(job_id).join(MANIFEST_FILE);
                if let Err(e) = write_json(&path, &manifest) {
                    tracing::error!("Job {}: could not write {}: {}", job_id, path.display(), e);
                }
                manifest
            }
        }
    }

    fn fail(&self, job_id: &str, err: &JobError) {
        tracing::error!("Job {}: {}", job_id, err);
        if let Err(e) = self.store.record_failure(job_id, &err.summary(), &err.detail()) {
            tracing::error!("Job {}: could not record failure: {}", job_id, e);
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "job task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{CodeGenerator, GenerationError};
    use crate::store::JobState;
    use crate::tts::{SpeechSynthesizer, TtsError};
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    const SOURCE: &str = r#"from manim import *

class CreateScene(Scene):
    def construct(self):
        # NARRATION: Fractions describe parts of a whole.
        title = Text("Fractions")
        self.play(Write(title))
        self.wait(2)
"#;

    struct FixedGenerator(Result<&'static str, ()>);

    #[async_trait]
    impl CodeGenerator for FixedGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _constraints: &GenerationConstraints,
        ) -> Result<String, GenerationError> {
            match self.0 {
                Ok(source) => Ok(source.to_string()),
                Err(()) => Err(GenerationError::Provider("HTTP 500".to_string())),
            }
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    /// Writes a scene named after whatever class the constraints ask for.
    struct SceneEcho;

    #[async_trait]
    impl CodeGenerator for SceneEcho {
        async fn generate(
            &self,
            _prompt: &str,
            constraints: &GenerationConstraints,
        ) -> Result<String, GenerationError> {
            Ok(SOURCE.replace("CreateScene", &constraints.scene_class))
        }

        fn name(&self) -> &str {
            "scene-echo"
        }
    }

    struct PanickingGenerator;

    #[async_trait]
    impl CodeGenerator for PanickingGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _constraints: &GenerationConstraints,
        ) -> Result<String, GenerationError> {
            panic!("generator exploded");
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    struct FakeSpeech {
        reachable: bool,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSpeech {
        async fn verify(&self) -> Result<String, TtsError> {
            if self.reachable {
                Ok("ok".to_string())
            } else {
                Err(TtsError::Network("connection refused".to_string()))
            }
        }

        async fn synthesize(&self, _text: &str, _voice_id: &str) -> Result<Vec<u8>, TtsError> {
            Ok(b"ID3fake".to_vec())
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn config(tmp: &TempDir, renderer_body: &str) -> AppConfig {
        let renderer = tmp.path().join("renderer.sh");
        let ffmpeg = tmp.path().join("ffmpeg.sh");
        fs::write(&renderer, renderer_body).unwrap();
        fs::write(
            &ffmpeg,
            "for a in \"$@\"; do last=\"$a\"; done\nprintf 'merged' > \"$last\"\n",
        )
        .unwrap();

        AppConfig {
            videos_dir: tmp.path().join("videos"),
            audio_dir: tmp.path().join("audio"),
            renderer_bin: format!("sh {}", renderer.display()),
            ffmpeg_bin: format!("sh {}", ffmpeg.display()),
            render_timeout_secs: 10,
            muxer_timeout_secs: 10,
            generation_max_retries: 1,
            generation_retry_delay_secs: 0.0,
            ..AppConfig::default()
        }
    }

    fn orchestrator(config: &AppConfig, generator: Arc<dyn CodeGenerator>, reachable: bool) -> JobOrchestrator {
        let clients = Clients::new(generator, Arc::new(FakeSpeech { reachable }));
        JobOrchestrator::new(&clients, config)
    }

    // $1=-qm $2=--output_file $3=<job> $4=--media_dir $5=<media> $6=<script> $7=<scene>
    const WRITES_CANONICAL: &str = r#"
stem=$(basename "$6" .py)
out="$5/videos/$stem/720p30"
mkdir -p "$out"
printf 'silent' > "$out/$3.mp4"
"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_narrated_job_completes() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, WRITES_CANONICAL);
        let orch = orchestrator(&config, Arc::new(FixedGenerator(Ok(SOURCE))), true);

        let job = orch.submit(GenerationRequest::new("Explain fractions")).unwrap();
        let job_id = job.job_id.clone();
        job.wait().await;

        let status = orch.status(&job_id);
        assert_eq!(orch.store().state(&job_id), JobState::Completed);
        assert!(status.has_audio);
        let served = orch.video_path(&job_id).unwrap();
        assert_eq!(served, orch.store().narrated_video_path(&job_id));
        assert_eq!(fs::read(served).unwrap(), b"merged");
        assert!(!orch.store().is_audio_processing(&job_id));
        assert!(orch.store().source_path(&job_id).is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_render_output_fails_job() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, "exit 0\n");
        let orch = orchestrator(&config, Arc::new(FixedGenerator(Ok(SOURCE))), true);

        let status = orch.run("job-b", &GenerationRequest::new("Explain fractions")).await;

        assert_eq!(orch.store().state("job-b"), JobState::Failed);
        assert!(status.message.contains("No video files were found"));
        let artifact = fs::read_to_string(orch.store().job_dir("job-b").join("error.txt")).unwrap();
        assert!(artifact.contains("No video files were found"));
        assert!(!orch.store().is_audio_processing("job-b"));
        assert!(orch.video_path("job-b").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreachable_tts_serves_silent_render() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, WRITES_CANONICAL);
        let orch = orchestrator(&config, Arc::new(FixedGenerator(Ok(SOURCE))), false);

        orch.run("job-c", &GenerationRequest::new("Explain fractions")).await;

        assert_eq!(orch.store().state("job-c"), JobState::Completed);
        let served = orch.video_path("job-c").unwrap();
        assert_eq!(served, orch.store().primary_video_path("job-c"));
        assert_eq!(fs::read(served).unwrap(), b"silent");

        let manifest =
            AudioManifest::load(&orch.store().audio_dir("job-c").join(MANIFEST_FILE)).unwrap();
        assert!(manifest.segments.is_empty());
        assert!(manifest.error.is_some());
        assert!(!orch.status("job-c").has_audio);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_synthesis_io_failure_still_writes_manifest() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, WRITES_CANONICAL);
        let orch = orchestrator(&config, Arc::new(FixedGenerator(Ok(SOURCE))), true);
        // A directory where script.json should go makes the synthesizer fail locally.
        fs::create_dir_all(orch.store().audio_dir("job-e").join("script.json")).unwrap();

        orch.run("job-e", &GenerationRequest::new("Explain fractions")).await;

        assert_eq!(orch.store().state("job-e"), JobState::Completed);
        let manifest =
            AudioManifest::load(&orch.store().audio_dir("job-e").join(MANIFEST_FILE)).unwrap();
        assert!(manifest.segments.is_empty());
        assert!(manifest.error.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_after_partial_adoption_is_recorded() {
        let tmp = TempDir::new().unwrap();
        let videos = tmp.path().join("videos");
        let body = format!(
            "mkdir -p {dir}/$3\nprintf 'partial' > {dir}/$3/$3.mp4\necho 'RuntimeError: boom' >&2\nexit 1\n",
            dir = videos.display()
        );
        let config = config(&tmp, &body);
        let orch = orchestrator(&config, Arc::new(FixedGenerator(Ok(SOURCE))), true);

        let status = orch.run("job-f", &GenerationRequest::new("Explain fractions")).await;

        assert_eq!(orch.store().state("job-f"), JobState::Failed);
        assert!(status.message.starts_with("Renderer failed"));
        assert!(!orch.store().is_audio_processing("job-f"));
        assert!(orch.video_path("job-f").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_configured_scene_reaches_generator_and_renderer() {
        let tmp = TempDir::new().unwrap();
        let body = format!("test \"$7\" = MainScene || exit 1\n{}", WRITES_CANONICAL);
        let mut config = config(&tmp, &body);
        config.scene_name = "MainScene".to_string();
        let generator = Arc::new(SceneEcho);
        let orch = orchestrator(&config, generator, true);

        orch.run("job-g", &GenerationRequest::new("Explain fractions")).await;

        assert_eq!(orch.store().state("job-g"), JobState::Completed);
    }

    #[tokio::test]
    async fn test_generation_failure_is_recorded() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, "exit 1\n");
        let orch = orchestrator(&config, Arc::new(FixedGenerator(Err(()))), true);

        let status = orch.run("job-d", &GenerationRequest::new("Explain fractions")).await;

        assert_eq!(orch.store().state("job-d"), JobState::Failed);
        assert!(status.message.starts_with("Failed to generate Manim code"));
        assert!(!orch.store().source_path("job-d").exists());
    }

    #[tokio::test]
    async fn test_panicking_job_is_supervised() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, "exit 1\n");
        let orch = orchestrator(&config, Arc::new(PanickingGenerator), true);

        let job = orch.submit(GenerationRequest::new("Explain fractions")).unwrap();
        let job_id = job.job_id.clone();
        job.wait().await;

        assert_eq!(orch.store().state(&job_id), JobState::Failed);
        let message = orch.status(&job_id).message;
        assert!(message.contains("unexpected error"));
        assert!(message.contains("generator exploded"));
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, "exit 0\n");
        let orch = orchestrator(&config, Arc::new(FixedGenerator(Ok(SOURCE))), true);

        let err = orch.submit(GenerationRequest::new("   ")).unwrap_err();
        assert!(matches!(err, JobError::InvalidRequest(_)));
    }

    #[test]
    fn test_request_defaults() {
        let request: GenerationRequest =
            serde_json::from_str(r#"{"prompt":"Explain photosynthesis","topic":"biology"}"#).unwrap();
        assert_eq!(request.duration_minutes, 3.0);
        assert_eq!(request.constraints().topic.as_deref(), Some("biology"));
        assert!(request.voice_id.is_none());
    }
}
