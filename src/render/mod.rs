// render/mod.rs - Renderer invoker: validate, run the renderer, discover and adopt output

pub mod discovery;
pub mod validate;

use crate::config::AppConfig;
use crate::process::{run_with_timeout, ProcessError, Tool};
use crate::store::{ArtifactStore, StoreError};
use discovery::{default_chain, discover, DiscoveryContext, DiscoveryStrategy};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Source validation failed: {0}")]
    SourceValidation(String),

    #[error("Renderer timed out after {0}s")]
    Timeout(u64),

    #[error("Renderer failed: {message}")]
    Failed { message: String, stderr: String },

    #[error("No video files were found after rendering (searched {searched})")]
    ArtifactNotFound { searched: String, stderr: String },

    #[error("Could not start renderer: {0}")]
    Spawn(String),

    #[error("Render I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RenderError {
    /// Raw renderer output kept for the error artifact.
    pub fn diagnostics(&self) -> &str {
        match self {
            RenderError::Failed { stderr, .. } | RenderError::ArtifactNotFound { stderr, .. } => {
                stderr
            }
            _ => "",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub tool: Tool,
    pub quality: String,
    pub scene: String,
    pub timeout: Duration,
    pub fallback_dirs: Vec<PathBuf>,
}

impl RenderSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            tool: Tool::parse(&config.renderer_bin),
            quality: config.render_quality.clone(),
            scene: config.scene_name.clone(),
            timeout: Duration::from_secs(config.render_timeout_secs),
            fallback_dirs: default_fallback_dirs(),
        }
    }
}

fn default_fallback_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![std::env::temp_dir()];
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.join("media"));
        dirs.push(cwd);
    }
    dirs
}

#[derive(Debug, Clone)]
pub struct RenderedVideo {
    pub path: PathBuf,
    pub strategy: &'static str,
    pub stderr: String,
}

pub struct Renderer {
    settings: RenderSettings,
    store: ArtifactStore,
    chain: Vec<Box<dyn DiscoveryStrategy>>,
}

impl Renderer {
    pub fn new(settings: RenderSettings, store: ArtifactStore) -> Self {
        Self {
            settings,
            store,
            chain: default_chain(),
        }
    }

    /// Render `source` for `job_id` and copy the output into the job directory.
    /// Returns the primary artifact, `<jobId>.mp4`.
    pub async fn render(&self, job_id: &str, source: &str) -> Result<RenderedVideo, RenderError> {
        let issues = validate::check_source(source, &self.settings.scene);
        if !issues.is_empty() {
            tracing::warn!(
                "Job {}: source rejected before rendering ({} issue(s))",
                job_id,
                issues.len()
            );
            return Err(RenderError::SourceValidation(validate::describe(&issues, &self.settings.scene)));
        }

        let work = tempfile::Builder::new()
            .prefix("edututor-render-")
            .tempdir()
            .map_err(|e| RenderError::Io(e.to_string()))?;
        let script = work.path().join(format!("{}.py", job_id));
        let media = work.path().join("media");
        tokio::fs::write(&script, source)
            .await
            .map_err(|e| RenderError::Io(format!("{}: {}", script.display(), e)))?;

        let mut cmd = self.settings.tool.command();
        cmd.arg(format!("-q{}", self.settings.quality))
            .arg("--output_file")
            .arg(job_id)
            .arg("--media_dir")
            .arg(&media)
            .arg(&script)
            .arg(&self.settings.scene)
            .current_dir(work.path());

        tracing::info!(
            "Job {}: rendering with {} (quality {}, timeout {}s)",
            job_id,
            self.settings.tool.program(),
            self.settings.quality,
            self.settings.timeout.as_secs()
        );

        let output = run_with_timeout(cmd, self.settings.timeout)
            .await
            .map_err(|e| match e {
                ProcessError::Timeout { secs, .. } => RenderError::Timeout(secs),
                ProcessError::Spawn { .. } => RenderError::Spawn(e.to_string()),
                ProcessError::Io { .. } => RenderError::Io(e.to_string()),
            })?;

        if !output.success() {
            let message = match validate::diagnose_stderr(&output.stderr, &self.settings.scene) {
                Some(issue) => issue.message(&self.settings.scene),
                None => {
                    let tail = output.stderr_tail(20);
                    if tail.is_empty() {
                        format!("renderer exited with code {:?}", output.code)
                    } else {
                        tail
                    }
                }
            };
            tracing::error!("Job {}: renderer exited with {:?}", job_id, output.code);
            return Err(RenderError::Failed {
                message,
                stderr: output.stderr,
            });
        }

        let ctx = DiscoveryContext {
            job_id,
            work_dir: work.path(),
            media_dir: &media,
            script_stem: job_id,
            quality: &self.settings.quality,
            stdout: &output.stdout,
            fallback_dirs: &self.settings.fallback_dirs,
        };

        let Some((strategy, files)) = discover(&ctx, &self.chain) else {
            let mut searched = vec![work.path().display().to_string()];
            searched.extend(
                self.settings
                    .fallback_dirs
                    .iter()
                    .map(|d| d.display().to_string()),
            );
            return Err(RenderError::ArtifactNotFound {
                searched: searched.join(", "),
                stderr: output.stderr,
            });
        };

        let path = self.store.adopt_videos(job_id, &files)?;

        Ok(RenderedVideo {
            path,
            strategy,
            stderr: output.stderr,
        })
    }
}
