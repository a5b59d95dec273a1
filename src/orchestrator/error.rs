// orchestrator/error.rs - job-level error aggregation

use crate::codegen::GenerationError;
use crate::config::ConfigError;
use crate::render::RenderError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to generate Manim code: {0}")]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl JobError {
    /// Headline written as the first line of the error artifact.
    pub fn summary(&self) -> String {
        let text = self.to_string();
        let line = text.lines().next().unwrap_or_default().trim();
        if line.is_empty() {
            "An error occurred during video generation".to_string()
        } else {
            line.to_string()
        }
    }

    /// Raw diagnostics kept below the headline.
    pub fn detail(&self) -> String {
        match self {
            JobError::Render(e) => e.diagnostics().to_string(),
            JobError::Generation(GenerationError::Exhausted { last, .. }) => {
                format!("last error: {:?}", last)
            }
            _ => String::new(),
        }
    }
}
