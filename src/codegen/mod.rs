// codegen/mod.rs - code generation capability + timeout/retry client

mod clean;
mod gemini;
mod prompt;
mod types;

pub use clean::strip_code_fences;
pub use gemini::GeminiGenerator;
pub use prompt::{build_prompt, GenerationConstraints, SCENE_CLASS};
pub use types::GenerationError;

use crate::config::AppConfig;
use crate::orchestrator::retry::RetryPolicy;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A model that turns an educational prompt into Manim scene source.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        constraints: &GenerationConstraints,
    ) -> Result<String, GenerationError>;

    /// Provider name
    fn name(&self) -> &str;
}

/// Wraps a [`CodeGenerator`] with a per-attempt deadline, markdown cleanup and
/// exponential backoff. Has no side effects besides the provider calls.
#[derive(Clone)]
pub struct CodeGenClient {
    generator: Arc<dyn CodeGenerator>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl CodeGenClient {
    pub fn new(generator: Arc<dyn CodeGenerator>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            generator,
            timeout,
            retry,
        }
    }

    pub fn from_config(generator: Arc<dyn CodeGenerator>, config: &AppConfig) -> Self {
        // One initial attempt plus `generation_max_retries` retries.
        let retry = RetryPolicy::new(
            config.generation_max_retries.saturating_add(1),
            Duration::from_secs_f64(config.generation_retry_delay_secs),
        );
        Self::new(
            generator,
            Duration::from_secs(config.generation_timeout_secs),
            retry,
        )
    }

    pub async fn generate(
        &self,
        prompt: &str,
        constraints: &GenerationConstraints,
    ) -> Result<String, GenerationError> {
        let label = format!("Codegen '{}'", self.generator.name());
        let mut attempts = 0;

        let result = self
            .retry
            .run(&label, |_| {
                attempts += 1;
                self.attempt(prompt, constraints)
            })
            .await;

        match result {
            Ok(source) => {
                tracing::info!(
                    "{}: generated {} chars of source",
                    label,
                    source.len()
                );
                Ok(source)
            }
            Err(e) => {
                tracing::error!("{}: exhausted after {} attempt(s)", label, attempts);
                Err(GenerationError::Exhausted {
                    attempts,
                    last: Box::new(e),
                })
            }
        }
    }

    async fn attempt(
        &self,
        prompt: &str,
        constraints: &GenerationConstraints,
    ) -> Result<String, GenerationError> {
        let raw = tokio::time::timeout(self.timeout, self.generator.generate(prompt, constraints))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout.as_secs()))??;

        if raw.contains("```") {
            tracing::warn!("Codegen: response wrapped in markdown fences, cleaning");
        }
        let source = strip_code_fences(&raw);
        if source.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(source)
    }
}
