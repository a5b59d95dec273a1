// codegen/types.rs - errors for source generation

use crate::orchestrator::retry::Retryable;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid response from code generator")]
    InvalidResponse,

    #[error("Code generator returned an empty response")]
    EmptyResponse,

    #[error("Code generation timed out after {0}s")]
    Timeout(u64),

    #[error("API key not configured: {0}")]
    MissingApiKey(&'static str),

    #[error("Code generation failed after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: u32,
        last: Box<GenerationError>,
    },
}

impl Retryable for GenerationError {
    fn is_retryable(&self) -> bool {
        !matches!(
            self,
            GenerationError::MissingApiKey(_) | GenerationError::Exhausted { .. }
        )
    }
}
