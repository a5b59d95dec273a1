// tts/types.rs - speech synthesis errors with retry classification

use crate::orchestrator::retry::Retryable;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Authentication failed. Check the ElevenLabs API key")]
    Authentication,

    #[error("Access forbidden. The API key may lack permission")]
    Forbidden,

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("API key not configured: {0}")]
    MissingApiKey(&'static str),

    #[error("Audio I/O error: {0}")]
    Io(String),
}

impl Retryable for TtsError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            TtsError::Network(_) | TtsError::Timeout | TtsError::RateLimit | TtsError::Provider(_)
        )
    }
}
