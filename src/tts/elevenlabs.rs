// tts/elevenlabs.rs - ElevenLabs text-to-speech adapter

use super::{SpeechSynthesizer, TtsError};
use crate::orchestrator::retry::RetryPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ELEVENLABS_API_URL: &str = "https://api.elevenlabs.io/v1";
const TIMEOUT_SECS: u64 = 60;

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
}

#[derive(Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<serde_json::Value>,
}

pub struct ElevenLabsSynthesizer {
    api_key: String,
    model_id: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl ElevenLabsSynthesizer {
    pub fn new(api_key: String, model_id: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        tracing::info!("ElevenLabs synthesizer initialized (model {})", model_id);

        Self {
            api_key,
            model_id,
            client,
            retry: RetryPolicy::new(3, Duration::from_secs(2)),
        }
    }

    fn ensure_key(&self) -> Result<(), TtsError> {
        if self.api_key.trim().is_empty() {
            return Err(TtsError::MissingApiKey("ELEVENLABS_API_KEY"));
        }
        Ok(())
    }

    async fn convert(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, TtsError> {
        let url = format!("{}/text-to-speech/{}", ELEVENLABS_API_URL, voice_id);
        let request = SpeechRequest {
            text,
            model_id: &self.model_id,
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
                style: 0.0,
            },
        };

        let resp = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("accept", "audio/mpeg")
            .json(&request)
            .send()
            .await
            .map_err(map_transport)?;

        let status = resp.status();
        if status.is_success() {
            let bytes = resp.bytes().await.map_err(map_transport)?;
            if bytes.is_empty() {
                return Err(TtsError::Provider("empty audio response".to_string()));
            }
            return Ok(bytes.to_vec());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(map_status(status.as_u16(), voice_id, body))
    }
}

fn map_transport(e: reqwest::Error) -> TtsError {
    if e.is_timeout() {
        TtsError::Timeout
    } else {
        TtsError::Network(e.to_string())
    }
}

fn map_status(status: u16, voice_id: &str, body: String) -> TtsError {
    match status {
        401 => TtsError::Authentication,
        403 => TtsError::Forbidden,
        404 => TtsError::VoiceNotFound(voice_id.to_string()),
        429 => TtsError::RateLimit,
        400 if body.to_lowercase().contains("voice") => TtsError::VoiceNotFound(voice_id.to_string()),
        _ => TtsError::Provider(format!("HTTP {}: {}", status, body)),
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn verify(&self) -> Result<String, TtsError> {
        self.ensure_key()?;

        let resp = self
            .client
            .get(format!("{}/voices", ELEVENLABS_API_URL))
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .map_err(map_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(map_status(status.as_u16(), "", body));
        }

        let voices: VoicesResponse = resp
            .json()
            .await
            .map_err(|e| TtsError::Provider(format!("voices parse: {}", e)))?;

        Ok(format!(
            "API access verified. {} voices available.",
            voices.voices.len()
        ))
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, TtsError> {
        self.ensure_key()?;
        self.retry
            .run("ElevenLabs TTS", |_| self.convert(text, voice_id))
            .await
    }

    fn name(&self) -> &str {
        "ElevenLabs"
    }
}
