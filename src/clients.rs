// clients.rs - provider bundle built once at startup and injected into the pipeline

use crate::codegen::{CodeGenerator, GeminiGenerator};
use crate::config::AppConfig;
use crate::tts::{ElevenLabsSynthesizer, SpeechSynthesizer};
use std::env;
use std::sync::Arc;

pub const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";
pub const ELEVENLABS_KEY_ENV: &str = "ELEVENLABS_API_KEY";

#[derive(Clone)]
pub struct Clients {
    pub generator: Arc<dyn CodeGenerator>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl Clients {
    pub fn new(generator: Arc<dyn CodeGenerator>, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            generator,
            synthesizer,
        }
    }

    /// Secrets come from the environment only. A missing key is not fatal here;
    /// the adapter reports it on first use.
    pub fn from_env(config: &AppConfig) -> Self {
        let gemini_key = read_key(GEMINI_KEY_ENV);
        let elevenlabs_key = read_key(ELEVENLABS_KEY_ENV);

        Self::new(
            Arc::new(GeminiGenerator::new(gemini_key, config.gemini_model.clone())),
            Arc::new(ElevenLabsSynthesizer::new(
                elevenlabs_key,
                config.tts_model_id.clone(),
            )),
        )
    }
}

fn read_key(name: &str) -> String {
    match env::var(name).ok().filter(|k| !k.trim().is_empty()) {
        Some(key) => key,
        None => {
            tracing::warn!("{} is not set", name);
            String::new()
        }
    }
}
