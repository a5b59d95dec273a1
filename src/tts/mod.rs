// tts/mod.rs - speech synthesis capability and per-job narration synthesis

mod elevenlabs;
mod manifest;
mod synthesizer;
mod types;

pub use elevenlabs::ElevenLabsSynthesizer;
pub use manifest::{AudioManifest, ManifestSegment};
pub use synthesizer::{segment_file_name, NarrationSynthesizer, MANIFEST_FILE};
pub use types::TtsError;

use async_trait::async_trait;

/// A text-to-speech provider.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Check reachability and credentials once before a batch of calls.
    async fn verify(&self) -> Result<String, TtsError>;

    /// Synthesize `text` with `voice_id`, returning encoded MP3 bytes.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, TtsError>;

    fn name(&self) -> &str;
}
