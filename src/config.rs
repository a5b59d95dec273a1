use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "EDUTUTOR_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/edututor.json";

pub const DEFAULT_VIDEOS_DIR: &str = "./videos";
pub const DEFAULT_AUDIO_DIR: &str = "./audio";
pub const DEFAULT_RENDERER_BIN: &str = "manim";
pub const DEFAULT_QUALITY: &str = "m";
pub const DEFAULT_SCENE_NAME: &str = "CreateScene";
pub const DEFAULT_VOICE_ID: &str = "EXAVITQu4vr4xnSDxMaL";
pub const DEFAULT_TTS_MODEL: &str = "eleven_multilingual_v2";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {0}: {1}")]
    Read(String, String),

    #[error("Failed to save config {0}: {1}")]
    Write(String, String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub videos_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub renderer_bin: String,
    pub render_quality: String,
    pub scene_name: String,
    pub render_timeout_secs: u64,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub muxer_timeout_secs: u64,
    pub sync_tolerance_secs: f64,
    pub retime_narration: bool,
    pub voice_id: String,
    pub tts_model_id: String,
    pub gemini_model: String,
    pub generation_timeout_secs: u64,
    pub generation_max_retries: u32,
    pub generation_retry_delay_secs: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            videos_dir: PathBuf::from(DEFAULT_VIDEOS_DIR),
            audio_dir: PathBuf::from(DEFAULT_AUDIO_DIR),
            renderer_bin: DEFAULT_RENDERER_BIN.to_string(),
            render_quality: DEFAULT_QUALITY.to_string(),
            scene_name: DEFAULT_SCENE_NAME.to_string(),
            render_timeout_secs: 600,
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            muxer_timeout_secs: 300,
            sync_tolerance_secs: 2.0,
            retime_narration: false,
            voice_id: DEFAULT_VOICE_ID.to_string(),
            tts_model_id: DEFAULT_TTS_MODEL.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            generation_timeout_secs: 300,
            generation_max_retries: 3,
            generation_retry_delay_secs: 5.0,
        }
    }
}

/// Load the config file (if any), then apply environment overrides.
///
/// The path comes from `EDUTUTOR_CONFIG` when set. A missing file means
/// defaults; a corrupt file is backed up next to itself and replaced by defaults.
pub fn load() -> Result<AppConfig, ConfigError> {
    let path = env::var(CONFIG_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let mut config = load_from_path(Path::new(&path))?;
    apply_overrides(&mut config, |key| env::var(key).ok());
    normalize_config(&mut config);
    Ok(config)
}

pub fn load_from_path(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| ConfigError::Read(path.display().to_string(), e.to_string()))?;

    match serde_json::from_str::<AppConfig>(&raw) {
        Ok(mut config) => {
            normalize_config(&mut config);
            Ok(config)
        }
        Err(e) => {
            tracing::warn!(
                "Config {} is invalid ({}), falling back to defaults",
                path.display(),
                e
            );
            let backup = path.with_extension("json.bak");
            let _ = fs::copy(path, backup);
            let config = AppConfig::default();
            save(path, &config)?;
            Ok(config)
        }
    }
}

pub fn save(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Write(path.display().to_string(), e.to_string()))?;
    }
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| ConfigError::Write(path.display().to_string(), e.to_string()))?;
    fs::write(path, json).map_err(|e| ConfigError::Write(path.display().to_string(), e.to_string()))
}

/// Apply `KEY=value` overrides from a lookup (the process environment in production).
pub fn apply_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(dir) = get("EDUTUTOR_VIDEOS_DIR") {
        config.videos_dir = PathBuf::from(dir);
    }
    if let Some(dir) = get("EDUTUTOR_AUDIO_DIR") {
        config.audio_dir = PathBuf::from(dir);
    }
    if let Some(bin) = get("MANIM_BIN") {
        config.renderer_bin = bin;
    }
    if let Some(quality) = get("MANIM_QUALITY") {
        config.render_quality = quality;
    }
    if let Some(bin) = get("FFMPEG_BIN") {
        config.ffmpeg_bin = bin;
    }
    if let Some(bin) = get("FFPROBE_BIN") {
        config.ffprobe_bin = bin;
    }
    if let Some(secs) = get("RENDER_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
        config.render_timeout_secs = secs;
    }
    if let Some(voice) = get("ELEVENLABS_VOICE_ID") {
        config.voice_id = voice;
    }
    if let Some(model) = get("GEMINI_MODEL") {
        config.gemini_model = model;
    }
}

pub fn normalize_quality(input: &str) -> String {
    match input.trim().to_ascii_lowercase().as_str() {
        "l" => "l".to_string(),
        "m" => "m".to_string(),
        "h" => "h".to_string(),
        "p" => "p".to_string(),
        "k" => "k".to_string(),
        _ => DEFAULT_QUALITY.to_string(),
    }
}

fn normalize_config(config: &mut AppConfig) {
    config.render_quality = normalize_quality(&config.render_quality);
    if config.scene_name.trim().is_empty() {
        config.scene_name = DEFAULT_SCENE_NAME.to_string();
    }
    if config.voice_id.trim().is_empty() {
        config.voice_id = DEFAULT_VOICE_ID.to_string();
    }
    if config.render_timeout_secs == 0 {
        config.render_timeout_secs = 600;
    }
    if config.muxer_timeout_secs == 0 {
        config.muxer_timeout_secs = 300;
    }
    if config.sync_tolerance_secs.is_nan() || config.sync_tolerance_secs <= 0.0 {
        config.sync_tolerance_secs = 2.0;
    }
    if config.generation_retry_delay_secs < 0.0 {
        config.generation_retry_delay_secs = 0.0;
    }
}
