// media/probe.rs - stream durations via ffprobe JSON

use super::MediaError;
use crate::process::{run_with_timeout, Tool};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    fn codec_type(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Duration of the first `kind` stream, falling back to the container duration.
pub fn parse_duration(json: &[u8], kind: StreamKind) -> Result<f64, String> {
    let parsed: ProbeOut =
        serde_json::from_slice(json).map_err(|e| format!("ffprobe json parse failed: {}", e))?;

    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some(kind.codec_type()))
        .ok_or_else(|| format!("no {} stream found", kind.codec_type()))?;

    stream
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            parsed
                .format
                .as_ref()
                .and_then(|f| f.duration.as_deref())
                .and_then(|d| d.parse::<f64>().ok())
        })
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| "missing duration".to_string())
}

pub async fn probe_duration(
    ffprobe: &Tool,
    path: &Path,
    kind: StreamKind,
    timeout: Duration,
) -> Result<f64, MediaError> {
    let mut cmd = ffprobe.command();
    cmd.args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
        .arg(path);

    let out = run_with_timeout(cmd, timeout).await?;
    if !out.success() {
        return Err(MediaError::Probe {
            path: path.display().to_string(),
            reason: out.stderr_tail(5),
        });
    }

    parse_duration(out.stdout.as_bytes(), kind).map_err(|reason| MediaError::Probe {
        path: path.display().to_string(),
        reason,
    })
}
