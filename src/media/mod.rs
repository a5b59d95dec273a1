// media/mod.rs - AV synchronizer: merge narration segments into the rendered video

pub mod probe;
pub mod tempo;

use crate::config::AppConfig;
use crate::process::{run_with_timeout, ProcessError, Tool};
use crate::store::NARRATED_SUFFIX;
use crate::tts::AudioManifest;
use probe::{probe_duration, StreamKind};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

const CONCAT_LIST: &str = "segments.txt";
const CONCAT_AUDIO: &str = "narration.mp3";
const RETIMED_AUDIO: &str = "narration_retimed.mp3";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("{step} failed: {detail}")]
    Failed { step: &'static str, detail: String },

    #[error("Could not probe {path}: {reason}")]
    Probe { path: String, reason: String },

    #[error("No narration audio to merge")]
    NoAudio,

    #[error("Media I/O error: {0}")]
    Io(String),
}

#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub ffmpeg: Tool,
    pub ffprobe: Tool,
    pub timeout: Duration,
    pub tolerance_secs: f64,
    /// Retime the concatenated narration to the video length before muxing.
    pub retime: bool,
}

impl MediaSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ffmpeg: Tool::parse(&config.ffmpeg_bin),
            ffprobe: Tool::parse(&config.ffprobe_bin),
            timeout: Duration::from_secs(config.muxer_timeout_secs),
            tolerance_secs: config.sync_tolerance_secs,
            retime: config.retime_narration,
        }
    }
}

/// `<dir>/<stem>_with_audio.mp4` next to the video.
pub fn narrated_output_path(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    video.with_file_name(format!("{}{}.mp4", stem, NARRATED_SUFFIX))
}

/// Single-quoted entry for the concat demuxer list.
fn concat_entry(path: &Path) -> String {
    let escaped = path.display().to_string().replace('\'', "'\\''");
    format!("file '{}'", escaped)
}

/// `[1:a][2:a]...concat=n=N:v=0:a=1[narration]`, inputs starting after the video.
fn concat_filter(count: usize) -> String {
    let inputs: String = (1..=count).map(|i| format!("[{}:a]", i)).collect();
    format!("{}concat=n={}:v=0:a=1[narration]", inputs, count)
}

fn mux_args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-i".into(),
        video.into(),
        "-i".into(),
        audio.into(),
        "-map".into(),
        "0:v".into(),
        "-map".into(),
        "1:a".into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-shortest".into(),
        output.into(),
    ]
}

pub struct AvSynchronizer {
    settings: MediaSettings,
}

impl AvSynchronizer {
    pub fn new(settings: MediaSettings) -> Self {
        Self { settings }
    }

    /// Merge every manifest segment that still exists on disk into `video`.
    ///
    /// Tries the concat-demuxer pipeline first and a single filter-graph
    /// invocation second. `None` means the caller keeps serving the silent video.
    pub async fn merge(&self, video: &Path, manifest: &AudioManifest) -> Option<PathBuf> {
        let audio = manifest.existing_audio();
        if audio.is_empty() {
            tracing::warn!(
                "No narration audio for {}, keeping silent video",
                manifest.video_id
            );
            return None;
        }

        let output = narrated_output_path(video);
        tracing::info!(
            "Merging {} narration segment(s) into {}",
            audio.len(),
            video.display()
        );

        match self.merge_concat(video, &audio, &output).await {
            Ok(path) => return Some(path),
            Err(e) => {
                tracing::warn!("Concat merge failed for {}: {}", video.display(), e);
                remove_partial(&output);
            }
        }

        match self.merge_filter_graph(video, &audio, &output).await {
            Ok(path) => {
                tracing::info!("Filter-graph merge succeeded for {}", video.display());
                Some(path)
            }
            Err(e) => {
                tracing::error!("All merge strategies failed for {}: {}", video.display(), e);
                remove_partial(&output);
                None
            }
        }
    }

    /// Mux one audio track into `video`, retiming it with `atempo` when the
    /// durations differ by more than the tolerance. Intermediates live in a
    /// temp dir that is removed on every exit path.
    pub async fn merge_single_track(
        &self,
        video: &Path,
        audio: &Path,
    ) -> Result<PathBuf, MediaError> {
        if !audio.is_file() {
            return Err(MediaError::NoAudio);
        }
        let output = narrated_output_path(video);
        self.mux_retimed(video, audio, &output).await?;
        Ok(output)
    }

    async fn merge_concat(
        &self,
        video: &Path,
        audio: &[PathBuf],
        output: &Path,
    ) -> Result<PathBuf, MediaError> {
        let work = scratch_dir()?;
        let list = work.path().join(CONCAT_LIST);
        let entries: Vec<String> = audio.iter().map(|p| concat_entry(&absolute(p))).collect();
        fs::write(&list, entries.join("\n") + "\n")
            .map_err(|e| MediaError::Io(format!("{}: {}", list.display(), e)))?;

        let joined = work.path().join(CONCAT_AUDIO);
        let concat: Vec<OsString> = vec![
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            list.into(),
            "-c".into(),
            "copy".into(),
            joined.clone().into(),
        ];
        self.ffmpeg("concat narration", concat).await?;

        if self.settings.retime {
            self.mux_retimed(video, &joined, output).await?;
        } else {
            self.ffmpeg("mux narration", mux_args(video, &joined, output))
                .await?;
        }

        ensure_output(output)?;
        Ok(output.to_path_buf())
    }

    async fn mux_retimed(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<(), MediaError> {
        let limit = self.settings.timeout;
        let video_secs = probe_duration(&self.settings.ffprobe, video, StreamKind::Video, limit).await?;
        let audio_secs = probe_duration(&self.settings.ffprobe, audio, StreamKind::Audio, limit).await?;

        if !tempo::needs_retime(video_secs, audio_secs, self.settings.tolerance_secs) {
            tracing::debug!(
                "Narration {:.2}s within tolerance of video {:.2}s",
                audio_secs,
                video_secs
            );
            self.ffmpeg("mux narration", mux_args(video, audio, output))
                .await?;
            return ensure_output(output);
        }

        let factor = tempo::speed_factor(video_secs, audio_secs);
        tracing::info!(
            "Retiming narration {:.2}s -> {:.2}s (factor {:.3})",
            audio_secs,
            tempo::adjusted_duration(audio_secs, factor),
            factor
        );

        let work = scratch_dir()?;
        let retimed = work.path().join(RETIMED_AUDIO);
        let stretch: Vec<OsString> = vec![
            "-i".into(),
            audio.into(),
            "-filter:a".into(),
            tempo::atempo_chain(factor).into(),
            "-vn".into(),
            retimed.clone().into(),
        ];
        self.ffmpeg("retime narration", stretch).await?;
        self.ffmpeg("mux narration", mux_args(video, &retimed, output))
            .await?;
        ensure_output(output)
    }

    /// Single ffmpeg call that concatenates and muxes in one filter graph.
    /// Runs on the blocking pool through `std::process`.
    async fn merge_filter_graph(
        &self,
        video: &Path,
        audio: &[PathBuf],
        output: &Path,
    ) -> Result<PathBuf, MediaError> {
        let mut args: Vec<OsString> = vec!["-i".into(), video.into()];
        for path in audio {
            args.push("-i".into());
            args.push(path.into());
        }
        let graph: Vec<OsString> = vec![
            "-filter_complex".into(),
            concat_filter(audio.len()).into(),
            "-map".into(),
            "0:v".into(),
            "-map".into(),
            "[narration]".into(),
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            "aac".into(),
            "-shortest".into(),
            output.into(),
        ];
        args.extend(graph);

        let tool = self.settings.ffmpeg.clone();
        let limit = self.settings.timeout;
        tokio::task::spawn_blocking(move || run_blocking(&tool, args, limit))
            .await
            .map_err(|e| MediaError::Io(format!("filter-graph task failed: {}", e)))??;

        ensure_output(output)?;
        Ok(output.to_path_buf())
    }

    async fn ffmpeg(&self, step: &'static str, args: Vec<OsString>) -> Result<(), MediaError> {
        let mut cmd = self.settings.ffmpeg.command();
        cmd.args(["-hide_banner", "-loglevel", "error", "-y"]).args(args);

        let out = run_with_timeout(cmd, self.settings.timeout).await?;
        if out.success() {
            return Ok(());
        }
        Err(MediaError::Failed {
            step,
            detail: failure_detail(out.code, &out.stderr_tail(10)),
        })
    }
}

/// Blocking counterpart of `process::run_with_timeout`. Stderr goes to a
/// scratch file so a chatty child never blocks on a full pipe.
fn run_blocking(tool: &Tool, args: Vec<OsString>, limit: Duration) -> Result<(), MediaError> {
    let program = tool.program().to_string();
    let work = scratch_dir()?;
    let log_path = work.path().join("stderr.log");
    let log = fs::File::create(&log_path)
        .map_err(|e| MediaError::Io(format!("{}: {}", log_path.display(), e)))?;

    let mut child = tool
        .std_command()
        .args(["-hide_banner", "-loglevel", "error", "-y"])
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(log))
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    let deadline = Instant::now() + limit;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProcessError::Timeout {
                    program,
                    secs: limit.as_secs(),
                }
                .into());
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(source) => return Err(ProcessError::Io { program, source }.into()),
        }
    };

    if status.success() {
        return Ok(());
    }

    let stderr = fs::read_to_string(&log_path).unwrap_or_default();
    let tail: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail = tail[tail.len().saturating_sub(10)..].join("\n");
    Err(MediaError::Failed {
        step: "filter-graph merge",
        detail: failure_detail(status.code(), &tail),
    })
}

fn failure_detail(code: Option<i32>, tail: &str) -> String {
    if tail.is_empty() {
        format!("exit code {:?}", code)
    } else {
        tail.to_string()
    }
}

fn scratch_dir() -> Result<tempfile::TempDir, MediaError> {
    tempfile::Builder::new()
        .prefix("edututor-media-")
        .tempdir()
        .map_err(|e| MediaError::Io(e.to_string()))
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn ensure_output(output: &Path) -> Result<(), MediaError> {
    match fs::metadata(output) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(MediaError::Failed {
            step: "merge",
            detail: format!("{} missing or empty", output.display()),
        }),
    }
}

fn remove_partial(output: &Path) {
    if output.exists() {
        if let Err(e) = fs::remove_file(output) {
            tracing::warn!("Could not remove partial {}: {}", output.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_sits_next_to_video() {
        assert_eq!(
            narrated_output_path(Path::new("/v/job-1/job-1.mp4")),
            PathBuf::from("/v/job-1/job-1_with_audio.mp4")
        );
    }

    #[test]
    fn test_concat_helpers() {
        assert_eq!(
            concat_filter(3),
            "[1:a][2:a][3:a]concat=n=3:v=0:a=1[narration]"
        );
        assert_eq!(
            concat_entry(Path::new("/a/it's.mp3")),
            "file '/a/it'\\''s.mp3'"
        );
    }
}

#[cfg(all(test, unix))]
mod process_tests {
    use super::*;
    use crate::narration::Timing;
    use crate::tts::ManifestSegment;
    use tempfile::TempDir;

    // Every call is appended to $1; the last argument is the output file.
    const FFMPEG_NO_DEMUXER: &str = r#"
log="$1"; shift
echo "$*" >> "$log"
for a in "$@"; do last="$a"; done
case "$*" in
  *"-f concat"*) echo "concat demuxer unavailable" >&2; exit 1 ;;
esac
printf 'merged' > "$last"
"#;

    const FFMPEG_OK: &str = r#"
log="$1"; shift
echo "$*" >> "$log"
for a in "$@"; do last="$a"; done
printf 'merged' > "$last"
"#;

    const FFMPEG_BROKEN: &str = r#"
log="$1"; shift
echo "$*" >> "$log"
echo "boom" >&2
exit 1
"#;

    // Video streams report 10s; anything else is 15s of audio.
    const FFPROBE: &str = r#"
for a in "$@"; do last="$a"; done
case "$last" in
  *.mp4) printf '{"streams":[{"codec_type":"video","duration":"10.0"}],"format":{"duration":"10.0"}}' ;;
  *) printf '{"streams":[{"codec_type":"audio","duration":"15.0"}],"format":{"duration":"15.0"}}' ;;
esac
"#;

    struct Fixture {
        tmp: TempDir,
        video: PathBuf,
        log: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let video = tmp.path().join("job-1.mp4");
            fs::write(&video, b"video").unwrap();
            let log = tmp.path().join("calls.log");
            Self { tmp, video, log }
        }

        fn synchronizer(&self, ffmpeg_body: &str, retime: bool) -> AvSynchronizer {
            let ffmpeg = self.tmp.path().join("ffmpeg.sh");
            let ffprobe = self.tmp.path().join("ffprobe.sh");
            fs::write(&ffmpeg, ffmpeg_body).unwrap();
            fs::write(&ffprobe, FFPROBE).unwrap();
            AvSynchronizer::new(MediaSettings {
                ffmpeg: Tool::parse(&format!("sh {} {}", ffmpeg.display(), self.log.display())),
                ffprobe: Tool::parse(&format!("sh {}", ffprobe.display())),
                timeout: Duration::from_secs(10),
                tolerance_secs: 2.0,
                retime,
            })
        }

        fn manifest(&self, count: usize) -> AudioManifest {
            let mut manifest = AudioManifest::empty("job-1", "voice");
            for index in 0..count {
                let path = self.tmp.path().join(format!("segment_{:03}.mp3", index));
                fs::write(&path, b"id3").unwrap();
                manifest.segments.push(ManifestSegment {
                    index,
                    text: format!("line {}", index),
                    timing: Timing {
                        start: index as f64 * 2.0,
                        duration: 2.0,
                    },
                    audio_path: path.display().to_string(),
                });
            }
            manifest
        }

        fn calls(&self) -> Vec<String> {
            fs::read_to_string(&self.log)
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[tokio::test]
    async fn test_concat_pipeline() {
        let fx = Fixture::new();
        let sync = fx.synchronizer(FFMPEG_OK, false);

        let out = sync.merge(&fx.video, &fx.manifest(2)).await.unwrap();

        assert_eq!(out, fx.tmp.path().join("job-1_with_audio.mp4"));
        assert_eq!(fs::read(&out).unwrap(), b"merged");
        let calls = fx.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].contains("-f concat -safe 0"));
        assert!(calls[1].contains("-map 0:v -map 1:a -c:v copy"));
    }

    #[tokio::test]
    async fn test_filter_graph_fallback_when_concat_fails() {
        let fx = Fixture::new();
        let sync = fx.synchronizer(FFMPEG_NO_DEMUXER, false);

        let out = sync.merge(&fx.video, &fx.manifest(3)).await.unwrap();

        assert_eq!(fs::read(&out).unwrap(), b"merged");
        let calls = fx.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].contains("concat=n=3:v=0:a=1"));
    }

    #[tokio::test]
    async fn test_total_failure_keeps_silent_video() {
        let fx = Fixture::new();
        let sync = fx.synchronizer(FFMPEG_BROKEN, false);

        assert!(sync.merge(&fx.video, &fx.manifest(1)).await.is_none());
        assert!(!narrated_output_path(&fx.video).exists());
        assert_eq!(fs::read(&fx.video).unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_empty_manifest_skips_ffmpeg() {
        let fx = Fixture::new();
        let sync = fx.synchronizer(FFMPEG_OK, false);

        let manifest = AudioManifest::unreachable("job-1", "voice", "HTTP 401");
        assert!(sync.merge(&fx.video, &manifest).await.is_none());
        assert!(fx.calls().is_empty());
    }

    #[tokio::test]
    async fn test_long_narration_is_retimed() {
        let fx = Fixture::new();
        let sync = fx.synchronizer(FFMPEG_OK, false);
        let audio = fx.tmp.path().join("narration.mp3");
        fs::write(&audio, b"id3").unwrap();

        let out = sync.merge_single_track(&fx.video, &audio).await.unwrap();

        assert_eq!(fs::read(&out).unwrap(), b"merged");
        let calls = fx.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].contains("atempo=1.5"));
        assert!(calls[1].contains("-map 1:a"));
    }

    #[tokio::test]
    async fn test_retime_flag_routes_concat_through_single_track() {
        let fx = Fixture::new();
        let sync = fx.synchronizer(FFMPEG_OK, true);

        sync.merge(&fx.video, &fx.manifest(2)).await.unwrap();

        let calls = fx.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1].contains("atempo=1.5"));
    }
}
