// process.rs - external tool invocation with a hard deadline

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// A configured external program. The configured string may carry leading
/// arguments (`"python -m manim"`), split on whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    program: String,
    args: Vec<String>,
}

impl Tool {
    pub fn parse(command: &str) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            args: parts.collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    pub fn std_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s and was killed")]
    Timeout { program: String, secs: u64 },

    #[error("I/O error while waiting for {program}: {source}")]
    Io {
        program: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Last few non-empty stderr lines, for log lines and summaries.
    pub fn stderr_tail(&self, lines: usize) -> String {
        let tail: Vec<&str> = self
            .stderr
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty())
            .collect();
        let start = tail.len().saturating_sub(lines);
        tail[start..].join("\n")
    }
}

/// Run `cmd` to completion, capturing both streams with lossy UTF-8 decoding.
/// When `limit` elapses the child is killed.
pub async fn run_with_timeout(
    mut cmd: Command,
    limit: Duration,
) -> Result<ProcessOutput, ProcessError> {
    let program = program_name(cmd.as_std().get_program());

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;

    tracing::debug!("Spawned {} (pid {:?})", program, child.id());

    // Dropping the wait future on timeout drops the child, and kill_on_drop reaps it.
    let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| ProcessError::Io {
            program: program.clone(),
            source,
        })?,
        Err(_) => {
            tracing::warn!("{} exceeded {:?}, killing", program, limit);
            return Err(ProcessError::Timeout {
                program,
                secs: limit.as_secs(),
            });
        }
    };

    Ok(ProcessOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

fn program_name(program: &OsStr) -> String {
    std::path::Path::new(program)
        .file_name()
        .unwrap_or(program)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_splits_leading_args() {
        let tool = Tool::parse("python -m manim");
        assert_eq!(tool.program(), "python");
        assert_eq!(tool.args, vec!["-m", "manim"]);
    }

    #[test]
    fn test_stderr_tail_skips_blank_lines() {
        let out = ProcessOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: "a\n\nb\nc\n\n".to_string(),
        };
        assert_eq!(out.stderr_tail(2), "b\nc");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_is_captured() {
        let mut cmd = Tool::parse("sh").command();
        cmd.arg("-c").arg("echo out; echo err >&2; exit 3");

        let out = run_with_timeout(cmd, Duration::from_secs(10)).await.unwrap();

        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_process_times_out() {
        let mut cmd = Tool::parse("sh").command();
        cmd.arg("-c").arg("sleep 5");

        let err = run_with_timeout(cmd, Duration::from_millis(100))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let cmd = Tool::parse("/definitely/not/a/real/binary").command();
        let err = run_with_timeout(cmd, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}
