// render/discovery.rs - locate rendered output after the renderer exits

use crate::store::{collect_videos, is_video, videos_in};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const WORK_SCAN_DEPTH: usize = 8;
const FALLBACK_SCAN_DEPTH: usize = 4;

/// Everything a strategy may look at. Built once per render.
#[derive(Debug)]
pub struct DiscoveryContext<'a> {
    pub job_id: &'a str,
    pub work_dir: &'a Path,
    pub media_dir: &'a Path,
    pub script_stem: &'a str,
    pub quality: &'a str,
    pub stdout: &'a str,
    pub fallback_dirs: &'a [PathBuf],
}

pub trait DiscoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn discover(&self, ctx: &DiscoveryContext<'_>) -> Vec<PathBuf>;
}

/// Strategies in priority order; the first one that finds anything wins.
pub fn default_chain() -> Vec<Box<dyn DiscoveryStrategy>> {
    vec![
        Box::new(ReportedPath),
        Box::new(CanonicalDir),
        Box::new(WorkDirScan),
        Box::new(FallbackScan),
    ]
}

pub fn discover(
    ctx: &DiscoveryContext<'_>,
    chain: &[Box<dyn DiscoveryStrategy>],
) -> Option<(&'static str, Vec<PathBuf>)> {
    for strategy in chain {
        let found = dedupe(strategy.discover(ctx));
        if found.is_empty() {
            tracing::debug!("Discovery '{}' found nothing for {}", strategy.name(), ctx.job_id);
            continue;
        }
        tracing::info!(
            "Discovery '{}' found {} file(s) for {}",
            strategy.name(),
            found.len(),
            ctx.job_id
        );
        return Some((strategy.name(), found));
    }
    None
}

/// Directory name the renderer uses for a quality flag.
pub fn quality_dir(quality: &str) -> &'static str {
    match quality {
        "l" => "480p15",
        "h" => "1080p60",
        "p" => "1440p60",
        "k" => "2160p60",
        _ => "720p30",
    }
}

/// Parse the `File ready at '<path>'` line. The renderer's console may wrap
/// long paths over several lines, so the quoted span is rejoined.
pub fn parse_reported_path(stdout: &str) -> Option<PathBuf> {
    let start = stdout.find("File ready at")?;
    let rest = &stdout[start..];
    let open = rest.find('\'')?;
    let quoted = &rest[open + 1..];
    let close = quoted.find('\'')?;

    let joined: String = quoted[..close]
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("");

    if joined.is_empty() {
        None
    } else {
        Some(PathBuf::from(joined))
    }
}

struct ReportedPath;

impl DiscoveryStrategy for ReportedPath {
    fn name(&self) -> &'static str {
        "reported-path"
    }

    fn discover(&self, ctx: &DiscoveryContext<'_>) -> Vec<PathBuf> {
        match parse_reported_path(ctx.stdout) {
            Some(path) if path.is_file() && is_video(&path) => vec![path],
            _ => Vec::new(),
        }
    }
}

struct CanonicalDir;

impl DiscoveryStrategy for CanonicalDir {
    fn name(&self) -> &'static str {
        "canonical-dir"
    }

    fn discover(&self, ctx: &DiscoveryContext<'_>) -> Vec<PathBuf> {
        let dir = ctx
            .media_dir
            .join("videos")
            .join(ctx.script_stem)
            .join(quality_dir(ctx.quality));
        videos_in(&dir)
    }
}

struct WorkDirScan;

impl DiscoveryStrategy for WorkDirScan {
    fn name(&self) -> &'static str {
        "work-dir-scan"
    }

    fn discover(&self, ctx: &DiscoveryContext<'_>) -> Vec<PathBuf> {
        collect_videos(ctx.work_dir, WORK_SCAN_DEPTH)
    }
}

/// Last resort: well-known directories outside the work dir. Only files named
/// after this job are accepted.
struct FallbackScan;

impl DiscoveryStrategy for FallbackScan {
    fn name(&self) -> &'static str {
        "fallback-scan"
    }

    fn discover(&self, ctx: &DiscoveryContext<'_>) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for dir in ctx.fallback_dirs {
            found.extend(
                collect_videos(dir, FALLBACK_SCAN_DEPTH)
                    .into_iter()
                    .filter(|p| names_job(p, ctx.job_id)),
            );
        }
        found
    }
}

fn names_job(path: &Path, job_id: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.contains(job_id))
        .unwrap_or(false)
}

fn dedupe(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|p| seen.insert(p.canonicalize().unwrap_or_else(|_| p.clone())))
        .collect()
}
