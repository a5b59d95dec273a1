// store/scan.rs - bounded recursive search for rendered video files

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

pub const VIDEO_EXTENSION: &str = "mp4";

const PARTIAL_DIR: &str = "partial_movie_files";

/// Collect every video file under `dir`, descending at most `max_depth` levels.
///
/// Complete renders sort ahead of partial-movie chunks; ties sort by path so the
/// result is stable between calls. Symlinked directories are not followed.
pub fn collect_videos(dir: &Path, max_depth: usize) -> Vec<PathBuf> {
    let mut found = Vec::new();
    walk(dir, max_depth, &mut found);
    found.sort_by(|a, b| {
        is_partial(a)
            .cmp(&is_partial(b))
            .then_with(|| a.cmp(b))
    });
    found
}

/// Video files directly inside `dir` (no recursion), sorted by path.
pub fn videos_in(dir: &Path) -> Vec<PathBuf> {
    collect_videos(dir, 0)
}

pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| ext.eq_ignore_ascii_case(VIDEO_EXTENSION))
        .unwrap_or(false)
}

pub fn is_partial(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str() == OsStr::new(PARTIAL_DIR))
}

fn walk(dir: &Path, depth: usize, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();

        if file_type.is_dir() {
            if depth > 0 {
                walk(&path, depth - 1, out);
            }
        } else if file_type.is_file() && is_video(&path) {
            out.push(path);
        }
    }
}
