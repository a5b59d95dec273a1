// render/validate.rs - known renderer incompatibilities, checked before and after a run

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incompatibility {
    DisplayFrame,
    TransformMatchingNonTex,
    ZoomedScene,
    ThreeDScene,
    MissingSceneClass,
    MissingImport,
}

const ALL: [Incompatibility; 6] = [
    Incompatibility::MissingImport,
    Incompatibility::MissingSceneClass,
    Incompatibility::DisplayFrame,
    Incompatibility::ZoomedScene,
    Incompatibility::ThreeDScene,
    Incompatibility::TransformMatchingNonTex,
];

impl Incompatibility {
    pub fn summary(&self) -> &'static str {
        match self {
            Incompatibility::DisplayFrame => "The display_frame keyword is not supported",
            Incompatibility::TransformMatchingNonTex => {
                "TransformMatchingTex is used between objects that are not Tex or MathTex"
            }
            Incompatibility::ZoomedScene => "ZoomedScene is not supported by the renderer",
            Incompatibility::ThreeDScene => "ThreeDScene is not supported by the renderer",
            Incompatibility::MissingSceneClass => "The configured scene class is missing",
            Incompatibility::MissingImport => "The source does not import manim",
        }
    }

    pub fn remediation(&self) -> &'static str {
        match self {
            Incompatibility::DisplayFrame => "Remove display_frame and use a plain Scene.",
            Incompatibility::TransformMatchingNonTex => {
                "Use Transform or ReplacementTransform for Text and shape objects."
            }
            Incompatibility::ZoomedScene => "Use Scene and scale objects instead of zooming.",
            Incompatibility::ThreeDScene => "Use Scene with 2D objects only.",
            Incompatibility::MissingSceneClass => "Name the main scene class as configured.",
            Incompatibility::MissingImport => "Start the file with `from manim import *`.",
        }
    }

    /// Substrings in renderer stderr that point at this incompatibility.
    /// The missing-scene marker depends on the scene name and is checked separately.
    fn stderr_markers(&self) -> &'static [&'static str] {
        match self {
            Incompatibility::DisplayFrame => &["display_frame"],
            Incompatibility::TransformMatchingNonTex => &["tex_string", "TransformMatchingTex"],
            Incompatibility::ZoomedScene => &["ZoomedScene", "zoomed_display"],
            Incompatibility::ThreeDScene => &["ThreeDScene", "set_camera_orientation"],
            Incompatibility::MissingSceneClass => &[],
            Incompatibility::MissingImport => &[
                "No module named 'manim'",
                "name 'Scene' is not defined",
                "name 'Text' is not defined",
            ],
        }
    }

    /// Full user-facing message; `scene` is the class the renderer is asked for.
    pub fn message(&self, scene: &str) -> String {
        match self {
            Incompatibility::MissingSceneClass => format!(
                "The scene class {} is missing. Name the main scene class {}.",
                scene, scene
            ),
            _ => format!("{}. {}", self.summary(), self.remediation()),
        }
    }

    fn found_in(&self, source: &str, scene: &str) -> bool {
        match self {
            Incompatibility::DisplayFrame => {
                static RE: OnceLock<Regex> = OnceLock::new();
                cached(&RE, r"\bdisplay_frame\s*=").is_match(source)
            }
            Incompatibility::TransformMatchingNonTex => transform_matching_non_tex(source),
            Incompatibility::ZoomedScene => {
                static RE: OnceLock<Regex> = OnceLock::new();
                cached(&RE, r"\bZoomedScene\b").is_match(source)
            }
            Incompatibility::ThreeDScene => {
                static RE: OnceLock<Regex> = OnceLock::new();
                cached(&RE, r"\bThreeDScene\b").is_match(source)
            }
            Incompatibility::MissingSceneClass => !defines_class(source, scene),
            Incompatibility::MissingImport => {
                static RE: OnceLock<Regex> = OnceLock::new();
                !cached(&RE, r"(?m)^\s*(from\s+manim\s+import|import\s+manim\b)").is_match(source)
            }
        }
    }
}

/// Every known incompatibility present in `source`, most fundamental first.
pub fn check_source(source: &str, scene: &str) -> Vec<Incompatibility> {
    ALL.iter()
        .copied()
        .filter(|i| i.found_in(source, scene))
        .collect()
}

pub fn describe(issues: &[Incompatibility], scene: &str) -> String {
    issues
        .iter()
        .map(|i| i.message(scene))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map renderer stderr back to a known incompatibility, if any marker matches.
pub fn diagnose_stderr(stderr: &str, scene: &str) -> Option<Incompatibility> {
    let missing_scene = format!("{} is not in the script", scene);
    ALL.iter().copied().find(|i| match i {
        Incompatibility::MissingSceneClass => stderr.contains(&missing_scene),
        _ => i.stderr_markers().iter().any(|m| stderr.contains(m)),
    })
}

/// True when a line declares `class <scene>(` or `class <scene>:`.
fn defines_class(source: &str, scene: &str) -> bool {
    source.lines().any(|line| {
        let Some(rest) = line.trim_start().strip_prefix("class") else {
            return false;
        };
        if !rest.starts_with(char::is_whitespace) {
            return false;
        }
        rest.trim_start()
            .strip_prefix(scene)
            .map(|tail| matches!(tail.trim_start().chars().next(), Some('(') | Some(':')))
            .unwrap_or(false)
    })
}

fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid validation regex"))
}

fn transform_matching_non_tex(source: &str) -> bool {
    static CALL_RE: OnceLock<Regex> = OnceLock::new();
    static ASSIGN_RE: OnceLock<Regex> = OnceLock::new();
    let calls = cached(&CALL_RE, r"TransformMatchingTex\s*\(\s*(\w+)\s*,\s*(\w+)");
    let assign = cached(&ASSIGN_RE, r"(?m)^\s*(\w+)\s*=\s*(\w+)\s*\(");

    let constructors: HashMap<&str, &str> = assign
        .captures_iter(source)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect();

    calls.captures_iter(source).any(|c| {
        [c.get(1), c.get(2)].into_iter().flatten().any(|arg| {
            constructors
                .get(arg.as_str())
                .map(|ctor| !matches!(*ctor, "Tex" | "MathTex"))
                .unwrap_or(false)
        })
    })
}
