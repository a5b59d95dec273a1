use serde::{Deserialize, Serialize};

pub const PAUSE_MARKER: &str = "[PAUSE]";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub start: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Narration,
    SectionTitle,
    TextObject,
    Comment,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSegment {
    pub text: String,
    pub timing: Timing,
    #[serde(rename = "type")]
    pub kind: SegmentKind,
}

impl ScriptSegment {
    pub fn new(text: impl Into<String>, start: f64, duration: f64, kind: SegmentKind) -> Self {
        Self {
            text: text.into(),
            timing: Timing { start, duration },
            kind,
        }
    }

    /// Nothing to speak: empty text or a pause marker.
    pub fn is_silent(&self) -> bool {
        let text = self.text.trim();
        text.is_empty() || text.eq_ignore_ascii_case(PAUSE_MARKER)
    }

    pub fn end(&self) -> f64 {
        self.timing.start + self.timing.duration
    }
}

/// A narration script with at least one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrationScript(Vec<ScriptSegment>);

impl NarrationScript {
    /// `None` when `segments` is empty.
    pub fn new(segments: Vec<ScriptSegment>) -> Option<Self> {
        if segments.is_empty() {
            None
        } else {
            Some(Self(segments))
        }
    }

    pub(crate) fn single(segment: ScriptSegment) -> Self {
        Self(vec![segment])
    }

    pub fn segments(&self) -> &[ScriptSegment] {
        &self.0
    }

    pub fn total_duration(&self) -> f64 {
        self.0.iter().map(ScriptSegment::end).fold(0.0, f64::max)
    }

    pub fn into_segments(self) -> Vec<ScriptSegment> {
        self.0
    }
}
