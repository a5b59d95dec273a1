// narration/extract.rs - prioritized narration extraction strategies

use super::segment::{NarrationScript, ScriptSegment, SegmentKind};
use super::source::{Comment, SourceView};
use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_SEGMENT_SECS: f64 = 2.0;
pub const DEFAULT_SECTION_SECS: f64 = 4.0;
pub const SECTION_TITLE_SECS: f64 = 3.0;
pub const FALLBACK_TEXT: &str = "Welcome to this educational video created with Manim.";
pub const FALLBACK_SECS: f64 = 3.0;

const NARRATION_PREFIX: &str = "NARRATION:";
const MIN_COMMENT_LEN: usize = 5;

/// One way of reading narration out of scene source. Strategies are pure and
/// independent; an empty result means "not applicable".
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, view: &SourceView<'_>) -> Vec<ScriptSegment>;
}

pub struct NarrationExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Default for NarrationExtractor {
    fn default() -> Self {
        Self {
            strategies: vec![
                Box::new(NarrationComments),
                Box::new(NumberedSections),
                Box::new(DisplayText),
                Box::new(PlainComments),
            ],
        }
    }
}

impl NarrationExtractor {
    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Never fails and never returns an empty script.
    pub fn extract(&self, source: &str) -> NarrationScript {
        let view = SourceView::new(source);

        for strategy in &self.strategies {
            let segments: Vec<ScriptSegment> = strategy
                .extract(&view)
                .into_iter()
                .filter(|s| !s.text.trim().is_empty())
                .collect();

            if let Some(script) = NarrationScript::new(segments) {
                tracing::info!(
                    "Narration: '{}' produced {} segment(s), {:.1}s",
                    strategy.name(),
                    script.segments().len(),
                    script.total_duration()
                );
                return script;
            }
        }

        tracing::warn!("Narration: nothing recognizable in source, using generic segment");
        NarrationScript::single(ScriptSegment::new(
            FALLBACK_TEXT,
            0.0,
            FALLBACK_SECS,
            SegmentKind::Generic,
        ))
    }
}

/// Extract with the default strategy chain.
pub fn extract(source: &str) -> NarrationScript {
    NarrationExtractor::default().extract(source)
}

/// Appends segments back to back.
struct Timeline {
    cursor: f64,
    segments: Vec<ScriptSegment>,
}

impl Timeline {
    fn new() -> Self {
        Self {
            cursor: 0.0,
            segments: Vec::new(),
        }
    }

    fn push(&mut self, text: impl Into<String>, duration: f64, kind: SegmentKind) {
        self.segments
            .push(ScriptSegment::new(text, self.cursor, duration, kind));
        self.cursor += duration;
    }

    fn advance(&mut self, seconds: f64) {
        self.cursor += seconds;
    }

    fn finish(self) -> Vec<ScriptSegment> {
        self.segments
    }
}

/// Spread `budget` evenly over `count` items; `per_item` applies when there is no budget.
fn share(budget: f64, count: usize, per_item: f64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    if budget > 0.0 {
        budget / count as f64
    } else {
        per_item
    }
}

fn is_section_heading(text: &str) -> bool {
    static SECTION_RE: OnceLock<Regex> = OnceLock::new();
    SECTION_RE
        .get_or_init(|| Regex::new(r"^\d+\.\s*\S").expect("valid section regex"))
        .is_match(text)
}

fn narration_body(comment: &Comment) -> Option<&str> {
    let text = comment.text.as_str();
    let head = text.get(..NARRATION_PREFIX.len())?;
    if head.eq_ignore_ascii_case(NARRATION_PREFIX) {
        Some(text[NARRATION_PREFIX.len()..].trim())
    } else {
        None
    }
}

/// `# NARRATION:` blocks, with directly following comment lines as continuation.
struct NarrationComments;

impl ExtractionStrategy for NarrationComments {
    fn name(&self) -> &'static str {
        "narration-comments"
    }

    fn extract(&self, view: &SourceView<'_>) -> Vec<ScriptSegment> {
        let mut blocks: Vec<String> = Vec::new();
        let mut last_line: Option<usize> = None;

        for comment in &view.comments {
            if let Some(body) = narration_body(comment) {
                blocks.push(body.to_string());
                last_line = Some(comment.line);
                continue;
            }

            let continues = comment.standalone
                && last_line.map(|l| l + 1 == comment.line).unwrap_or(false)
                && !comment.text.is_empty()
                && !is_section_heading(&comment.text);

            match blocks.last_mut() {
                Some(block) if continues => {
                    if !block.is_empty() {
                        block.push(' ');
                    }
                    block.push_str(&comment.text);
                    last_line = Some(comment.line);
                }
                _ => last_line = None,
            }
        }

        blocks.retain(|b| !b.trim().is_empty());
        let duration = share(view.total_wait_seconds(), blocks.len(), DEFAULT_SEGMENT_SECS);

        let mut timeline = Timeline::new();
        for block in blocks {
            timeline.push(block, duration, SegmentKind::Narration);
        }
        timeline.finish()
    }
}

/// `# 1. Title` comments split the source into sections.
struct NumberedSections;

impl ExtractionStrategy for NumberedSections {
    fn name(&self) -> &'static str {
        "numbered-sections"
    }

    fn extract(&self, view: &SourceView<'_>) -> Vec<ScriptSegment> {
        let headings: Vec<&Comment> = view
            .comments
            .iter()
            .filter(|c| is_section_heading(&c.text))
            .collect();

        let mut timeline = Timeline::new();
        for (i, heading) in headings.iter().enumerate() {
            let start = heading.offset;
            let end = headings
                .get(i + 1)
                .map(|next| next.offset)
                .unwrap_or(view.source.len());

            timeline.push(heading.text.clone(), SECTION_TITLE_SECS, SegmentKind::SectionTitle);

            let texts: Vec<&str> = view
                .text_calls
                .iter()
                .filter(|t| t.offset >= start && t.offset < end)
                .map(|t| t.text.as_str())
                .collect();

            let waits = view.wait_seconds(start, end);
            let budget = if waits > 0.0 { waits } else { DEFAULT_SECTION_SECS };

            if texts.is_empty() {
                timeline.advance(budget);
                continue;
            }
            let each = budget / texts.len() as f64;
            for text in texts {
                timeline.push(text, each, SegmentKind::TextObject);
            }
        }
        timeline.finish()
    }
}

/// Every literal `Text`/`Tex`/`Title`/`MarkupText` argument.
struct DisplayText;

impl ExtractionStrategy for DisplayText {
    fn name(&self) -> &'static str {
        "display-text"
    }

    fn extract(&self, view: &SourceView<'_>) -> Vec<ScriptSegment> {
        let duration = share(
            view.total_wait_seconds(),
            view.text_calls.len(),
            DEFAULT_SEGMENT_SECS,
        );
        let mut timeline = Timeline::new();
        for call in &view.text_calls {
            timeline.push(call.text.clone(), duration, SegmentKind::TextObject);
        }
        timeline.finish()
    }
}

/// Any other comment long enough to be worth saying.
struct PlainComments;

impl ExtractionStrategy for PlainComments {
    fn name(&self) -> &'static str {
        "plain-comments"
    }

    fn extract(&self, view: &SourceView<'_>) -> Vec<ScriptSegment> {
        let comments: Vec<&str> = view
            .comments
            .iter()
            .map(|c| c.text.as_str())
            .filter(|t| t.chars().count() > MIN_COMMENT_LEN && !is_section_heading(t))
            .filter(|t| !t.starts_with('!') && !t.starts_with("-*-"))
            .collect();

        let duration = share(view.total_wait_seconds(), comments.len(), DEFAULT_SEGMENT_SECS);
        let mut timeline = Timeline::new();
        for text in comments {
            timeline.push(text, duration, SegmentKind::Comment);
        }
        timeline.finish()
    }
}
