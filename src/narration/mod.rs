// narration/mod.rs - narration script extraction from scene source

mod extract;
mod segment;
mod source;

pub use extract::{
    extract, ExtractionStrategy, NarrationExtractor, DEFAULT_SECTION_SECS, DEFAULT_SEGMENT_SECS,
    FALLBACK_SECS, FALLBACK_TEXT, SECTION_TITLE_SECS,
};
pub use segment::{NarrationScript, ScriptSegment, SegmentKind, Timing, PAUSE_MARKER};
pub use source::{strip_latex, Comment, SourceView, TextCall};
