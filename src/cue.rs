use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a cue, assigned by the pipeline that owns it.
///
/// Bookkeeping (segmented, translated, failed) is keyed by this id rather than
/// by start time, so two cues sharing a timestamp are never conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CueId(pub u64);

impl fmt::Display for CueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One timestamped unit of subtitle text. Times are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    pub id: CueId,
    pub text: String,
    pub start: u64,
    pub end: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

impl Cue {
    pub fn new(id: CueId, text: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            id,
            text: text.into(),
            start,
            end: end.max(start),
            translation: None,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Half-open membership test: `[start, end)`.
    pub fn contains(&self, time_ms: u64) -> bool {
        self.start <= time_ms && time_ms < self.end
    }

    pub fn is_translated(&self) -> bool {
        self.translation.is_some()
    }
}

/// Gap between the end of `previous` and the start of `next`, zero when they touch or overlap.
pub fn gap_ms(previous: &Cue, next: &Cue) -> u64 {
    next.start.saturating_sub(previous.end)
}

/// A contiguous index range `[from, to]` into a source cue array, with the text
/// the segmenter assigned to it. Not a cue until resolved against its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationUnit {
    pub from: usize,
    pub to: usize,
    pub text: String,
}

impl SegmentationUnit {
    pub fn new(from: usize, to: usize, text: impl Into<String>) -> Self {
        Self {
            from,
            to,
            text: text.into(),
        }
    }

    pub fn span(&self) -> usize {
        self.to - self.from + 1
    }

    /// Start of the first and end of the last referenced source cue.
    pub fn resolve_bounds(&self, source: &[Cue]) -> (u64, u64) {
        (source[self.from].start, source[self.to].end)
    }
}
