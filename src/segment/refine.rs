use tracing::debug;

use crate::cue::{gap_ms, Cue, SegmentationUnit};
use crate::measure::{has_strong_boundary, join_all, join_text, measure, LangClass};

const MERGE_MAX_LEN_CJK: usize = 6;
const MERGE_MAX_LEN_SPACED: usize = 3;
const MERGE_MAX_DURATION_MS: u64 = 1_500;
const MERGE_MAX_GAP_MS: u64 = 400;

const LONG_LEN_CJK: usize = 36;
const LONG_LEN_SPACED: usize = 18;
const MIN_HALF_CJK: usize = 6;
const MIN_HALF_SPACED: usize = 4;
const MIN_SPLIT_SCORE: f64 = 2.0;

/// Run the merge pass followed by the split pass.
pub fn refine_segmentation_units(
    units: Vec<SegmentationUnit>,
    source: &[Cue],
    lang: LangClass,
) -> Vec<SegmentationUnit> {
    let merged = merge_fragmented_units(units, source, lang);
    split_long_units(merged, source, lang)
}

/// Single left-to-right pass. A unit keeps absorbing its successor while it
/// still looks like the front half of a sentence.
pub fn merge_fragmented_units(
    units: Vec<SegmentationUnit>,
    source: &[Cue],
    lang: LangClass,
) -> Vec<SegmentationUnit> {
    let mut out: Vec<SegmentationUnit> = Vec::with_capacity(units.len());

    for unit in units {
        if let Some(current) = out.last_mut() {
            if should_merge(current, &unit, source, lang) {
                debug!(
                    "Merging unit {}-{} into {}-{}",
                    unit.from, unit.to, current.from, current.to
                );
                current.text = join_text(&current.text, &unit.text, lang);
                current.to = unit.to;
                continue;
            }
        }
        out.push(unit);
    }
    out
}

fn should_merge(
    current: &SegmentationUnit,
    next: &SegmentationUnit,
    source: &[Cue],
    lang: LangClass,
) -> bool {
    if has_strong_boundary(&current.text, lang) {
        return false;
    }
    if measure(&current.text, lang) >= lang.pick(MERGE_MAX_LEN_CJK, MERGE_MAX_LEN_SPACED) {
        return false;
    }
    let (start, end) = current.resolve_bounds(source);
    if end.saturating_sub(start) >= MERGE_MAX_DURATION_MS {
        return false;
    }
    gap_ms(&source[current.to], &source[next.from]) < MERGE_MAX_GAP_MS
}

/// At most one split per long unit; halves are never split again.
pub fn split_long_units(
    units: Vec<SegmentationUnit>,
    source: &[Cue],
    lang: LangClass,
) -> Vec<SegmentationUnit> {
    let mut out = Vec::with_capacity(units.len());

    for unit in units {
        let is_long = measure(&unit.text, lang) > lang.pick(LONG_LEN_CJK, LONG_LEN_SPACED);
        if !is_long || unit.span() < 2 {
            out.push(unit);
            continue;
        }

        match best_split(&unit, source, lang) {
            Some(at) => {
                debug!(
                    "Splitting unit {}-{} after source index {}",
                    unit.from, unit.to, at
                );
                out.push(text_from_source(unit.from, at, source, lang));
                out.push(text_from_source(at + 1, unit.to, source, lang));
            }
            None => out.push(unit),
        }
    }
    out
}

/// Index `k` of the best split, meaning the left half is `[from, k]`.
fn best_split(unit: &SegmentationUnit, source: &[Cue], lang: LangClass) -> Option<usize> {
    let min_half = lang.pick(MIN_HALF_CJK, MIN_HALF_SPACED);
    let mut best: Option<(usize, f64)> = None;

    for k in unit.from..unit.to {
        let left = join_all(source[unit.from..=k].iter().map(|c| c.text.as_str()), lang);
        let right = join_all(source[k + 1..=unit.to].iter().map(|c| c.text.as_str()), lang);
        let left_len = measure(&left, lang);
        let right_len = measure(&right, lang);
        if left_len < min_half || right_len < min_half {
            continue;
        }

        let score = split_score(
            gap_ms(&source[k], &source[k + 1]),
            has_strong_boundary(&left, lang),
            left_len,
            right_len,
        );
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((k, score));
        }
    }

    best.filter(|(_, score)| *score >= MIN_SPLIT_SCORE)
        .map(|(k, _)| k)
}

fn split_score(gap: u64, left_ends_sentence: bool, left_len: usize, right_len: usize) -> f64 {
    let mut score = 0.0;

    score += match gap {
        g if g >= 600 => 2.0,
        g if g >= 300 => 1.0,
        g if g < 120 => -1.0,
        _ => 0.0,
    };

    if left_ends_sentence {
        score += 2.0;
    }

    let (short, long) = if left_len < right_len {
        (left_len, right_len)
    } else {
        (right_len, left_len)
    };
    let balance = short as f64 / long.max(1) as f64;
    if balance < 0.25 {
        score -= 1.5;
    } else if balance < 0.5 {
        score -= 0.5;
    }

    score
}

fn text_from_source(from: usize, to: usize, source: &[Cue], lang: LangClass) -> SegmentationUnit {
    let text = join_all(source[from..=to].iter().map(|c| c.text.as_str()), lang);
    SegmentationUnit::new(from, to, text)
}

/// Resolve units into cues: each takes the start of its first and the end of
/// its last source cue, and the id of its first source cue.
pub fn build_fragments_from_units(units: &[SegmentationUnit], source: &[Cue]) -> Vec<Cue> {
    units
        .iter()
        .map(|unit| {
            let (start, end) = unit.resolve_bounds(source);
            Cue::new(source[unit.from].id, unit.text.clone(), start, end)
        })
        .collect()
}
