//! Line protocol spoken with the external segmenter.
//!
//! Requests are a compact JSON array of `{i, s, e, t}` records; responses are
//! one `<from>-<to> | <text>` record per line, surrounded by whatever noise the
//! model felt like adding.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

use crate::cue::{Cue, SegmentationUnit};
use crate::error::{CueSyncError, Result};
use crate::measure::collapse_whitespace;

static UNIT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:\d+[.)]|[-*•])\s+)?(\d+)\s*-\s*(\d+)\s*\|\s*(.*?)\s*$")
        .expect("unit line pattern is valid")
});

/// One request record. Field names are kept to a single letter to save tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueRecord {
    pub i: usize,
    pub s: u64,
    pub e: u64,
    pub t: String,
}

/// Encoded request together with the cues its indices refer to.
#[derive(Debug, Clone)]
pub struct EncodedCues {
    pub payload: String,
    /// Cleaned, non-empty cues; record `i` is `cues[i]`
    pub cues: Vec<Cue>,
}

/// Collapse whitespace in every cue and drop the ones left empty.
pub fn clean_cues(cues: &[Cue]) -> Vec<Cue> {
    cues.iter()
        .filter_map(|cue| {
            let text = collapse_whitespace(&cue.text);
            if text.is_empty() {
                None
            } else {
                Some(Cue { text, ..cue.clone() })
            }
        })
        .collect()
}

pub fn encode_cues(cues: &[Cue]) -> Result<EncodedCues> {
    let cleaned = clean_cues(cues);

    let records: Vec<CueRecord> = cleaned
        .iter()
        .enumerate()
        .map(|(i, cue)| CueRecord {
            i,
            s: cue.start,
            e: cue.end,
            t: cue.text.clone(),
        })
        .collect();

    Ok(EncodedCues {
        payload: serde_json::to_string(&records)?,
        cues: cleaned,
    })
}

/// Extract every well-formed unit line, silently skipping the rest.
pub fn decode_units(response: &str) -> Result<Vec<SegmentationUnit>> {
    let mut units = Vec::new();
    let mut skipped = 0usize;

    for line in response.lines() {
        let Some(caps) = UNIT_LINE.captures(line) else {
            if !line.trim().is_empty() {
                skipped += 1;
            }
            continue;
        };
        let text = caps[3].trim();
        if text.is_empty() {
            skipped += 1;
            continue;
        }
        // Indices too large for usize are noise like any other malformed line
        let (Ok(from), Ok(to)) = (caps[1].parse::<usize>(), caps[2].parse::<usize>()) else {
            skipped += 1;
            continue;
        };
        units.push(SegmentationUnit::new(from, to, collapse_whitespace(text)));
    }

    if skipped > 0 {
        debug!("Skipped {} non-protocol lines in segmenter response", skipped);
    }

    if units.is_empty() {
        return Err(CueSyncError::Protocol(
            "no `<from>-<to> | <text>` lines in response".to_string(),
        ));
    }
    Ok(units)
}

/// Check that `units` partition `[0, source_len)` in order without gaps or overlaps.
pub fn validate_units(units: &[SegmentationUnit], source_len: usize) -> Result<()> {
    for unit in units {
        if unit.from > unit.to || unit.to >= source_len {
            return Err(CueSyncError::Range {
                from: unit.from,
                to: unit.to,
                len: source_len,
            });
        }
    }

    let (Some(first), Some(last)) = (units.first(), units.last()) else {
        return Err(CueSyncError::Coverage("no units".to_string()));
    };
    if first.from != 0 {
        return Err(CueSyncError::Coverage(format!(
            "first unit starts at {} instead of 0",
            first.from
        )));
    }

    for pair in units.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        if current.from <= previous.to {
            return Err(CueSyncError::Overlap {
                from: current.from,
                previous_to: previous.to,
            });
        }
        if current.from != previous.to + 1 {
            return Err(CueSyncError::Coverage(format!(
                "gap between {} and {}",
                previous.to, current.from
            )));
        }
    }

    if last.to != source_len - 1 {
        return Err(CueSyncError::Coverage(format!(
            "last unit ends at {} instead of {}",
            last.to,
            source_len - 1
        )));
    }
    Ok(())
}
