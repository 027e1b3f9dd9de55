use crate::cue::{gap_ms, Cue};
use crate::measure::{has_strong_boundary, join_text, measure, LangClass};

/// Cues shorter than this flash by too quickly to be read.
pub const MIN_READABLE_MS: u64 = 700;
const TINY_MERGE_MAX_GAP_MS: u64 = 300;
const TINY_LEN_CJK: usize = 3;
const TINY_LEN_SPACED: usize = 2;

/// Sort by start, clip each cue's end to its successor's start, and clamp
/// inverted cues to zero duration.
pub fn normalize(cues: &mut Vec<Cue>) {
    cues.sort_by_key(|cue| cue.start);

    for i in 0..cues.len() {
        if cues[i].end < cues[i].start {
            cues[i].end = cues[i].start;
        }
        if i + 1 < cues.len() {
            let next_start = cues[i + 1].start;
            if cues[i].end > next_start {
                cues[i].end = next_start;
            }
        }
    }
}

/// Fold tiny, unterminated, short-lived cues into the cue that follows them.
/// The merged cue is checked again against its new successor.
pub fn merge_tiny_cues(cues: Vec<Cue>, lang: LangClass) -> Vec<Cue> {
    let mut out = Vec::with_capacity(cues.len());
    let mut iter = cues.into_iter().peekable();

    while let Some(mut current) = iter.next() {
        while let Some(next) = iter.peek() {
            if !is_flicker(&current, next, lang) {
                break;
            }
            let Some(next) = iter.next() else { break };
            current.text = join_text(&current.text, &next.text, lang);
            current.end = current.end.max(next.end);
            current.translation = match (current.translation.take(), next.translation) {
                (Some(a), Some(b)) => Some(join_text(&a, &b, lang)),
                (a, b) => a.or(b),
            };
        }
        out.push(current);
    }
    out
}

fn is_flicker(current: &Cue, next: &Cue, lang: LangClass) -> bool {
    current.duration_ms() < MIN_READABLE_MS
        && gap_ms(current, next) < TINY_MERGE_MAX_GAP_MS
        && !has_strong_boundary(&current.text, lang)
        && measure(&current.text, lang) <= lang.pick(TINY_LEN_CJK, TINY_LEN_SPACED)
}

/// normalize, merge tiny cues, normalize. Applying it twice changes nothing.
pub fn apply_guards(cues: Vec<Cue>, lang: LangClass) -> Vec<Cue> {
    let mut cues = cues;
    normalize(&mut cues);
    let mut cues = merge_tiny_cues(cues, lang);
    normalize(&mut cues);
    cues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cue::CueId;

    fn cue(i: u64, text: &str, start: u64, end: u64) -> Cue {
        Cue::new(CueId(i), text, start, end)
    }

    #[test]
    fn test_normalize_sorts_and_clips() {
        let mut cues = vec![
            cue(1, "b", 1_000, 2_500),
            cue(0, "a", 0, 1_400),
            cue(2, "c", 2_000, 3_000),
        ];
        normalize(&mut cues);
        let spans: Vec<(u64, u64)> = cues.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(spans, vec![(0, 1_000), (1_000, 2_000), (2_000, 3_000)]);
    }

    #[test]
    fn test_normalize_clamps_inverted_cue() {
        let mut cues = vec![cue(0, "a", 0, 100)];
        cues[0].start = 500;
        normalize(&mut cues);
        assert_eq!((cues[0].start, cues[0].end), (500, 500));
    }

    #[test]
    fn test_merges_flicker_chain() {
        let cues = vec![
            cue(0, "uh", 0, 300),
            cue(1, "so", 350, 600),
            cue(2, "we begin here.", 650, 2_000),
            cue(3, "Next.", 2_100, 2_400),
        ];
        let merged = apply_guards(cues, LangClass::Spaced);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].text, "uh so we begin here.");
        assert_eq!((merged[0].start, merged[0].end), (0, 2_000));
        // terminated cues are left alone even when short
        assert_eq!(merged[1].text, "Next.");
    }

    #[test]
    fn test_guards_are_idempotent() {
        let cues = vec![
            cue(0, "嗯", 0, 200),
            cue(1, "今天", 250, 600),
            cue(2, "我们来聊聊天气。", 600, 2_400),
            cue(3, "好", 2_300, 2_500),
            cue(4, "下雨了", 2_550, 4_000),
            cue(5, "对", 5_000, 5_100),
        ];
        let once = apply_guards(cues, LangClass::Cjk);
        let twice = apply_guards(once.clone(), LangClass::Cjk);
        assert_eq!(once, twice);
        for pair in once.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn test_guards_leave_clean_timeline_unchanged() {
        let cues = vec![
            cue(0, "The meeting starts now.", 0, 1_800),
            cue(1, "Please take a seat.", 2_000, 3_500),
        ];
        assert_eq!(apply_guards(cues.clone(), LangClass::Spaced), cues);
    }
}
