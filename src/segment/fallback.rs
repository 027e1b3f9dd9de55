//! Deterministic segmentation used when the AI segmenter is unavailable or
//! returns something unusable.

use tracing::{debug, info};

use crate::cue::{gap_ms, Cue};
use crate::measure::{has_strong_boundary, join_text, measure, LangClass};
use super::guards::apply_guards;
use super::protocol::clean_cues;

const PAUSE_MS: u64 = 1_200;
const MAX_LEN_CJK: usize = 32;
const MAX_LEN_SPACED: usize = 20;
const OVERSIZED_CHARS: usize = 80;
const OVERSIZED_RATIO: f64 = 0.2;
const TARGET_MIN_CJK: usize = 8;
const TARGET_MIN_SPACED: usize = 5;
const TARGET_MAX_CJK: usize = 32;
const TARGET_MAX_SPACED: usize = 20;

const SIGN_PREFIXES: &[char] = &['[', '(', '（', '【', '♪', '♫', '♬', '♩', '#'];

const PAUSE_WORDS_SPACED: &[&str] = &[
    "so", "and", "but", "then", "well", "now", "okay", "ok", "because", "actually",
    "anyway", "um", "uh", "like", "also", "however",
];
const PAUSE_WORDS_CJK: &[&str] = &[
    "然后", "所以", "但是", "那么", "其实", "就是", "而且", "不过", "でも", "それで", "じゃあ",
    "えっと", "그리고", "그래서", "근데",
];

/// Full offline path: clean the raw cues, chunk them and run the guards.
pub fn fallback_segment(raw: &[Cue], lang: LangClass) -> Vec<Cue> {
    apply_guards(optimize_cues(&clean_cues(raw), lang), lang)
}

/// Segment `cues` without any external help.
pub fn optimize_cues(cues: &[Cue], lang: LangClass) -> Vec<Cue> {
    if cues.is_empty() {
        return Vec::new();
    }

    let mut segments = chunk(cues, lang, false);
    let oversized = segments
        .iter()
        .filter(|cue| cue.text.chars().count() > OVERSIZED_CHARS)
        .count();
    if oversized as f64 > segments.len() as f64 * OVERSIZED_RATIO {
        info!(
            "{}/{} fallback segments oversized, re-chunking with pause words",
            oversized,
            segments.len()
        );
        segments = chunk(cues, lang, true);
    }

    let balanced = rebalance(segments, lang);
    debug!("Fallback produced {} segments from {} cues", balanced.len(), cues.len());
    balanced
}

fn chunk(cues: &[Cue], lang: LangClass, use_pause_words: bool) -> Vec<Cue> {
    let max_len = lang.pick(MAX_LEN_CJK, MAX_LEN_SPACED);
    let mut out = Vec::new();
    let mut buffer: Option<Cue> = None;
    let mut buffered = 0usize;

    for (i, cue) in cues.iter().enumerate() {
        let current = match buffer.take() {
            Some(mut acc) => {
                acc.text = join_text(&acc.text, &cue.text, lang);
                acc.end = acc.end.max(cue.end);
                acc
            }
            None => cue.clone(),
        };
        buffered += 1;

        let flush = match cues.get(i + 1) {
            None => true,
            Some(next) => {
                has_strong_boundary(&current.text, lang)
                    || gap_ms(cue, next) > PAUSE_MS
                    || measure(&join_text(&current.text, &next.text, lang), lang) > max_len
                    || starts_with_sign(&next.text)
                    || (use_pause_words && buffered > 1 && starts_with_pause_word(&next.text, lang))
            }
        };

        if flush {
            out.push(current);
            buffered = 0;
        } else {
            buffer = Some(current);
        }
    }
    out
}

/// Forward then backward greedy merge of segments under the target minimum.
fn rebalance(segments: Vec<Cue>, lang: LangClass) -> Vec<Cue> {
    let min = lang.pick(TARGET_MIN_CJK, TARGET_MIN_SPACED);
    let max = lang.pick(TARGET_MAX_CJK, TARGET_MAX_SPACED);

    let mut forward: Vec<Cue> = Vec::with_capacity(segments.len());
    let mut iter = segments.into_iter().peekable();
    while let Some(mut current) = iter.next() {
        while let Some(next) = iter.peek() {
            if measure(&current.text, lang) >= min || !can_merge(&current, next, max, lang) {
                break;
            }
            let Some(next) = iter.next() else { break };
            absorb(&mut current, next, lang);
        }
        forward.push(current);
    }

    let mut backward: Vec<Cue> = Vec::with_capacity(forward.len());
    for segment in forward.into_iter().rev() {
        match backward.last_mut() {
            Some(later) if measure(&later.text, lang) < min && can_merge(&segment, later, max, lang) => {
                let mut merged = segment;
                if let Some(later) = backward.pop() {
                    absorb(&mut merged, later, lang);
                }
                backward.push(merged);
            }
            _ => backward.push(segment),
        }
    }
    backward.reverse();
    backward
}

fn can_merge(left: &Cue, right: &Cue, max: usize, lang: LangClass) -> bool {
    gap_ms(left, right) <= PAUSE_MS
        && !starts_with_sign(&right.text)
        && measure(&join_text(&left.text, &right.text, lang), lang) <= max
}

fn absorb(into: &mut Cue, next: Cue, lang: LangClass) {
    into.text = join_text(&into.text, &next.text, lang);
    into.end = into.end.max(next.end);
}

fn starts_with_sign(text: &str) -> bool {
    text.trim_start().starts_with(SIGN_PREFIXES)
}

fn starts_with_pause_word(text: &str, lang: LangClass) -> bool {
    let text = text.trim_start();
    match lang {
        LangClass::Cjk => PAUSE_WORDS_CJK.iter().any(|w| text.starts_with(w)),
        LangClass::Spaced => {
            let first = text
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .trim_end_matches([',', '.', '!', '?'])
                .to_lowercase();
            PAUSE_WORDS_SPACED.contains(&first.as_str())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cue::CueId;

    fn cues(items: &[(&str, u64, u64)]) -> Vec<Cue> {
        items
            .iter()
            .enumerate()
            .map(|(i, (text, start, end))| Cue::new(CueId(i as u64), *text, *start, *end))
            .collect()
    }

    fn texts(cues: &[Cue]) -> Vec<&str> {
        cues.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn test_flushes_on_sentence_boundary() {
        let input = cues(&[
            ("we went down", 0, 800),
            ("to the harbour today.", 800, 1_800),
            ("the boats were all", 1_800, 2_600),
            ("painted bright blue.", 2_600, 3_600),
        ]);
        let out = optimize_cues(&input, LangClass::Spaced);
        assert_eq!(
            texts(&out),
            vec!["we went down to the harbour today.", "the boats were all painted bright blue."]
        );
        assert_eq!((out[0].start, out[0].end), (0, 1_800));
        assert_eq!((out[1].start, out[1].end), (1_800, 3_600));
    }

    #[test]
    fn test_flushes_on_pause_and_sign() {
        let input = cues(&[
            ("first we check the ropes and then", 0, 1_000),
            ("we lift the sail up high", 3_000, 4_000),
            ("[applause]", 4_000, 5_000),
        ]);
        let out = optimize_cues(&input, LangClass::Spaced);
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].text, "[applause]");
    }

    #[test]
    fn test_respects_max_length() {
        let line = "one two three four five six seven eight";
        let input = cues(&[(line, 0, 1_000), (line, 1_000, 2_000), (line, 2_000, 3_000)]);
        let out = optimize_cues(&input, LangClass::Spaced);
        for segment in &out {
            assert!(measure(&segment.text, LangClass::Spaced) <= MAX_LEN_SPACED);
        }
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_quality_gate_enables_pause_words() {
        // Long unpunctuated run: every pass-1 segment exceeds the char ceiling.
        let input = cues(&[
            ("extraordinarily complicated considerations regarding", 0, 1_000),
            ("international telecommunications infrastructure", 1_000, 2_000),
            ("so administrative responsibilities multiplied", 2_000, 3_000),
            ("considerably throughout organisations", 3_000, 4_000),
        ]);
        let pass_one = chunk(&input, LangClass::Spaced, false);
        assert_eq!(pass_one.len(), 1);

        let out = optimize_cues(&input, LangClass::Spaced);
        assert_eq!(out.len(), 2);
        assert!(out[1].text.starts_with("so administrative"));
    }

    #[test]
    fn test_rebalance_merges_short_leftovers() {
        let input = cues(&[
            ("好的。", 0, 500),
            ("我们今天要讨论的是新的计划。", 600, 2_500),
            ("谢谢。", 2_600, 3_000),
        ]);
        let out = optimize_cues(&input, LangClass::Cjk);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "好的。我们今天要讨论的是新的计划。谢谢。");
        assert_eq!((out[0].start, out[0].end), (0, 3_000));
    }

    #[test]
    fn test_rebalance_does_not_cross_pause() {
        let input = cues(&[("好的。", 0, 500), ("谢谢。", 5_000, 5_500)]);
        let out = optimize_cues(&input, LangClass::Cjk);
        assert_eq!(texts(&out), vec!["好的。", "谢谢。"]);
    }

    #[test]
    fn test_pause_word_detection() {
        assert!(starts_with_pause_word("So, what now", LangClass::Spaced));
        assert!(!starts_with_pause_word("Sorry about that", LangClass::Spaced));
        assert!(starts_with_pause_word("然后我们走了", LangClass::Cjk));
    }
}
