use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use crate::config::DisplayMode;
use crate::cue::{Cue, CueId};
use crate::error::{CueSyncError, Result};

/// Parse SRT text into raw cues. Blocks without text are skipped; the block
/// numbers in the file are ignored.
pub fn parse_srt(content: &str) -> Result<Vec<Cue>> {
    let content = content.trim_start_matches('\u{feff}');
    let mut cues = Vec::new();

    // Blocks are separated by lines that are empty or whitespace only
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line.trim_end_matches('\r'));
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    for (block_index, lines) in blocks.iter().enumerate() {
        let timing_at = lines
            .iter()
            .position(|line| line.contains("-->"))
            .ok_or_else(|| {
                CueSyncError::Subtitle(format!("Block {} has no timing line", block_index + 1))
            })?;
        let (start, end) = parse_timing(lines[timing_at])?;

        let text = lines[timing_at + 1..].join("\n");
        if text.trim().is_empty() {
            debug!("Skipping empty subtitle block {}", block_index + 1);
            continue;
        }
        cues.push(Cue::new(CueId(cues.len() as u64), text.trim(), start, end));
    }

    Ok(cues)
}

fn parse_timing(line: &str) -> Result<(u64, u64)> {
    let (start, end) = line
        .split_once("-->")
        .ok_or_else(|| CueSyncError::Subtitle(format!("Invalid timing line: {}", line)))?;
    // Position hints may follow the end time
    let end = end.split_whitespace().next().unwrap_or_default();
    Ok((parse_srt_time(start.trim())?, parse_srt_time(end)?))
}

/// Parse `HH:MM:SS,mmm` (a `.` separator is accepted too) into milliseconds.
fn parse_srt_time(value: &str) -> Result<u64> {
    let invalid = || CueSyncError::Subtitle(format!("Invalid timestamp: {}", value));

    let (clock, millis) = value
        .split_once(',')
        .or_else(|| value.split_once('.'))
        .ok_or_else(invalid)?;
    let parts: Vec<u64> = clock
        .split(':')
        .map(|p| p.trim().parse::<u64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| invalid())?;
    let [hours, minutes, seconds] = parts[..] else {
        return Err(invalid());
    };
    let millis: u64 = millis.trim().parse().map_err(|_| invalid())?;

    hours
        .checked_mul(3_600_000)
        .and_then(|ms| ms.checked_add(minutes.checked_mul(60_000)?))
        .and_then(|ms| ms.checked_add(seconds.checked_mul(1_000)?))
        .and_then(|ms| ms.checked_add(millis))
        .ok_or_else(invalid)
}

/// Format milliseconds as SRT time (HH:MM:SS,mmm)
fn format_srt_time(total_milliseconds: u64) -> String {
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Subtitle text of one cue for the given display mode. Untranslated cues
/// fall back to the source text; empty translations are left out.
fn cue_text(cue: &Cue, mode: DisplayMode) -> String {
    let translation = cue
        .translation
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    match (mode, translation) {
        (DisplayMode::Bilingual, Some(t)) => format!("{}\n{}", cue.text.trim(), t),
        (DisplayMode::TranslationOnly, Some(t)) => t.to_string(),
        (_, None) => cue.text.trim().to_string(),
    }
}

pub fn format_srt(cues: &[Cue], mode: DisplayMode) -> String {
    let mut srt_content = String::new();

    for (index, cue) in cues.iter().enumerate() {
        srt_content.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            index + 1,
            format_srt_time(cue.start),
            format_srt_time(cue.end),
            cue_text(cue, mode)
        ));
    }
    srt_content
}

pub async fn load_srt<P: AsRef<Path>>(path: P) -> Result<Vec<Cue>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(CueSyncError::FileNotFound(path.display().to_string()));
    }
    let content = fs::read_to_string(path).await?;
    let cues = parse_srt(&content)?;
    info!("Loaded {} cues from {}", cues.len(), path.display());
    Ok(cues)
}

/// Write cues as an SRT file
pub async fn generate_srt<P: AsRef<Path>>(cues: &[Cue], mode: DisplayMode, output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    info!("Generating SRT file: {}", output_path.display());

    fs::write(output_path, format_srt(cues, mode)).await?;

    info!("SRT file generated successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\u{feff}1\r\n00:00:01,000 --> 00:00:02,500\r\nhello\r\n\r\n2\r\n00:00:02.500 --> 00:00:04,000 X1:0\r\nthere my\r\nfriend\r\n\r\n3\r\n00:00:05,000 --> 00:00:06,000\r\n\r\n";

    #[test]
    fn test_format_srt_time() {
        assert_eq!(format_srt_time(0), "00:00:00,000");
        assert_eq!(format_srt_time(65_123), "00:01:05,123");
        assert_eq!(format_srt_time(3_661_500), "01:01:01,500");
    }

    #[test]
    fn test_parse_srt() {
        let cues = parse_srt(SAMPLE).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!((cues[0].start, cues[0].end), (1_000, 2_500));
        assert_eq!(cues[0].text, "hello");
        assert_eq!((cues[1].start, cues[1].end), (2_500, 4_000));
        assert_eq!(cues[1].text, "there my\nfriend");
        assert_eq!(cues[1].id, CueId(1));
    }

    #[test]
    fn test_parse_srt_rejects_bad_timestamps() {
        let err = parse_srt("1\n00:00:01 --> 00:00:02,000\nhi\n").unwrap_err();
        assert!(matches!(err, CueSyncError::Subtitle(_)));
        assert!(parse_srt("1\nno timing here\n").is_err());
    }

    #[test]
    fn test_parse_srt_whitespace_only_separator() {
        let content = "1\n00:00:01,000 --> 00:00:02,000\nfirst\n \t\n2\n00:00:03,000 --> 00:00:04,000\nsecond\n";
        let cues = parse_srt(content).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "first");
        assert_eq!((cues[1].start, cues[1].text.as_str()), (3_000, "second"));
    }

    #[test]
    fn test_parse_srt_huge_hours_is_an_error() {
        let content = "1\n99999999999999999:00:00,000 --> 99999999999999999:00:01,000\nhi\n";
        let err = parse_srt(content).unwrap_err();
        assert!(matches!(err, CueSyncError::Subtitle(_)));
    }

    #[test]
    fn test_format_srt_modes() {
        let mut translated = Cue::new(CueId(0), "Hello.", 0, 1_000);
        translated.translation = Some("こんにちは。".to_string());
        let mut placeholder = Cue::new(CueId(1), "Bye.", 1_000, 2_000);
        placeholder.translation = Some(String::new());
        let cues = vec![translated, placeholder];

        assert_eq!(
            format_srt(&cues, DisplayMode::Bilingual),
            "1\n00:00:00,000 --> 00:00:01,000\nHello.\nこんにちは。\n\n2\n00:00:01,000 --> 00:00:02,000\nBye.\n\n"
        );
        assert_eq!(
            format_srt(&cues, DisplayMode::TranslationOnly),
            "1\n00:00:00,000 --> 00:00:01,000\nこんにちは。\n\n2\n00:00:01,000 --> 00:00:02,000\nBye.\n\n"
        );
    }

    #[tokio::test]
    async fn test_srt_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.srt");
        let cues = parse_srt(SAMPLE).unwrap();

        generate_srt(&cues, DisplayMode::Bilingual, &path).await.unwrap();
        let reloaded = load_srt(&path).await.unwrap();
        assert_eq!(reloaded, cues);

        let missing = load_srt(dir.path().join("missing.srt")).await.unwrap_err();
        assert!(matches!(missing, CueSyncError::FileNotFound(_)));
    }
}
