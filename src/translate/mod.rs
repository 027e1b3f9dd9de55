// Translation of processed cues near the playhead
//
// - coordinator: windowed, single-flight batch scheduling driven by playback ticks
// - llm: Ollama-backed batch translator

pub mod coordinator;
pub mod llm;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use coordinator::TranslationCoordinator;
use crate::cue::Cue;
use crate::error::Result;
use crate::measure::collapse_whitespace;

/// Video-level context handed to every translation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoContext {
    pub title: String,
    /// Aggregate subtitle text of the whole video
    pub subtitles_text: String,
}

impl VideoContext {
    pub fn new(title: impl Into<String>, cues: &[Cue]) -> Self {
        let subtitles_text = cues
            .iter()
            .map(|cue| collapse_whitespace(&cue.text))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            title: title.into(),
            subtitles_text,
        }
    }
}

/// External batch translation capability. Either every cue comes back with a
/// translation or the call fails; there is no partial success.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchTranslator: Send + Sync {
    async fn translate_batch(&self, cues: &[Cue], context: &VideoContext) -> Result<Vec<Cue>>;
}
