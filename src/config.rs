use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::{Result, CueSyncError};

// Defaults for keys that may be omitted from config files
fn default_look_behind_ms() -> u64 {
    10_000
}

fn default_chunk_window_ms() -> u64 {
    30_000
}

fn default_max_chunk_cues() -> usize {
    120
}

fn default_translate_look_behind_ms() -> u64 {
    5_000
}

fn default_status_clear_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub segmentation: SegmentationConfig,
    pub translate: TranslateConfig,
    pub display: DisplayConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Chunks are picked from cues starting no earlier than this far behind the playhead (ms)
    #[serde(default = "default_look_behind_ms")]
    pub look_behind_ms: u64,
    /// Span of cue start times covered by one segmentation chunk (ms)
    #[serde(default = "default_chunk_window_ms")]
    pub chunk_window_ms: u64,
    /// Upper bound on cues sent to the segmenter at once
    #[serde(default = "default_max_chunk_cues")]
    pub max_chunk_cues: usize,
    /// Source language code; detected from the cue text when unset
    #[serde(default)]
    pub source_language: Option<String>,
    /// Translation provider identifier passed along with segmentation requests
    pub provider: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// Target language code
    pub target_language: String,
    /// Maximum cues per translation request
    pub batch_size: usize,
    /// Cues starting this far behind the playhead are still eligible (ms)
    #[serde(default = "default_translate_look_behind_ms")]
    pub look_behind_ms: u64,
    /// Cues starting up to this far ahead of the playhead are eligible (ms)
    pub look_ahead_ms: u64,
    /// How translated subtitles are shown
    pub display_mode: DisplayMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayMode {
    /// Source line with the translation underneath
    Bilingual,
    /// Translation only; failed translations fall back to the source text
    TranslationOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Delay before a loading/error status clears itself (ms)
    #[serde(default = "default_status_clear_ms")]
    pub status_clear_ms: u64,
    /// Playback tick interval used by simulated playback (ms)
    pub tick_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama endpoint URL
    pub endpoint: String,
    /// Model used for both segmentation and translation
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            look_behind_ms: default_look_behind_ms(),
            chunk_window_ms: default_chunk_window_ms(),
            max_chunk_cues: default_max_chunk_cues(),
            source_language: None,
            provider: "ollama".to_string(),
        }
    }
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            target_language: "ja".to_string(),
            batch_size: 8,
            look_behind_ms: default_translate_look_behind_ms(),
            look_ahead_ms: 30_000,
            display_mode: DisplayMode::Bilingual,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            status_clear_ms: default_status_clear_ms(),
            tick_ms: 250,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            timeout_secs: 300,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CueSyncError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| CueSyncError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CueSyncError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| CueSyncError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.translate.batch_size == 0 {
            return Err(CueSyncError::Config("translate.batch_size must be at least 1".to_string()));
        }
        if self.segmentation.max_chunk_cues == 0 {
            return Err(CueSyncError::Config(
                "segmentation.max_chunk_cues must be at least 1".to_string(),
            ));
        }
        if self.segmentation.chunk_window_ms == 0 {
            return Err(CueSyncError::Config(
                "segmentation.chunk_window_ms must be positive".to_string(),
            ));
        }
        if self.display.tick_ms == 0 {
            return Err(CueSyncError::Config("display.tick_ms must be positive".to_string()));
        }
        Ok(())
    }
}
