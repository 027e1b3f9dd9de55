use thiserror::Error;

#[derive(Error, Debug)]
pub enum CueSyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM request error: {0}")]
    Llm(String),

    #[error("Line protocol error: {0}")]
    Protocol(String),

    #[error("Unit range {from}-{to} is invalid for {len} source cues")]
    Range { from: usize, to: usize, len: usize },

    #[error("Units do not cover the source cues: {0}")]
    Coverage(String),

    #[error("Unit starting at {from} overlaps previous unit ending at {previous_to}")]
    Overlap { from: usize, previous_to: usize },

    #[error("Segmentation error: {0}")]
    Segment(String),

    #[error("Translation error: {0}")]
    Translate(String),

    #[error("Subtitle format error: {0}")]
    Subtitle(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

pub type Result<T> = std::result::Result<T, CueSyncError>;
