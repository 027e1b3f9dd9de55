//! cuesync - readable, playback-synchronized subtitle translation
//!
//! Re-chunks raw machine-caption cues into readable subtitle lines with the
//! help of a language model (falling back to deterministic heuristics), and
//! translates the lines near the playhead as playback advances.

pub mod cli;
pub mod config;
pub mod cue;
pub mod display;
pub mod error;
pub mod measure;
pub mod ollama;
pub mod playback;
pub mod segment;
pub mod session;
pub mod subtitle;
pub mod translate;
